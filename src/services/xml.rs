// src/services/xml.rs

//! Structured dump (`entities.xml`) support.
//!
//! The dump is a flat list of serialised objects. Each object of interest
//! has a fixed shape, so records are pulled out with patterns behind the
//! [`EntityExtractor`] trait; a real XML parser can be dropped in later
//! without touching the rest of the pipeline.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::{Captures, Regex};

use crate::error::{AppError, Result};
use crate::utils::mime_for;

/// Status of records that are live (not drafts or trashed).
const CURRENT: &str = "current";

/// A page object from the dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlPage {
    pub id: String,
    pub title: String,
    pub body_content_id: Option<String>,
    pub parent_id: Option<String>,
}

/// A body object; `content_id` points back at its page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlBody {
    pub id: String,
    pub body: String,
    pub content_id: Option<String>,
}

/// An attachment object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttachment {
    pub id: String,
    pub title: String,
    pub container_id: String,
    pub version: String,
}

impl XmlAttachment {
    /// Location of the stored file relative to the export directory.
    pub fn relative_path(&self) -> String {
        format!(
            "attachments/{}/{}/{}",
            self.container_id, self.id, self.version
        )
    }
}

/// Current records of one dump, in document order.
#[derive(Debug, Clone, Default)]
pub struct XmlDump {
    pub pages: Vec<XmlPage>,
    pub bodies: Vec<XmlBody>,
    pub attachments: Vec<XmlAttachment>,
}

impl XmlDump {
    /// Storage-format body of a page, looked up by back-reference first.
    pub fn body_of(&self, page: &XmlPage) -> &str {
        self.bodies
            .iter()
            .find(|b| b.content_id.as_deref() == Some(page.id.as_str()))
            .or_else(|| {
                let id = page.body_content_id.as_deref()?;
                self.bodies.iter().find(|b| b.id == id)
            })
            .map(|b| b.body.as_str())
            .unwrap_or_default()
    }
}

/// Source of records from a dump.
pub trait EntityExtractor {
    fn extract(&self, xml: &str) -> Result<XmlDump>;
}

/// Pattern-based extractor for the flat per-object layout.
pub struct PatternExtractor {
    page_object: Regex,
    body_object: Regex,
    attachment_object: Regex,
    id: Regex,
    title: Regex,
    status: Regex,
    body_ref: Regex,
    parent_ref: Regex,
    body_text: Regex,
    content_ref: Regex,
    container_ref: Regex,
    version: Regex,
}

fn pattern(re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|e| AppError::extract(format!("bad pattern {re}: {e}")))
}

fn object_pattern(class: &str, package: &str) -> Result<Regex> {
    pattern(&format!(
        r#"(?s)<object class="{class}" package="{}">(.*?)</object>"#,
        regex::escape(package)
    ))
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

impl PatternExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            page_object: object_pattern("Page", "com.atlassian.confluence.pages")?,
            body_object: object_pattern("BodyContent", "com.atlassian.confluence.core")?,
            attachment_object: object_pattern("Attachment", "com.atlassian.confluence.pages")?,
            id: pattern(r#"<id name="id">(\d+)</id>"#)?,
            title: pattern(r#"<property name="title"><!\[CDATA\[(.*?)\]\]></property>"#)?,
            status: pattern(r#"<property name="contentStatus"><!\[CDATA\[(.*?)\]\]></property>"#)?,
            body_ref: pattern(r#"<element class="BodyContent"[^>]*><id name="id">(\d+)</id>"#)?,
            parent_ref: pattern(r#"<property name="parent" class="Page"[^>]*><id name="id">(\d+)</id>"#)?,
            body_text: pattern(r#"(?s)<property name="body"><!\[CDATA\[(.*?)\]\]></property>"#)?,
            content_ref: pattern(
                r#"<property name="content" class="(?:Page|BlogPost)"[^>]*><id name="id">(\d+)</id>"#,
            )?,
            container_ref: pattern(
                r#"<property name="containerContent" class="(?:Page|BlogPost)"[^>]*><id name="id">(\d+)</id>"#,
            )?,
            version: pattern(r#"<property name="version">(\d+)</property>"#)?,
        })
    }

    fn is_current(&self, object: &str) -> bool {
        capture(&self.status, object).is_none_or(|s| s == CURRENT)
    }

    fn objects<'x>(re: &Regex, xml: &'x str) -> impl Iterator<Item = &'x str> {
        re.captures_iter(xml)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

impl EntityExtractor for PatternExtractor {
    fn extract(&self, xml: &str) -> Result<XmlDump> {
        let mut dump = XmlDump::default();

        for object in Self::objects(&self.page_object, xml) {
            let (Some(id), Some(title)) = (capture(&self.id, object), capture(&self.title, object))
            else {
                continue;
            };
            if !self.is_current(object) {
                log::debug!("Skipping non-current page {}", id);
                continue;
            }
            dump.pages.push(XmlPage {
                id,
                title,
                body_content_id: capture(&self.body_ref, object),
                parent_id: capture(&self.parent_ref, object),
            });
        }

        for object in Self::objects(&self.body_object, xml) {
            let (Some(id), Some(body)) = (capture(&self.id, object), capture(&self.body_text, object))
            else {
                continue;
            };
            dump.bodies.push(XmlBody {
                id,
                body,
                content_id: capture(&self.content_ref, object),
            });
        }

        for object in Self::objects(&self.attachment_object, xml) {
            let (Some(id), Some(title), Some(container_id)) = (
                capture(&self.id, object),
                capture(&self.title, object),
                capture(&self.container_ref, object),
            ) else {
                continue;
            };
            if !self.is_current(object) {
                continue;
            }
            dump.attachments.push(XmlAttachment {
                id,
                title,
                container_id,
                version: capture(&self.version, object).unwrap_or_else(|| "1".to_string()),
            });
        }

        log::info!(
            "Extracted {} current pages, {} bodies, {} current attachments",
            dump.pages.len(),
            dump.bodies.len(),
            dump.attachments.len()
        );
        Ok(dump)
    }
}

/// A depth-1 page and every page below it, flattened depth-first.
#[derive(Debug, Clone)]
pub struct XmlBookPlan {
    pub book: XmlPage,
    pub pages: Vec<XmlPage>,
}

/// Three-level layout derived from parent references.
#[derive(Debug, Clone)]
pub struct XmlHierarchy {
    pub root: XmlPage,
    pub books: Vec<XmlBookPlan>,
    /// Roots other than the chosen one
    pub ignored_roots: Vec<XmlPage>,
}

impl XmlHierarchy {
    /// Choose the root (title containing `marker`, else the first root) and
    /// lay out its descendants. `None` when the dump has no root page.
    pub fn build(dump: &XmlDump, marker: Option<&str>) -> Option<Self> {
        let mut children: HashMap<Option<&str>, Vec<&XmlPage>> = HashMap::new();
        for page in &dump.pages {
            children
                .entry(page.parent_id.as_deref())
                .or_default()
                .push(page);
        }

        let roots = children.get(&None).cloned().unwrap_or_default();
        let marker = marker.map(str::to_lowercase).filter(|m| !m.is_empty());
        let root = marker
            .as_ref()
            .and_then(|m| roots.iter().find(|p| p.title.to_lowercase().contains(m)))
            .or_else(|| roots.first())
            .copied()?;

        let ignored_roots: Vec<XmlPage> = roots
            .iter()
            .filter(|p| p.id != root.id)
            .map(|p| (*p).clone())
            .collect();
        for page in &ignored_roots {
            log::warn!("Ignoring additional root page {} ({})", page.title, page.id);
        }

        let books = children
            .get(&Some(root.id.as_str()))
            .map(|books| {
                books
                    .iter()
                    .map(|book| {
                        let mut pages = Vec::new();
                        collect_descendants(&children, &book.id, &mut pages);
                        XmlBookPlan {
                            book: (*book).clone(),
                            pages,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            root: root.clone(),
            books,
            ignored_roots,
        })
    }

    pub fn page_count(&self) -> usize {
        self.books.iter().map(|b| b.pages.len()).sum()
    }
}

/// Depth-first walk; grandchildren and below end up in the same list.
fn collect_descendants(
    children: &HashMap<Option<&str>, Vec<&XmlPage>>,
    parent: &str,
    out: &mut Vec<XmlPage>,
) {
    let Some(kids) = children.get(&Some(parent)) else {
        return;
    };
    for kid in kids {
        out.push((*kid).clone());
        collect_descendants(children, &kid.id, out);
    }
}

/// Converts storage-format bodies into plain HTML.
pub struct StorageConverter {
    dir: PathBuf,
    files: BTreeMap<(String, String), String>,
    image: Regex,
    view_file: Regex,
    widget: Regex,
    link_with_body: Regex,
    link: Regex,
    macro_block: Regex,
    namespaced: Regex,
}

impl StorageConverter {
    /// `dir` is the export directory holding `attachments/`.
    pub fn new(dir: impl Into<PathBuf>, attachments: &[XmlAttachment]) -> Result<Self> {
        let files = attachments
            .iter()
            .map(|a| {
                (
                    (a.container_id.clone(), a.title.clone()),
                    a.relative_path(),
                )
            })
            .collect();

        let attachment = r#"<ri:attachment ri:filename="([^"]+)"[^>]*/>"#;
        Ok(Self {
            dir: dir.into(),
            files,
            image: pattern(&format!(r"(?s)<ac:image[^>]*>.*?{attachment}.*?</ac:image>"))?,
            view_file: pattern(&format!(
                r#"(?s)<ac:structured-macro[^>]*ac:name="view-file"[^>]*>.*?{attachment}.*?</ac:structured-macro>"#
            ))?,
            widget: pattern(&format!(
                r#"(?s)<ac:structured-macro[^>]*ac:name="widget"[^>]*>.*?{attachment}.*?</ac:structured-macro>"#
            ))?,
            link_with_body: pattern(&format!(
                r"(?s)<ac:link[^>]*>.*?{attachment}.*?<ac:plain-text-link-body><!\[CDATA\[([^\]]*)\]\]></ac:plain-text-link-body>.*?</ac:link>"
            ))?,
            link: pattern(&format!(r"(?s)<ac:link[^>]*>.*?{attachment}.*?</ac:link>"))?,
            macro_block: pattern(r"(?s)<ac:structured-macro[^>]*>.*?</ac:structured-macro>")?,
            namespaced: pattern(r"</?(?:ac|ri):[^>]+>")?,
        })
    }

    /// Convert one page body. `page_id` scopes image lookups.
    pub fn convert(&self, storage: &str, page_id: &str) -> String {
        let html = self.image.replace_all(storage, |c: &Captures<'_>| {
            let filename = &c[1];
            match self.image_uri(page_id, filename) {
                Some(uri) => format!(r#"<img src="{uri}" alt="{filename}" />"#),
                None => format!("<p>[Image: {filename}]</p>"),
            }
        });
        let html = self.view_file.replace_all(&html, download_link);
        let html = self.widget.replace_all(&html, download_link);
        let html = self.link_with_body.replace_all(&html, |c: &Captures<'_>| {
            let text = if c[2].is_empty() { &c[1] } else { &c[2] };
            format!(r#"<a href="[ATTACHMENT:{}]">{}</a>"#, &c[1], text)
        });
        let html = self
            .link
            .replace_all(&html, r#"<a href="[ATTACHMENT:$1]">$1</a>"#);
        let html = self.macro_block.replace_all(&html, "");
        self.namespaced.replace_all(&html, "").into_owned()
    }

    fn image_uri(&self, page_id: &str, filename: &str) -> Option<String> {
        let relative = self
            .files
            .get(&(page_id.to_string(), filename.to_string()))?;
        let path = self.dir.join(relative);
        match fs::read(&path) {
            Ok(bytes) => Some(format!(
                "data:{};base64,{}",
                mime_for(filename),
                STANDARD.encode(bytes)
            )),
            Err(e) => {
                log::debug!("Image {} unavailable: {}", path.display(), e);
                None
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn download_link(c: &Captures<'_>) -> String {
    format!(
        r#"<p>📎 <a href="[ATTACHMENT:{0}]">{0}</a></p>"#,
        &c[1]
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn page_object(id: &str, title: &str, parent: Option<&str>, status: &str) -> String {
        let parent = parent
            .map(|p| {
                format!(
                    r#"<property name="parent" class="Page" package="com.atlassian.confluence.pages"><id name="id">{p}</id></property>"#
                )
            })
            .unwrap_or_default();
        format!(
            r#"<object class="Page" package="com.atlassian.confluence.pages">
<id name="id">{id}</id>
<property name="title"><![CDATA[{title}]]></property>
{parent}
<property name="contentStatus"><![CDATA[{status}]]></property>
<collection name="bodyContents" class="java.util.Collection"><element class="BodyContent" package="com.atlassian.confluence.core"><id name="id">{id}0</id></element></collection>
</object>"#
        )
    }

    pub(crate) fn body_object(page_id: &str, body: &str) -> String {
        format!(
            r#"<object class="BodyContent" package="com.atlassian.confluence.core">
<id name="id">{page_id}0</id>
<property name="body"><![CDATA[{body}]]></property>
<property name="content" class="Page" package="com.atlassian.confluence.pages"><id name="id">{page_id}</id></property>
</object>"#
        )
    }

    pub(crate) fn attachment_object(id: &str, title: &str, container: &str) -> String {
        format!(
            r#"<object class="Attachment" package="com.atlassian.confluence.pages">
<id name="id">{id}</id>
<property name="title"><![CDATA[{title}]]></property>
<property name="version">2</property>
<property name="containerContent" class="Page" package="com.atlassian.confluence.pages"><id name="id">{container}</id></property>
</object>"#
        )
    }

    pub(crate) fn sample_dump() -> String {
        [
            page_object("1", "Other Space", None, "current"),
            page_object("2", "Human Resources", None, "current"),
            page_object("3", "Policies", Some("2"), "current"),
            page_object("4", "Leave", Some("3"), "current"),
            page_object("5", "Sick Leave", Some("4"), "current"),
            page_object("6", "Draft", Some("3"), "draft"),
            page_object("7", "Benefits", Some("2"), "current"),
            body_object("3", "<p>Policy intro</p>"),
            body_object("4", "<p>Leave rules</p>"),
            attachment_object("900", "form.pdf", "4"),
        ]
        .join("\n")
    }

    #[test]
    fn test_extract_keeps_current_records() {
        let dump = PatternExtractor::new().unwrap().extract(&sample_dump()).unwrap();

        let ids: Vec<_> = dump.pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5", "7"]);
        assert_eq!(dump.pages[3].parent_id.as_deref(), Some("3"));
        assert_eq!(dump.pages[3].body_content_id.as_deref(), Some("40"));
        assert_eq!(dump.body_of(&dump.pages[3]), "<p>Leave rules</p>");
        assert_eq!(dump.body_of(&dump.pages[0]), "");
        assert_eq!(
            dump.attachments,
            vec![XmlAttachment {
                id: "900".to_string(),
                title: "form.pdf".to_string(),
                container_id: "4".to_string(),
                version: "2".to_string(),
            }]
        );
    }

    #[test]
    fn test_hierarchy_prefers_marker_and_flattens() {
        let dump = PatternExtractor::new().unwrap().extract(&sample_dump()).unwrap();

        let tree = XmlHierarchy::build(&dump, Some("human resources")).unwrap();
        assert_eq!(tree.root.id, "2");
        assert_eq!(tree.ignored_roots.len(), 1);
        let books: Vec<_> = tree.books.iter().map(|b| b.book.title.as_str()).collect();
        assert_eq!(books, vec!["Policies", "Benefits"]);
        let pages: Vec<_> = tree.books[0].pages.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(pages, vec!["Leave", "Sick Leave"]);
        assert_eq!(tree.page_count(), 2);

        let fallback = XmlHierarchy::build(&dump, None).unwrap();
        assert_eq!(fallback.root.id, "1");
        assert!(fallback.books.is_empty());

        assert!(XmlHierarchy::build(&XmlDump::default(), None).is_none());
    }

    #[test]
    fn test_convert_macros() {
        let tmp = TempDir::new().unwrap();
        let attachments = vec![XmlAttachment {
            id: "900".to_string(),
            title: "chart.png".to_string(),
            container_id: "4".to_string(),
            version: "1".to_string(),
        }];
        fs::create_dir_all(tmp.path().join("attachments/4/900")).unwrap();
        fs::write(tmp.path().join("attachments/4/900/1"), b"img").unwrap();
        let converter = StorageConverter::new(tmp.path(), &attachments).unwrap();

        let storage = concat!(
            r#"<ac:image ac:height="250"><ri:attachment ri:filename="chart.png" /></ac:image>"#,
            r#"<ac:image><ri:attachment ri:filename="gone.png" /></ac:image>"#,
            r#"<ac:structured-macro ac:name="view-file" ac:schema-version="1"><ac:parameter ac:name="name"><ri:attachment ri:filename="doc.pdf" /></ac:parameter></ac:structured-macro>"#,
            r#"<ac:link><ri:attachment ri:filename="a.xlsx" /><ac:plain-text-link-body><![CDATA[Sheet]]></ac:plain-text-link-body></ac:link>"#,
            r#"<ac:structured-macro ac:name="toc"><ac:parameter ac:name="x">1</ac:parameter></ac:structured-macro>"#,
            r#"<p><ac:emoticon ac:name="smile" />done</p>"#,
        );
        let html = converter.convert(storage, "4");

        assert!(html.contains(&format!(
            r#"<img src="data:image/png;base64,{}" alt="chart.png" />"#,
            STANDARD.encode(b"img")
        )));
        assert!(html.contains("<p>[Image: gone.png]</p>"));
        assert!(html.contains(r#"<p>📎 <a href="[ATTACHMENT:doc.pdf]">doc.pdf</a></p>"#));
        assert!(html.contains(r#"<a href="[ATTACHMENT:a.xlsx]">Sheet</a>"#));
        assert!(!html.contains("ac:"));
        assert!(html.ends_with("<p>done</p>"));
    }
}
