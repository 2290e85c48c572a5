// src/services/rewriter.rs

//! Link and attachment rewriter.
//!
//! Turns one export document into the body that is sent to the CMS:
//!
//! 1. chrome and stale attachment listings are dropped,
//! 2. internal `.html` links become destination paths,
//! 3. attachment links are recorded in the [`AttachmentManifest`],
//! 4. local images are inlined as `data:` URIs.
//!
//! All of this happens while serialising, so dropped sections are never
//! scanned.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ego_tree::NodeId;
use scraper::{ElementRef, Html};

use crate::error::Result;
use crate::models::{AttachmentManifest, AttachmentRef, EntityKind, ExportDocument, Topology};
use crate::utils::html::{NodeAction, element_text, render_body, selector};
use crate::utils::{attachment_path, file_name, mime_for, slugify, strip_query};

/// Selectors of sections removed before the link scan.
const STRIPPED: &[&str] = &[
    "#title-heading",
    "#breadcrumbs",
    ".footer-body",
    ".plugin_attachments_upload_container",
    ".download-all-link",
];

const SERVER_ATTACHMENT_PREFIX: &str = "/download/attachments/";

/// An internal link whose target could not be classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLink {
    /// Document containing the link
    pub source: String,
    /// Href as written in the source
    pub href: String,
}

/// Result of rewriting one document.
#[derive(Debug, Clone, Default)]
pub struct RewriteOutcome {
    pub title: String,
    pub html: String,
    pub unresolved: Vec<PendingLink>,
    pub links_rewritten: usize,
    pub attachments_found: usize,
    pub images_inlined: usize,
}

/// What the rewriter needs to know about a link target.
#[derive(Debug, Clone)]
struct TargetInfo {
    slug: String,
    book_file: Option<String>,
}

/// Lazily read, memoised titles of link targets.
#[derive(Debug)]
pub struct TitleIndex {
    dir: PathBuf,
    cache: HashMap<String, TargetInfo>,
}

impl TitleIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: HashMap::new(),
        }
    }

    /// Slug of a target's title; falls back to the filename when the file
    /// cannot be read.
    pub fn slug(&mut self, filename: &str) -> String {
        self.info(filename).slug.clone()
    }

    /// File name of the book a chapter or page belongs to.
    pub fn book_of(&mut self, filename: &str) -> Option<String> {
        self.info(filename).book_file.clone()
    }

    fn info(&mut self, filename: &str) -> &TargetInfo {
        if !self.cache.contains_key(filename) {
            let info = match ExportDocument::load(&self.dir, filename) {
                Ok(doc) => TargetInfo {
                    slug: slugify(&doc.display_title()),
                    book_file: doc.crumb_target(2),
                },
                Err(e) => {
                    log::warn!("Could not read link target {}: {}", filename, e);
                    TargetInfo {
                        slug: slug_from_filename(filename),
                        book_file: None,
                    }
                }
            };
            self.cache.insert(filename.to_string(), info);
        }
        &self.cache[filename]
    }
}

/// `Some-Page_123.html` -> `some-page`.
fn slug_from_filename(filename: &str) -> String {
    let stem = filename.strip_suffix(".html").unwrap_or(filename);
    let stem = match stem.rsplit_once('_') {
        Some((head, id)) if id.bytes().all(|b| b.is_ascii_digit()) => head,
        _ => stem,
    };
    stem.to_lowercase()
}

/// Rewrites the documents of one export against its topology.
pub struct LinkRewriter<'a> {
    dir: PathBuf,
    topology: &'a Topology,
    titles: TitleIndex,
}

impl<'a> LinkRewriter<'a> {
    pub fn new(dir: impl Into<PathBuf>, topology: &'a Topology) -> Self {
        let dir = dir.into();
        Self {
            titles: TitleIndex::new(&dir),
            dir,
            topology,
        }
    }

    /// Rewrite one document, recording its attachment links under the
    /// document's previous id.
    pub fn rewrite(
        &mut self,
        doc: &ExportDocument,
        manifest: &mut AttachmentManifest,
    ) -> Result<RewriteOutcome> {
        let dom = doc.dom();
        let dropped = stripped_nodes(&dom)?;
        let page_id = doc.previous_id();

        let mut outcome = RewriteOutcome {
            title: doc.display_title(),
            ..Default::default()
        };

        let html = render_body(&dom, &mut |element: ElementRef<'_>| {
            if dropped.contains(&element.id()) {
                return NodeAction::Drop;
            }
            match element.value().name() {
                "a" => self.visit_anchor(element, doc, &page_id, manifest, &mut outcome),
                "img" => self.visit_image(element, &mut outcome),
                _ => NodeAction::Keep,
            }
        });
        outcome.html = html.trim().to_string();

        log::debug!(
            "Rewrote {}: {} links, {} attachments, {} images, {} unresolved",
            doc.filename,
            outcome.links_rewritten,
            outcome.attachments_found,
            outcome.images_inlined,
            outcome.unresolved.len()
        );
        Ok(outcome)
    }

    fn visit_anchor(
        &mut self,
        element: ElementRef<'_>,
        doc: &ExportDocument,
        page_id: &str,
        manifest: &mut AttachmentManifest,
        outcome: &mut RewriteOutcome,
    ) -> NodeAction {
        let Some(href) = element.value().attr("href") else {
            return NodeAction::Keep;
        };

        if let Some(attachment) = attachment_ref(element, href) {
            outcome.attachments_found += 1;
            let local = attachment.href.clone();
            manifest.add(page_id, attachment);
            // Body href and manifest key must match.
            return if local == href {
                NodeAction::Keep
            } else {
                NodeAction::Attributes(replace_attr(element, "href", local))
            };
        }

        if !is_internal_link(href) {
            return NodeAction::Keep;
        }

        match self.destination(href) {
            Some(path) => {
                outcome.links_rewritten += 1;
                NodeAction::Attributes(replace_attr(element, "href", path))
            }
            None => {
                log::warn!("{}: could not resolve link target {}", doc.filename, href);
                outcome.unresolved.push(PendingLink {
                    source: doc.filename.clone(),
                    href: href.to_string(),
                });
                NodeAction::Keep
            }
        }
    }

    fn visit_image(&mut self, element: ElementRef<'_>, outcome: &mut RewriteOutcome) -> NodeAction {
        let Some(src) = element.value().attr("src") else {
            return NodeAction::Keep;
        };
        if is_absolute(src) || src.starts_with("data:") {
            return NodeAction::Keep;
        }

        match inline_image(&self.dir, src) {
            Some(uri) => {
                outcome.images_inlined += 1;
                NodeAction::Attributes(replace_attr(element, "src", uri))
            }
            None => NodeAction::Keep,
        }
    }

    /// Destination path for an internal link, if the target is classified.
    pub fn destination(&mut self, href: &str) -> Option<String> {
        let target = file_name(href).to_string();
        let kind = self.topology.kind_of(&target)?;

        match kind {
            EntityKind::Shelf => {
                // Shelves are named after their breadcrumb label.
                let slug = self
                    .topology
                    .node(&target)
                    .map(|node| slugify(&node.title))
                    .unwrap_or_else(|| self.titles.slug(&target));
                Some(format!("/shelves/{slug}"))
            }
            EntityKind::Book => Some(format!("/books/{}", self.titles.slug(&target))),
            EntityKind::Chapter | EntityKind::Page => {
                let book = self.titles.book_of(&target)?;
                let book_slug = self.titles.slug(&book);
                let slug = self.titles.slug(&target);
                Some(format!("/books/{book_slug}/{}/{slug}", kind.as_str()))
            }
        }
    }
}

/// Node ids of every element removed before the scan.
fn stripped_nodes(dom: &Html) -> Result<HashSet<NodeId>> {
    let mut ids = HashSet::new();
    for css in STRIPPED {
        let sel = selector(css)?;
        ids.extend(dom.select(&sel).map(|el| el.id()));
    }

    // The attachment listing with its version history: drop the whole
    // `.pageSection` around `#attachments`, or just the heading.
    let heading = selector("#attachments")?;
    if let Some(h2) = dom.select(&heading).next() {
        let section = h2
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().classes().any(|c| c == "pageSection"));
        ids.insert(section.unwrap_or(h2).id());
    }
    Ok(ids)
}

fn is_absolute(href: &str) -> bool {
    href.starts_with('/') || href.contains("://") || href.starts_with("mailto:")
}

/// Relative `.html` link into the same export.
fn is_internal_link(href: &str) -> bool {
    href.ends_with(".html") && !is_absolute(href)
}

/// Recognise an attachment link and normalise it to its export path.
fn attachment_ref(element: ElementRef<'_>, href: &str) -> Option<AttachmentRef> {
    if href.starts_with("attachments/") {
        let local = attachment_path(href);
        let text = element_text(element);
        let name = if text.is_empty() {
            file_name(&local).to_string()
        } else {
            text
        };
        return Some(AttachmentRef::new(name, local));
    }

    let start = href.find(SERVER_ATTACHMENT_PREFIX)?;
    let attrs = element.value();
    let Some(resource_id) = attrs.attr("data-linked-resource-id") else {
        log::debug!("Server attachment link without resource id: {}", href);
        return None;
    };
    let container = strip_query(&href[start + SERVER_ATTACHMENT_PREFIX.len()..])
        .split('/')
        .next()
        .filter(|c| !c.is_empty())?;
    let alias = attrs
        .attr("data-linked-resource-default-alias")
        .unwrap_or_default();
    let ext = alias
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{ext}"))
        .unwrap_or_default();
    let name = if alias.is_empty() {
        element_text(element)
    } else {
        alias.to_string()
    };

    Some(AttachmentRef::new(
        name,
        format!("attachments/{container}/{resource_id}{ext}"),
    ))
}

/// The element's attributes with `name` set to `value`.
fn replace_attr(element: ElementRef<'_>, name: &str, value: String) -> Vec<(String, String)> {
    let mut value = Some(value);
    let mut attrs: Vec<(String, String)> = element
        .value()
        .attrs()
        .map(|(k, v)| {
            if k == name {
                (k.to_string(), value.take().unwrap_or_default())
            } else {
                (k.to_string(), v.to_string())
            }
        })
        .collect();
    if let Some(value) = value {
        attrs.push((name.to_string(), value));
    }
    attrs
}

/// Read a local image and encode it as a `data:` URI.
fn inline_image(dir: &Path, src: &str) -> Option<String> {
    let relative = strip_query(src);
    let path = dir.join(relative);
    if !path.is_file() {
        return None;
    }
    match fs::read(&path) {
        Ok(bytes) => Some(format!(
            "data:{};base64,{}",
            mime_for(relative),
            STANDARD.encode(bytes)
        )),
        Err(e) => {
            log::warn!("Could not inline image {}: {}", path.display(), e);
            None
        }
    }
}
