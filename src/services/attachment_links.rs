// src/services/attachment_links.rs

//! Resolution of attachment links once attachments exist remotely.
//!
//! Two shapes are rewritten to `/attachments/<id>`:
//! - export paths, `href="attachments/<pageId>/<file>"`, resolved through
//!   the manifest's path map after the same normalisation the manifest
//!   keys get (query dropped, percent-decoded); server download links,
//!   `href=".../download/attachments/<pageId>/<file>"`, by file name,
//! - placeholders, `href="[ATTACHMENT:<file>]"` with raw, URL-encoded or
//!   entity-encoded brackets, resolved by file name.

use std::collections::{BTreeMap, HashMap};

use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};

use crate::error::{AppError, Result};
use crate::models::RemoteId;
use crate::utils::{attachment_path, file_name};

/// Remote attachments keyed by `"<pageId>:<lower-case name>"`.
#[derive(Debug, Clone, Default)]
pub struct AttachmentLookup {
    by_key: HashMap<String, RemoteId>,
    /// `(lower-case name, id)` in listing order for cross-page matches
    ordered: Vec<(String, RemoteId)>,
}

impl AttachmentLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, page_id: RemoteId, name: &str, attachment_id: RemoteId) {
        let name = name.to_lowercase();
        let key = format!("{page_id}:{name}");
        if self.by_key.insert(key, attachment_id).is_none() {
            self.ordered.push((name, attachment_id));
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Attachment named `name` on `page_id`.
    pub fn on_page(&self, page_id: RemoteId, name: &str) -> Option<RemoteId> {
        self.by_key
            .get(&format!("{page_id}:{}", name.to_lowercase()))
            .copied()
    }

    /// Lookup order for placeholders: the current page, then any page by
    /// exact name, then any page comparing URL-decoded names.
    pub fn find(&self, current_page: Option<RemoteId>, filename: &str) -> Option<RemoteId> {
        let wanted = filename.to_lowercase();
        if let Some(id) = current_page.and_then(|page| self.on_page(page, &wanted)) {
            return Some(id);
        }
        if let Some((_, id)) = self.ordered.iter().find(|(name, _)| *name == wanted) {
            return Some(*id);
        }
        self.ordered
            .iter()
            .find(|(name, _)| decode(name).to_lowercase() == wanted)
            .map(|(_, id)| *id)
    }
}

impl FromIterator<(RemoteId, String, RemoteId)> for AttachmentLookup {
    fn from_iter<I: IntoIterator<Item = (RemoteId, String, RemoteId)>>(iter: I) -> Self {
        let mut lookup = Self::new();
        for (page, name, id) in iter {
            lookup.insert(page, &name, id);
        }
        lookup
    }
}

/// A link that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedLink {
    pub target: String,
    pub reason: &'static str,
}

/// Result of fixing one page body.
#[derive(Debug, Clone, Default)]
pub struct LinkFix {
    pub html: String,
    pub replacements: usize,
    pub unmatched: Vec<UnmatchedLink>,
}

/// Path map entry: display name and the page it was uploaded to.
pub type PathEntry = (String, Option<RemoteId>);

/// Rewrites attachment links in page bodies.
pub struct AttachmentLinkFixer {
    path_map: BTreeMap<String, PathEntry>,
    lookup: AttachmentLookup,
    export_link: Regex,
    placeholder: Regex,
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

impl AttachmentLinkFixer {
    pub fn new(path_map: BTreeMap<String, PathEntry>, lookup: AttachmentLookup) -> Result<Self> {
        let compile =
            |re: &str| Regex::new(re).map_err(|e| AppError::validation(format!("{re}: {e}")));
        Ok(Self {
            path_map,
            lookup,
            export_link: compile(
                r#"(?i)href=["']((?:[^"']*/download/)?attachments/\d+/[^"']+)["']"#,
            )?,
            placeholder: compile(
                r#"(?i)href=["'](?:\[|%5B|&#91;|&#x5B;)ATTACHMENT:([^\]"']+?)(?:\]|%5D|&#93;|&#x5D;)["']"#,
            )?,
        })
    }

    /// Quick check before fetching a page body in full.
    pub fn may_contain_links(html: &str) -> bool {
        html.contains("attachments/")
            || html.contains("ATTACHMENT:")
            || html.contains("%5BATTACHMENT")
            || html.contains("&#91;ATTACHMENT")
    }

    pub fn lookup(&self) -> &AttachmentLookup {
        &self.lookup
    }

    /// Rewrite the links of one page body.
    pub fn fix(&self, html: &str, current_page: Option<RemoteId>) -> LinkFix {
        let mut replacements = 0;
        let mut unmatched = Vec::new();

        let html = self.export_link.replace_all(html, |c: &Captures<'_>| {
            let path = &c[1];
            if let Some(start) = path.find("/download/") {
                let local = attachment_path(&path[start + "/download/".len()..]);
                return match self.lookup.find(current_page, file_name(&local)) {
                    Some(id) => {
                        replacements += 1;
                        format!(r#"href="/attachments/{id}""#)
                    }
                    None => {
                        unmatched.push(UnmatchedLink {
                            target: path.to_string(),
                            reason: "no remote attachment",
                        });
                        c[0].to_string()
                    }
                };
            }
            let Some((name, page)) = self.path_map.get(&attachment_path(path)) else {
                unmatched.push(UnmatchedLink {
                    target: path.to_string(),
                    reason: "no mapping found",
                });
                return c[0].to_string();
            };
            match page.and_then(|page| self.lookup.on_page(page, name)) {
                Some(id) => {
                    replacements += 1;
                    format!(r#"href="/attachments/{id}""#)
                }
                None => {
                    unmatched.push(UnmatchedLink {
                        target: path.to_string(),
                        reason: "no remote attachment",
                    });
                    c[0].to_string()
                }
            }
        });

        let html = self.placeholder.replace_all(&html, |c: &Captures<'_>| {
            let filename = decode(&c[1]);
            match self.lookup.find(current_page, filename.trim()) {
                Some(id) => {
                    replacements += 1;
                    format!(r#"href="/attachments/{id}""#)
                }
                None => {
                    unmatched.push(UnmatchedLink {
                        target: c[1].to_string(),
                        reason: "placeholder not matched",
                    });
                    c[0].to_string()
                }
            }
        });

        LinkFix {
            html: html.into_owned(),
            replacements,
            unmatched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixer() -> AttachmentLinkFixer {
        let mut path_map = BTreeMap::new();
        path_map.insert(
            "attachments/10/1.pdf".to_string(),
            ("Report.pdf".to_string(), Some(500)),
        );
        path_map.insert(
            "attachments/20/2.pdf".to_string(),
            ("Orphan.pdf".to_string(), None),
        );
        let lookup: AttachmentLookup = vec![
            (500, "report.PDF".to_string(), 9001),
            (500, "chart.png".to_string(), 9002),
            (600, "chart.png".to_string(), 9003),
            (600, "My%20File.txt".to_string(), 9004),
        ]
        .into_iter()
        .collect();
        AttachmentLinkFixer::new(path_map, lookup).unwrap()
    }

    #[test]
    fn test_export_paths_resolved_via_manifest() {
        let out = fixer().fix(
            r#"<a href="attachments/10/1.pdf">r</a><a href="attachments/20/2.pdf">o</a><a href="attachments/30/3.pdf">x</a>"#,
            None,
        );

        assert!(out.html.contains(r#"href="/attachments/9001""#));
        assert!(out.html.contains(r#"href="attachments/20/2.pdf""#));
        assert_eq!(out.replacements, 1);
        let reasons: Vec<_> = out.unmatched.iter().map(|u| u.reason).collect();
        assert_eq!(reasons, vec!["no remote attachment", "no mapping found"]);
    }

    #[test]
    fn test_export_paths_normalised_before_lookup() {
        let mut path_map = BTreeMap::new();
        path_map.insert(
            "attachments/10/Q3 Plan.pdf".to_string(),
            ("Q3 Plan.pdf".to_string(), Some(500)),
        );
        path_map.insert(
            "attachments/10/1.pdf".to_string(),
            ("Report.pdf".to_string(), Some(500)),
        );
        let lookup: AttachmentLookup = vec![
            (500, "Q3 Plan.pdf".to_string(), 7001),
            (500, "Report.pdf".to_string(), 7002),
        ]
        .into_iter()
        .collect();
        let fixer = AttachmentLinkFixer::new(path_map, lookup).unwrap();

        let out = fixer.fix(
            concat!(
                r#"<a href="attachments/10/1.pdf?version=1&amp;modificationDate=2">r</a>"#,
                r#"<a href="attachments/10/Q3%20Plan.pdf">q</a>"#,
            ),
            Some(500),
        );

        assert_eq!(
            out.html,
            r#"<a href="/attachments/7002">r</a><a href="/attachments/7001">q</a>"#
        );
        assert_eq!(out.replacements, 2);
        assert!(out.unmatched.is_empty());
    }

    #[test]
    fn test_server_download_links_resolved_by_name() {
        let fixer = fixer();
        let out = fixer.fix(
            concat!(
                r#"<a href="/wiki/download/attachments/10/chart.png?api=v2">c</a>"#,
                r#"<a href="/wiki/download/attachments/10/gone.png">g</a>"#,
            ),
            Some(600),
        );

        assert!(out.html.contains(r#"href="/attachments/9003""#));
        assert!(out.html.contains("download/attachments/10/gone.png"));
        assert_eq!(out.replacements, 1);
        assert_eq!(out.unmatched.len(), 1);
    }

    #[test]
    fn test_placeholders_in_every_encoding() {
        let fixer = fixer();
        for href in [
            "[ATTACHMENT:chart.png]",
            "%5BATTACHMENT:chart.png%5D",
            "&#91;ATTACHMENT:chart.png&#93;",
            "&#x5B;ATTACHMENT:chart.png&#x5D;",
        ] {
            let out = fixer.fix(&format!(r#"<a href="{href}">c</a>"#), Some(600));
            assert_eq!(out.html, r#"<a href="/attachments/9003">c</a>"#, "{href}");
        }
    }

    #[test]
    fn test_placeholder_lookup_order() {
        let lookup = fixer().lookup().clone();
        assert_eq!(lookup.find(Some(600), "Chart.png"), Some(9003));
        assert_eq!(lookup.find(Some(700), "chart.png"), Some(9002));
        assert_eq!(lookup.find(None, "my file.txt"), Some(9004));
        assert_eq!(lookup.find(None, "nothing.txt"), None);
    }

    #[test]
    fn test_unmatched_placeholder_left_alone() {
        let out = fixer().fix(r#"<a href="[ATTACHMENT:missing.doc]">m</a>"#, Some(500));
        assert_eq!(out.html, r#"<a href="[ATTACHMENT:missing.doc]">m</a>"#);
        assert_eq!(out.replacements, 0);
        assert_eq!(out.unmatched[0].target, "missing.doc");
    }

    #[test]
    fn test_may_contain_links() {
        assert!(AttachmentLinkFixer::may_contain_links(r#"<a href="attachments/1/2">"#));
        assert!(AttachmentLinkFixer::may_contain_links("%5BATTACHMENT:x%5D"));
        assert!(!AttachmentLinkFixer::may_contain_links("<p>plain</p>"));
    }
}
