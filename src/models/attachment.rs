//! Attachment records keyed by source page.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier the remote CMS assigns to created entities.
pub type RemoteId = u64;

/// One attachment referenced by a source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Display name
    pub name: String,
    /// Path relative to the export directory
    pub href: String,
}

impl AttachmentRef {
    pub fn new(name: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            href: href.into(),
        }
    }
}

/// Attachments of one source page plus the id of its migrated page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRecord {
    pub attachments: Vec<AttachmentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_page_id: Option<RemoteId>,
}

impl AttachmentRecord {
    fn contains(&self, href: &str) -> bool {
        self.attachments.iter().any(|a| a.href == href)
    }
}

/// Page-keyed attachment store shared by the content scan, the filesystem
/// scan and the id backfill.
///
/// Entries are deduplicated by relative href; the first writer's display
/// name is kept. `new_page_id` is written at most once per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentManifest {
    records: BTreeMap<String, AttachmentRecord>,
}

impl AttachmentManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attachment to a page's record. Returns `false` when the href
    /// was already recorded for that page.
    pub fn add(&mut self, previous_id: &str, attachment: AttachmentRef) -> bool {
        let record = self.records.entry(previous_id.to_string()).or_default();
        if record.contains(&attachment.href) {
            return false;
        }
        record.attachments.push(attachment);
        true
    }

    /// Record the migrated page id for a source page.
    ///
    /// Only existing records without an id are updated; the return value
    /// tells whether the assignment happened.
    pub fn assign_page(&mut self, previous_id: &str, page_id: RemoteId) -> bool {
        match self.records.get_mut(previous_id) {
            Some(record) if record.new_page_id.is_none() => {
                record.new_page_id = Some(page_id);
                true
            }
            Some(record) => {
                log::warn!(
                    "Attachment record {} already points at page {:?}; ignoring {}",
                    previous_id,
                    record.new_page_id,
                    page_id
                );
                false
            }
            None => false,
        }
    }

    pub fn get(&self, previous_id: &str) -> Option<&AttachmentRecord> {
        self.records.get(previous_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttachmentRecord)> {
        self.records.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of pages with at least one attachment.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Number of attachment files across all pages.
    pub fn file_count(&self) -> usize {
        self.records.values().map(|r| r.attachments.len()).sum()
    }

    /// Number of files whose page was never created.
    pub fn orphaned_file_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.new_page_id.is_none())
            .map(|r| r.attachments.len())
            .sum()
    }

    /// Flatten to `href -> (name, new page id)` for link resolution.
    pub fn path_map(&self) -> BTreeMap<String, (String, Option<RemoteId>)> {
        self.records
            .values()
            .flat_map(|record| {
                record
                    .attachments
                    .iter()
                    .map(move |a| (a.href.clone(), (a.name.clone(), record.new_page_id)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_deduplicates_by_href() {
        let mut manifest = AttachmentManifest::new();
        assert!(manifest.add("10", AttachmentRef::new("Report", "attachments/10/1.pdf")));
        assert!(!manifest.add("10", AttachmentRef::new("1.pdf", "attachments/10/1.pdf")));
        assert!(manifest.add("10", AttachmentRef::new("2.png", "attachments/10/2.png")));

        let record = manifest.get("10").unwrap();
        assert_eq!(record.attachments.len(), 2);
        assert_eq!(record.attachments[0].name, "Report");
    }

    #[test]
    fn test_assign_page_once() {
        let mut manifest = AttachmentManifest::new();
        manifest.add("10", AttachmentRef::new("a", "attachments/10/a"));

        assert!(manifest.assign_page("10", 500));
        assert!(!manifest.assign_page("10", 501));
        assert!(!manifest.assign_page("99", 502));
        assert_eq!(manifest.get("10").unwrap().new_page_id, Some(500));
    }

    #[test]
    fn test_counts() {
        let mut manifest = AttachmentManifest::new();
        manifest.add("1", AttachmentRef::new("a", "attachments/1/a"));
        manifest.add("1", AttachmentRef::new("b", "attachments/1/b"));
        manifest.add("2", AttachmentRef::new("c", "attachments/2/c"));
        manifest.assign_page("1", 7);

        assert_eq!(manifest.record_count(), 2);
        assert_eq!(manifest.file_count(), 3);
        assert_eq!(manifest.orphaned_file_count(), 1);
        assert_eq!(
            manifest.path_map().get("attachments/1/b"),
            Some(&("b".to_string(), Some(7)))
        );
    }

    #[test]
    fn test_serialized_shape() {
        let mut manifest = AttachmentManifest::new();
        manifest.add("1", AttachmentRef::new("a.png", "attachments/1/a.png"));
        manifest.assign_page("1", 9);

        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["1"]["newPageId"], 9);
        assert_eq!(json["1"]["attachments"][0]["href"], "attachments/1/a.png");
    }
}
