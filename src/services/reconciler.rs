// src/services/reconciler.rs

//! Attachment reconciliation.
//!
//! The content scan in the rewriter only sees attachments that are linked
//! from page bodies. The filesystem scan here adds everything else found
//! under `attachments/<pageId>/`, then the backfill stamps each record with
//! the id of the page created for it.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::models::{AttachmentManifest, AttachmentRef, IdTable};
use crate::services::xml::XmlAttachment;

/// Counts reported after reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Files added by the filesystem scan
    pub added: usize,
    /// Records that received a page id
    pub linked: usize,
    pub records: usize,
    pub files: usize,
    /// Files whose page was never created
    pub orphaned: usize,
}

impl ReconcileReport {
    fn totals(mut self, manifest: &AttachmentManifest) -> Self {
        self.records = manifest.record_count();
        self.files = manifest.file_count();
        self.orphaned = manifest.orphaned_file_count();
        self
    }
}

/// Add every file under `<export>/attachments/<pageId>/` to the manifest.
///
/// Entries already present (by relative href) keep their content-scan
/// name. Returns the number of files added.
pub fn scan_attachment_dir(export_dir: &Path, manifest: &mut AttachmentManifest) -> Result<usize> {
    let root = export_dir.join("attachments");
    if !root.is_dir() {
        log::info!("No attachments folder in {}", export_dir.display());
        return Ok(0);
    }

    let mut folders: Vec<_> = fs::read_dir(&root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .collect();
    folders.sort_by_key(|e| e.file_name());

    let mut added = 0;
    for folder in folders {
        let Ok(page_id) = folder.file_name().into_string() else {
            continue;
        };
        let mut files: Vec<String> = fs::read_dir(folder.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        files.sort();

        for filename in files {
            let href = format!("attachments/{page_id}/{filename}");
            if manifest.add(&page_id, AttachmentRef::new(filename, href)) {
                added += 1;
            }
        }
    }

    log::debug!("Filesystem scan added {} attachment files", added);
    Ok(added)
}

/// Copy created page ids into the manifest. Only existing records are
/// touched; ids already set are left alone.
pub fn backfill_page_ids(manifest: &mut AttachmentManifest, pages: &IdTable) -> usize {
    let keys: Vec<String> = manifest.iter().map(|(k, _)| k.clone()).collect();
    keys.iter()
        .filter_map(|key| pages.get(key).map(|id| (key, id)))
        .filter(|(key, id)| manifest.assign_page(key, *id))
        .count()
}

/// Full reconciliation for the HTML variant: filesystem scan then backfill.
pub fn reconcile(
    export_dir: &Path,
    manifest: &mut AttachmentManifest,
    pages: &IdTable,
) -> Result<ReconcileReport> {
    let added = scan_attachment_dir(export_dir, manifest)?;
    let linked = backfill_page_ids(manifest, pages);

    let report = ReconcileReport {
        added,
        linked,
        ..Default::default()
    }
    .totals(manifest);

    log::info!(
        "Attachment records: {} pages, {} files ({} without a page)",
        report.records,
        report.files,
        report.orphaned
    );
    Ok(report)
}

/// Manifest entries for the XML variant: every current attachment whose
/// stored file exists, named by its title.
pub fn map_xml_attachments(
    export_dir: &Path,
    attachments: &[XmlAttachment],
    manifest: &mut AttachmentManifest,
) -> usize {
    let mut added = 0;
    for attachment in attachments {
        let href = attachment.relative_path();
        if !export_dir.join(&href).is_file() {
            log::debug!("Attachment file missing: {}", href);
            continue;
        }
        if manifest.add(
            &attachment.container_id,
            AttachmentRef::new(attachment.title.clone(), href),
        ) {
            added += 1;
        }
    }
    log::info!(
        "Mapped {} attachments across {} pages",
        manifest.file_count(),
        manifest.record_count()
    );
    added
}
