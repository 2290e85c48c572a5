// src/pipeline/upload.rs

//! Attachment upload stage.
//!
//! Reads the manifest persisted by an import and uploads every file whose
//! page was created. Nothing here re-parses the export.

use std::time::Duration;

use crate::api::{CmsApi, NewAttachment};
use crate::error::{AppError, Result};
use crate::models::{Level, Phase};
use crate::pipeline::context::RunContext;
use crate::storage::ManifestStore;

/// Outcome of an upload run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: usize,
    /// `name: error` for each failed upload
    pub failed: Vec<String>,
    /// Files whose page was never created
    pub skipped_no_page: usize,
    pub skipped_missing: usize,
    pub skipped_too_large: usize,
    /// Files not attempted because the run was cancelled
    pub skipped_cancelled: usize,
}

impl UploadReport {
    pub fn skipped(&self) -> usize {
        self.skipped_no_page + self.skipped_missing + self.skipped_too_large + self.skipped_cancelled
    }
}

/// Upload the attachments recorded for `ctx.export_id`.
pub async fn run_upload<A, S>(
    api: &A,
    store: &S,
    max_file_bytes: u64,
    ctx: &mut RunContext,
) -> Result<UploadReport>
where
    A: CmsApi + ?Sized,
    S: ManifestStore + ?Sized,
{
    let Some(manifest) = store.load(&ctx.export_id).await? else {
        return Err(AppError::setup(format!(
            "No attachment records for {}; run the import first",
            ctx.export_id
        )));
    };
    let mut report = UploadReport::default();

    let mut queue = Vec::new();
    for (_, record) in manifest.iter() {
        let Some(page_id) = record.new_page_id else {
            report.skipped_no_page += record.attachments.len();
            continue;
        };
        for attachment in &record.attachments {
            let path = ctx.export_dir.join(&attachment.href);
            let size = match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => meta.len(),
                _ => {
                    log::warn!("Attachment file not found: {}", path.display());
                    report.skipped_missing += 1;
                    continue;
                }
            };
            if size > max_file_bytes {
                log::warn!(
                    "Skipping large file ({}MB): {}",
                    size / (1024 * 1024),
                    attachment.name
                );
                report.skipped_too_large += 1;
                continue;
            }
            queue.push(NewAttachment {
                uploaded_to: page_id,
                name: attachment.name.clone(),
                path,
            });
        }
    }

    if report.skipped_no_page > 0 {
        ctx.warn(
            Phase::Upload,
            format!(
                "Skipped {} attachments whose pages were not imported",
                report.skipped_no_page
            ),
        );
    }
    ctx.report(
        Phase::Upload,
        format!("Starting upload of {} attachments", queue.len()),
    );

    let total = queue.len();
    for (i, attachment) in queue.iter().enumerate() {
        if ctx.is_cancelled() {
            report.skipped_cancelled = total - i;
            ctx.summary.cancelled = true;
            break;
        }
        match api.upload_attachment(attachment).await {
            Ok(_) => {
                report.uploaded += 1;
                ctx.report_at(
                    Phase::Upload,
                    format!("Uploaded {}", attachment.name),
                    i + 1,
                    total,
                    Level::Success,
                );
            }
            Err(e) => {
                log::warn!("Failed to upload {}: {}", attachment.name, e);
                report.failed.push(format!("{}: {}", attachment.name, e));
            }
        }
        if ctx.pacing.upload_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(ctx.pacing.upload_delay_ms)).await;
        }
    }

    log::info!(
        "Uploaded {} attachments ({} failed, {} skipped)",
        report.uploaded,
        report.failed.len(),
        report.skipped()
    );
    Ok(report)
}
