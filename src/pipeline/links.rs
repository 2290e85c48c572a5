// src/pipeline/links.rs

//! Attachment link resolution pass.
//!
//! Runs after the upload stage, once both pages and attachments exist
//! remotely, and points every attachment link at `/attachments/<id>`.

use std::time::Duration;

use crate::api::{CmsApi, PageUpdate, collect_all};
use crate::error::Result;
use crate::models::{AttachmentManifest, Level, Phase};
use crate::pipeline::context::RunContext;
use crate::services::{AttachmentLinkFixer, AttachmentLookup};
use crate::storage::ManifestStore;

/// Outcome of a link-fix run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkFixReport {
    pub pages_scanned: usize,
    pub pages_updated: usize,
    pub links_fixed: usize,
    pub unmatched: usize,
    /// Page names that could not be read or updated
    pub failed: Vec<String>,
}

/// Rewrite attachment links on every remote page.
pub async fn run_fix_links<A, S>(api: &A, store: &S, ctx: &mut RunContext) -> Result<LinkFixReport>
where
    A: CmsApi + ?Sized,
    S: ManifestStore + ?Sized,
{
    let manifest = store.load(&ctx.export_id).await?.unwrap_or_default();
    fix_links(api, &manifest, ctx).await
}

/// Same as [`run_fix_links`] with the manifest already at hand.
pub async fn fix_links<A>(
    api: &A,
    manifest: &AttachmentManifest,
    ctx: &mut RunContext,
) -> Result<LinkFixReport>
where
    A: CmsApi + ?Sized,
{
    ctx.report(Phase::LinkFix, "Listing remote attachments and pages");
    let attachments = collect_all(|offset, count| api.list_attachments(offset, count)).await?;
    let pages = collect_all(|offset, count| api.list_pages(offset, count)).await?;

    let lookup: AttachmentLookup = attachments
        .iter()
        .map(|a| (a.uploaded_to, a.name.clone(), a.id))
        .collect();
    let fixer = AttachmentLinkFixer::new(manifest.path_map(), lookup)?;
    log::info!(
        "Fixing attachment links: {} attachments, {} pages",
        fixer.lookup().len(),
        pages.len()
    );

    let mut report = LinkFixReport::default();
    let total = pages.len();
    for (i, summary) in pages.iter().enumerate() {
        if ctx.is_cancelled() {
            ctx.summary.cancelled = true;
            break;
        }
        report.pages_scanned += 1;

        let page = match api.get_page(summary.id).await {
            Ok(page) => page,
            Err(e) => {
                log::warn!("Could not read page {}: {}", summary.name, e);
                report.failed.push(summary.name.clone());
                continue;
            }
        };
        if !AttachmentLinkFixer::may_contain_links(&page.html) {
            continue;
        }

        let fix = fixer.fix(&page.html, Some(page.id));
        report.unmatched += fix.unmatched.len();
        for link in &fix.unmatched {
            log::debug!("{}: {} ({})", page.name, link.target, link.reason);
        }
        if fix.replacements == 0 {
            continue;
        }

        let update = PageUpdate {
            name: page.name.clone(),
            html: fix.html,
            book_id: page.book_id,
        };
        match api.update_page(page.id, &update).await {
            Ok(()) => {
                report.pages_updated += 1;
                report.links_fixed += fix.replacements;
                ctx.report_at(
                    Phase::LinkFix,
                    format!("Fixed {} links in {}", fix.replacements, page.name),
                    i + 1,
                    total,
                    Level::Success,
                );
            }
            Err(e) => {
                log::warn!("Could not update page {}: {}", page.name, e);
                report.failed.push(page.name.clone());
            }
        }
        if ctx.pacing.link_fix_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(ctx.pacing.link_fix_delay_ms)).await;
        }
    }

    log::info!(
        "Updated {} of {} pages, fixed {} links ({} unmatched)",
        report.pages_updated,
        report.pages_scanned,
        report.links_fixed,
        report.unmatched
    );
    Ok(report)
}
