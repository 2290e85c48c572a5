// src/pipeline/import.rs

//! HTML export import: classify, rewrite, create, reconcile, persist.

use crate::api::CmsApi;
use crate::error::{AppError, Result};
use crate::models::{ExportDocument, Phase};
use crate::pipeline::context::RunContext;
use crate::pipeline::orchestrator::{DocumentSet, Orchestrator, PreparedDocument};
use crate::services::{LinkRewriter, ReconcileReport, TopologyClassifier, reconcile};
use crate::storage::ManifestStore;

/// Run the whole HTML pipeline for `ctx.export_dir`.
///
/// A missing export directory aborts before any remote call. Everything
/// after that is tolerant of per-item failures, which end up in
/// `ctx.summary`.
pub async fn run_import<A, S>(api: &A, store: &S, ctx: &mut RunContext) -> Result<ReconcileReport>
where
    A: CmsApi + ?Sized,
    S: ManifestStore + ?Sized,
{
    if !ctx.export_dir.is_dir() {
        return Err(AppError::setup(format!(
            "Export directory not found: {}",
            ctx.export_dir.display()
        )));
    }

    ctx.report(Phase::Analyze, "Classifying export documents");
    ctx.topology = TopologyClassifier::new(&ctx.export_dir).classify()?;
    ctx.report(
        Phase::Analyze,
        format!(
            "Found {} shelves, {} books, {} chapters, {} pages",
            ctx.topology.shelves.len(),
            ctx.topology.books.len(),
            ctx.topology.chapters.len(),
            ctx.topology.pages_in_books.len() + ctx.topology.pages_in_chapters.len()
        ),
    );

    let docs = prepare_documents(ctx);

    Orchestrator::new(api, &docs).run(ctx).await;

    ctx.report(Phase::Attachments, "Reconciling attachments");
    let report = reconcile(&ctx.export_dir, &mut ctx.manifest, &ctx.ids.pages)?;
    ctx.summary.attachment_records = report.records;
    ctx.summary.attachment_files = report.files;

    store.save(&ctx.export_id, &ctx.manifest).await?;
    ctx.report(
        Phase::Attachments,
        format!(
            "Saved {} attachment files across {} pages",
            report.files, report.records
        ),
    );
    Ok(report)
}

/// Rewrite every classified document. Unreadable documents are logged and
/// left out; the creation stage then records them as not created.
pub fn prepare_documents(ctx: &mut RunContext) -> DocumentSet {
    let mut rewriter = LinkRewriter::new(&ctx.export_dir, &ctx.topology);
    let mut docs = DocumentSet::new();

    for filename in ctx.topology.nodes.keys() {
        let outcome = ExportDocument::load(&ctx.export_dir, filename)
            .and_then(|doc| rewriter.rewrite(&doc, &mut ctx.manifest));
        match outcome {
            Ok(outcome) => {
                ctx.summary.unresolved_links.extend(
                    outcome
                        .unresolved
                        .into_iter()
                        .map(|link| (link.source, link.href)),
                );
                docs.insert(
                    filename.clone(),
                    PreparedDocument {
                        filename: filename.clone(),
                        title: outcome.title,
                        html: outcome.html,
                    },
                );
            }
            Err(e) => log::warn!("Could not rewrite {}: {}", filename, e),
        }
    }

    log::info!(
        "Prepared {} documents ({} unresolved links, {} pages with attachments)",
        docs.len(),
        ctx.summary.unresolved_links.len(),
        ctx.manifest.record_count()
    );
    docs
}
