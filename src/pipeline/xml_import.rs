// src/pipeline/xml_import.rs

//! `entities.xml` import.
//!
//! The chosen root page becomes a shelf, its children books (body in a
//! `_General` page) and everything below a book becomes a page of it.

use std::time::Duration;

use crate::api::{CmsApi, NewBook, NewPage, NewShelf};
use crate::error::{AppError, Result};
use crate::models::{EntityKind, Level, Phase, RemoteId};
use crate::pipeline::context::RunContext;
use crate::pipeline::orchestrator::GENERAL_PAGE;
use crate::services::xml::{EntityExtractor, StorageConverter, XmlBookPlan, XmlDump, XmlHierarchy};
use crate::services::{ReconcileReport, backfill_page_ids, map_xml_attachments};
use crate::storage::ManifestStore;

/// File name of the dump inside an XML export.
pub const ENTITIES_FILE: &str = "entities.xml";

/// Run the XML pipeline for `ctx.export_dir`.
///
/// A missing `entities.xml` or an unreadable dump aborts before any remote
/// call.
pub async fn run_xml_import<A, S, E>(
    api: &A,
    store: &S,
    extractor: &E,
    root_marker: Option<&str>,
    ctx: &mut RunContext,
) -> Result<ReconcileReport>
where
    A: CmsApi + ?Sized,
    S: ManifestStore + ?Sized,
    E: EntityExtractor + ?Sized,
{
    let xml_path = ctx.export_dir.join(ENTITIES_FILE);
    if !xml_path.is_file() {
        return Err(AppError::setup(format!(
            "{} not found at {}",
            ENTITIES_FILE,
            xml_path.display()
        )));
    }

    ctx.report(Phase::XmlImport, format!("Reading {ENTITIES_FILE}"));
    let xml = tokio::fs::read_to_string(&xml_path).await?;
    let dump = extractor.extract(&xml)?;

    let added = map_xml_attachments(&ctx.export_dir, &dump.attachments, &mut ctx.manifest);
    let converter = StorageConverter::new(&ctx.export_dir, &dump.attachments)?;

    match XmlHierarchy::build(&dump, root_marker) {
        Some(hierarchy) => {
            ctx.report(
                Phase::XmlImport,
                format!(
                    "Creating shelf {} with {} books and {} pages",
                    hierarchy.root.title,
                    hierarchy.books.len(),
                    hierarchy.page_count()
                ),
            );
            XmlCreator {
                api,
                dump: &dump,
                converter: &converter,
            }
            .run(&hierarchy, ctx)
            .await;
        }
        None => log::warn!("No root page in {}; nothing to create", xml_path.display()),
    }

    let linked = backfill_page_ids(&mut ctx.manifest, &ctx.ids.pages);
    let report = ReconcileReport {
        added,
        linked,
        records: ctx.manifest.record_count(),
        files: ctx.manifest.file_count(),
        orphaned: ctx.manifest.orphaned_file_count(),
    };
    ctx.summary.attachment_records = report.records;
    ctx.summary.attachment_files = report.files;

    store.save(&ctx.export_id, &ctx.manifest).await?;
    ctx.report_at(
        Phase::XmlImport,
        format!(
            "XML import complete: {} books, {} pages, {} attachment files",
            ctx.summary.books.created, ctx.summary.pages.created, report.files
        ),
        1,
        1,
        Level::Success,
    );
    Ok(report)
}

struct XmlCreator<'a, A: CmsApi + ?Sized> {
    api: &'a A,
    dump: &'a XmlDump,
    converter: &'a StorageConverter,
}

impl<A: CmsApi + ?Sized> XmlCreator<'_, A> {
    fn html(&self, page: &crate::services::xml::XmlPage) -> String {
        self.converter.convert(self.dump.body_of(page), &page.id)
    }

    async fn pace(ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    async fn run(&self, hierarchy: &XmlHierarchy, ctx: &mut RunContext) {
        let root = &hierarchy.root;
        if ctx.is_cancelled() {
            ctx.summary.shelves.skipped += 1;
            self.skip_books(ctx, &hierarchy.books);
            return;
        }

        let shelf_id = match self
            .api
            .create_shelf(&NewShelf {
                name: root.title.clone(),
                books: Vec::new(),
            })
            .await
        {
            Ok(created) => {
                ctx.ids.shelves.insert(&root.id, created.id);
                ctx.summary.shelves.created += 1;
                Some(created.id)
            }
            Err(e) => {
                log::warn!("Could not create shelf {}: {}", root.title, e);
                ctx.summary.shelves.not_created.push(root.title.clone());
                None
            }
        };
        Self::pace(ctx.pacing.shelf_delay_ms).await;

        let mut book_ids = Vec::new();
        for (i, plan) in hierarchy.books.iter().enumerate() {
            if ctx.is_cancelled() {
                self.skip_books(ctx, &hierarchy.books[i..]);
                break;
            }
            if let Some(id) = self.create_book(ctx, plan).await {
                book_ids.push(id);
            }
            ctx.report_at(
                Phase::XmlImport,
                format!("Processed book {}", plan.book.title),
                i + 1,
                hierarchy.books.len(),
                Level::Info,
            );
        }

        if let Some(shelf_id) = shelf_id.filter(|_| !book_ids.is_empty()) {
            match self.api.update_shelf_books(shelf_id, &book_ids).await {
                Ok(()) => log::info!("Assigned {} books to shelf {}", book_ids.len(), shelf_id),
                Err(e) => ctx.warn(
                    Phase::XmlImport,
                    format!("Could not assign books to shelf {shelf_id}: {e}"),
                ),
            }
        }
        if ctx.is_cancelled() {
            ctx.summary.cancelled = true;
        }
    }

    fn skip_books(&self, ctx: &mut RunContext, books: &[XmlBookPlan]) {
        ctx.summary.cancelled = true;
        ctx.summary.books.skipped += books.len();
        ctx.summary.pages.skipped += books.iter().map(|b| b.pages.len()).sum::<usize>();
    }

    async fn create_book(&self, ctx: &mut RunContext, plan: &XmlBookPlan) -> Option<RemoteId> {
        let book = &plan.book;
        let book_id = match self
            .api
            .create_book(&NewBook {
                name: book.title.clone(),
            })
            .await
        {
            Ok(created) => created.id,
            Err(e) => {
                log::warn!("Could not create book {}: {}", book.title, e);
                ctx.summary.books.not_created.push(book.title.clone());
                ctx.summary
                    .pages
                    .not_created
                    .extend(plan.pages.iter().map(|p| p.title.clone()));
                return None;
            }
        };
        ctx.ids.books.insert(&book.id, book_id);
        ctx.summary.books.created += 1;
        Self::pace(ctx.pacing.book_delay_ms).await;

        let general = NewPage::in_book(book_id, GENERAL_PAGE, self.html(book));
        match self.api.create_page(&general).await {
            Ok(created) => {
                ctx.ids.pages.insert(&book.id, created.id);
                ctx.summary.general_pages.created += 1;
            }
            Err(e) => {
                log::warn!("Could not create {} page for {}: {}", GENERAL_PAGE, book.title, e);
                ctx.summary
                    .general_pages
                    .not_created
                    .push(format!("{} ({GENERAL_PAGE})", book.title));
            }
        }

        for (i, page) in plan.pages.iter().enumerate() {
            if ctx.is_cancelled() {
                ctx.summary.tally_mut(EntityKind::Page).skipped += plan.pages.len() - i;
                ctx.summary.cancelled = true;
                break;
            }
            let new_page = NewPage::in_book(book_id, page.title.clone(), self.html(page));
            match self.api.create_page(&new_page).await {
                Ok(created) => {
                    ctx.ids.pages.insert(&page.id, created.id);
                    ctx.summary.pages.created += 1;
                    log::debug!("Created page {} ({})", page.title, created.id);
                }
                Err(e) => {
                    log::warn!("Could not create page {}: {}", page.title, e);
                    ctx.summary.pages.not_created.push(page.title.clone());
                }
            }
            Self::pace(ctx.pacing.page_delay_ms).await;
        }
        Some(book_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryCms;
    use crate::models::PacingConfig;
    use crate::services::xml::PatternExtractor;
    use crate::services::xml::tests::sample_dump;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_entities_file_is_setup_error() {
        let tmp = TempDir::new().unwrap();
        let cms = InMemoryCms::new();
        let store = LocalStorage::new(tmp.path().join("attachments.json"));
        let mut ctx = RunContext::new("HR", tmp.path()).with_pacing(PacingConfig::none());

        let err = run_xml_import(&cms, &store, &PatternExtractor::new().unwrap(), None, &mut ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Setup(_)));
        assert!(cms.books().is_empty());
    }

    #[tokio::test]
    async fn test_creates_shelf_books_and_flattened_pages() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(ENTITIES_FILE), sample_dump()).unwrap();
        let cms = InMemoryCms::new();
        let store = LocalStorage::new(tmp.path().join("attachments.json"));
        let mut ctx = RunContext::new("HR", tmp.path()).with_pacing(PacingConfig::none());

        run_xml_import(
            &cms,
            &store,
            &PatternExtractor::new().unwrap(),
            Some("human resources"),
            &mut ctx,
        )
        .await
        .unwrap();

        let shelves = cms.shelves();
        let shelf = shelves.values().next().unwrap();
        assert_eq!(shelf.name, "Human Resources");
        assert_eq!(shelf.books.len(), 2);

        assert_eq!(ctx.summary.books.created, 2);
        // Leave and Sick Leave both land in the Policies book.
        assert_eq!(ctx.summary.pages.created, 2);
        assert_eq!(ctx.summary.general_pages.created, 2);
        let pages = cms.pages();
        let policies = ctx.ids.books.get("3").unwrap();
        let sick = &pages[&ctx.ids.pages.get("5").unwrap()];
        assert_eq!(sick.book_id, policies);
        assert!(pages.values().all(|p| p.name != "Draft"));
    }
}
