// src/pipeline/orchestrator.rs

//! Remote creation in dependency order.
//!
//! shelves → books → shelf/book association → chapters → standalone pages
//! → chapter pages. Items are created one at a time with a pacing delay.
//! A failed item is recorded and the run moves on; cancellation is checked
//! before each item and everything not yet started is counted as skipped.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::api::{CmsApi, NewBook, NewChapter, NewPage, NewShelf};
use crate::error::{AppError, Result};
use crate::models::{EntityKind, Level, Phase, RemoteId};
use crate::pipeline::context::RunContext;

/// Name of the page holding a container's own body.
pub const GENERAL_PAGE: &str = "_General";

/// A rewritten document ready to be sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedDocument {
    pub filename: String,
    pub title: String,
    pub html: String,
}

/// Prepared documents by filename.
pub type DocumentSet = BTreeMap<String, PreparedDocument>;

/// Creates the classified export remotely.
pub struct Orchestrator<'a, A: CmsApi + ?Sized> {
    api: &'a A,
    docs: &'a DocumentSet,
    /// Books created under each shelf, by shelf previous id
    shelf_books: BTreeMap<String, Vec<RemoteId>>,
}

impl<'a, A: CmsApi + ?Sized> Orchestrator<'a, A> {
    pub fn new(api: &'a A, docs: &'a DocumentSet) -> Self {
        Self {
            api,
            docs,
            shelf_books: BTreeMap::new(),
        }
    }

    /// Run every creation level in order.
    pub async fn run(mut self, ctx: &mut RunContext) {
        self.create_shelves(ctx).await;
        self.create_books(ctx).await;
        self.associate_books(ctx).await;
        self.create_chapters(ctx).await;
        self.create_pages_in_books(ctx).await;
        self.create_pages_in_chapters(ctx).await;

        if ctx.is_cancelled() {
            ctx.summary.cancelled = true;
        }
        log::info!(
            "Created {} shelves, {} books, {} chapters, {} pages ({} failures)",
            ctx.summary.shelves.created,
            ctx.summary.books.created,
            ctx.summary.chapters.created,
            ctx.summary.pages.created,
            ctx.summary.failure_count()
        );
    }

    fn body(&self, filename: &str) -> String {
        self.docs
            .get(filename)
            .map(|d| d.html.clone())
            .unwrap_or_default()
    }

    /// True (and the rest of the level is marked skipped) once cancelled.
    fn stop_if_cancelled(ctx: &mut RunContext, kind: EntityKind, remaining: usize) -> bool {
        if !ctx.is_cancelled() {
            return false;
        }
        ctx.summary.tally_mut(kind).skipped += remaining;
        ctx.summary.cancelled = true;
        true
    }

    async fn pace(ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn record_failure(ctx: &mut RunContext, kind: EntityKind, phase: Phase, name: &str, err: &AppError) {
        log::warn!("Could not create {} {}: {}", kind, name, err);
        ctx.summary.tally_mut(kind).not_created.push(name.to_string());
        ctx.warn(phase, format!("Failed to create {kind} {name}: {err}"));
    }

    /// Create the `_General` page of a container and register it under the
    /// container's previous id.
    async fn create_general_page(
        &self,
        ctx: &mut RunContext,
        page: NewPage,
        previous_id: &str,
        filename: &str,
    ) {
        match self.api.create_page(&page).await {
            Ok(created) => {
                ctx.ids.pages.insert(previous_id, created.id);
                ctx.summary.general_pages.created += 1;
            }
            Err(e) => {
                log::warn!("Could not create {} page for {}: {}", GENERAL_PAGE, filename, e);
                ctx.summary
                    .general_pages
                    .not_created
                    .push(format!("{filename} ({GENERAL_PAGE})"));
            }
        }
    }

    async fn create_shelves(&mut self, ctx: &mut RunContext) {
        let files = ctx.topology.shelves.clone();
        ctx.report(Phase::Shelves, format!("Creating {} shelves", files.len()));

        for (i, file) in files.iter().enumerate() {
            if Self::stop_if_cancelled(ctx, EntityKind::Shelf, files.len() - i) {
                break;
            }
            let Some(node) = ctx.topology.node(file).cloned() else {
                continue;
            };

            match self.create_shelf(ctx, file, &node.title, &node.previous_id).await {
                Ok(()) => {
                    ctx.summary.shelves.created += 1;
                    ctx.report_at(
                        Phase::Shelves,
                        format!("Created shelf {}", node.title),
                        i + 1,
                        files.len(),
                        Level::Success,
                    );
                }
                Err(e) => {
                    Self::record_failure(ctx, EntityKind::Shelf, Phase::Shelves, file, &e)
                }
            }
            Self::pace(ctx.pacing.shelf_delay_ms).await;
        }
    }

    /// Home book, then the shelf holding it, then the `_General` page with
    /// the shelf body. The home book is removed again if the shelf fails.
    async fn create_shelf(
        &mut self,
        ctx: &mut RunContext,
        file: &str,
        title: &str,
        previous_id: &str,
    ) -> Result<()> {
        let home = self
            .api
            .create_book(&NewBook {
                name: format!("{title}: Home"),
            })
            .await?;

        let created = self
            .api
            .create_shelf(&NewShelf {
                name: title.to_string(),
                books: vec![home.id],
            })
            .await;
        let shelf = match created {
            Ok(shelf) => shelf,
            Err(e) => {
                if let Err(cleanup) = self.api.delete_book(home.id).await {
                    log::warn!(
                        "Could not remove home book {} of failed shelf {}: {}",
                        home.id,
                        file,
                        cleanup
                    );
                }
                return Err(e);
            }
        };
        ctx.ids.shelves.insert(previous_id, shelf.id);
        ctx.ids.books.insert(previous_id, home.id);
        self.shelf_books
            .entry(previous_id.to_string())
            .or_default()
            .push(home.id);

        let page = NewPage::in_book(home.id, GENERAL_PAGE, self.body(file));
        self.create_general_page(ctx, page, previous_id, file).await;
        Ok(())
    }

    async fn create_books(&mut self, ctx: &mut RunContext) {
        let files = ctx.topology.books.clone();
        ctx.report(Phase::Books, format!("Creating {} books", files.len()));

        for (i, file) in files.iter().enumerate() {
            if Self::stop_if_cancelled(ctx, EntityKind::Book, files.len() - i) {
                break;
            }
            let Some(node) = ctx.topology.node(file).cloned() else {
                continue;
            };

            let created = self
                .api
                .create_book(&NewBook {
                    name: node.title.clone(),
                })
                .await;
            match created {
                Ok(book) => {
                    ctx.ids.books.insert(&node.previous_id, book.id);
                    ctx.summary.books.created += 1;

                    let page = NewPage::in_book(book.id, GENERAL_PAGE, self.body(file));
                    self.create_general_page(ctx, page, &node.previous_id, file)
                        .await;

                    match node.parents.shelf {
                        Some(shelf) => self.shelf_books.entry(shelf).or_default().push(book.id),
                        None => log::warn!("Book {} has no shelf; left unshelved", file),
                    }
                    ctx.report_at(
                        Phase::Books,
                        format!("Created book {}", node.title),
                        i + 1,
                        files.len(),
                        Level::Success,
                    );
                }
                Err(e) => Self::record_failure(ctx, EntityKind::Book, Phase::Books, file, &e),
            }
            Self::pace(ctx.pacing.book_delay_ms).await;
        }
    }

    /// One update per shelf listing every book created under it.
    async fn associate_books(&mut self, ctx: &mut RunContext) {
        let shelves: Vec<_> = self.shelf_books.iter().collect();
        for (i, (shelf, books)) in shelves.iter().enumerate() {
            if ctx.is_cancelled() {
                let remaining: usize = shelves[i..].iter().map(|(_, b)| b.len()).sum();
                log::warn!("Cancelled; {} books stay unshelved", remaining);
                ctx.summary.unshelved_books += remaining;
                ctx.summary.cancelled = true;
                break;
            }
            let Some(shelf_id) = ctx.ids.shelves.get(shelf.as_str()) else {
                log::warn!(
                    "Shelf {} was not created; {} books stay unshelved",
                    shelf,
                    books.len()
                );
                ctx.summary.unshelved_books += books.len();
                continue;
            };
            match self.api.update_shelf_books(shelf_id, books).await {
                Ok(()) => log::info!("Assigned {} books to shelf {}", books.len(), shelf_id),
                Err(e) => {
                    ctx.summary.unshelved_books += books.len();
                    ctx.warn(
                        Phase::Shelves,
                        format!("Could not assign books to shelf {shelf_id}: {e}"),
                    )
                }
            }
            Self::pace(ctx.pacing.shelf_delay_ms).await;
        }
    }

    async fn create_chapters(&mut self, ctx: &mut RunContext) {
        let chapters: Vec<_> = ctx
            .topology
            .chapters
            .iter()
            .map(|(file, entry)| (file.clone(), entry.clone()))
            .collect();
        ctx.report(Phase::Chapters, format!("Creating {} chapters", chapters.len()));

        for (i, (file, entry)) in chapters.iter().enumerate() {
            if Self::stop_if_cancelled(ctx, EntityKind::Chapter, chapters.len() - i) {
                break;
            }

            let result = match (
                self.docs.get(file),
                ctx.ids.books.get(&entry.book_previous_id),
            ) {
                (None, _) => Err(AppError::lookup("document", file)),
                (_, None) => Err(AppError::lookup("book", file)),
                (Some(doc), Some(book_id)) => self
                    .api
                    .create_chapter(&NewChapter {
                        name: doc.title.clone(),
                        book_id,
                    })
                    .await
                    .map(|created| (created.id, doc.title.clone())),
            };

            match result {
                Ok((chapter_id, title)) => {
                    ctx.ids.chapters.insert(&entry.chapter_previous_id, chapter_id);
                    ctx.summary.chapters.created += 1;

                    let page = NewPage::in_chapter(chapter_id, GENERAL_PAGE, self.body(file));
                    self.create_general_page(ctx, page, &entry.chapter_previous_id, file)
                        .await;
                    ctx.report_at(
                        Phase::Chapters,
                        format!("Created chapter {title}"),
                        i + 1,
                        chapters.len(),
                        Level::Success,
                    );
                }
                Err(e) => {
                    Self::record_failure(ctx, EntityKind::Chapter, Phase::Chapters, file, &e)
                }
            }
            Self::pace(ctx.pacing.chapter_delay_ms).await;
        }
    }

    async fn create_pages_in_books(&mut self, ctx: &mut RunContext) {
        let files = ctx.topology.pages_in_books.clone();
        ctx.report(
            Phase::Pages,
            format!("Creating {} pages under books", files.len()),
        );
        let total = ctx.topology.pages_in_books.len() + ctx.topology.pages_in_chapters.len();

        for (i, file) in files.iter().enumerate() {
            if Self::stop_if_cancelled(ctx, EntityKind::Page, files.len() - i) {
                break;
            }
            let book_id = ctx
                .topology
                .node(file)
                .and_then(|n| n.parents.book.as_deref())
                .and_then(|book| ctx.ids.books.get(book));
            let page = book_id.map(|id| NewPage::in_book(id, self.title(ctx, file), self.body(file)));

            self.create_page(ctx, file, page, "book", i + 1, total).await;
            Self::pace(ctx.pacing.page_delay_ms).await;
        }
    }

    async fn create_pages_in_chapters(&mut self, ctx: &mut RunContext) {
        let files = ctx.topology.pages_in_chapters.clone();
        ctx.report(
            Phase::Pages,
            format!("Creating {} pages under chapters", files.len()),
        );
        let offset = ctx.topology.pages_in_books.len();
        let total = offset + files.len();

        for (i, file) in files.iter().enumerate() {
            if Self::stop_if_cancelled(ctx, EntityKind::Page, files.len() - i) {
                break;
            }
            let chapter_id = ctx
                .topology
                .node(file)
                .and_then(|n| n.parents.chapter.as_deref())
                .and_then(|chapter| ctx.topology.chapters.get(chapter))
                .and_then(|entry| ctx.ids.chapters.get(&entry.chapter_previous_id));
            let page =
                chapter_id.map(|id| NewPage::in_chapter(id, self.title(ctx, file), self.body(file)));

            self.create_page(ctx, file, page, "chapter", offset + i + 1, total)
                .await;
            Self::pace(ctx.pacing.page_delay_ms).await;
        }
    }

    fn title(&self, ctx: &RunContext, file: &str) -> String {
        ctx.topology
            .node(file)
            .map(|n| n.title.clone())
            .or_else(|| self.docs.get(file).map(|d| d.title.clone()))
            .unwrap_or_else(|| file.to_string())
    }

    /// Create one page; `page` is `None` when its parent is missing.
    async fn create_page(
        &self,
        ctx: &mut RunContext,
        file: &str,
        page: Option<NewPage>,
        parent: &str,
        current: usize,
        total: usize,
    ) {
        let result = match page {
            Some(page) => self.api.create_page(&page).await.map(|c| (c.id, page.name)),
            None => Err(AppError::lookup(parent, file)),
        };

        match result {
            Ok((id, name)) => {
                let previous_id = crate::utils::previous_id(file);
                ctx.ids.pages.insert(&previous_id, id);
                ctx.summary.pages.created += 1;
                ctx.report_at(
                    Phase::Pages,
                    format!("Created page {name}"),
                    current,
                    total,
                    Level::Success,
                );
            }
            Err(e) => Self::record_failure(ctx, EntityKind::Page, Phase::Pages, file, &e),
        }
    }
}
