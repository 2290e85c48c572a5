// src/api/memory.rs

//! In-process CMS used for dry runs and tests.
//!
//! Every entity lives in a mutex-guarded map. Failures can be scripted per
//! operation (`rate_limit`) or per entity name (`fail_named`), and a hook
//! can observe page creations.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::{
    Attachment, BookRef, CmsApi, Created, Listing, NewAttachment, NewBook, NewChapter, NewPage,
    NewShelf, Page, PageSummary, PageUpdate, Shelf, ShelfSummary,
};
use crate::error::{AppError, Result};
use crate::models::RemoteId;

/// Remote operations, for scripting and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateShelf,
    UpdateShelf,
    GetShelf,
    ListShelves,
    DeleteShelf,
    CreateBook,
    DeleteBook,
    CreateChapter,
    CreatePage,
    ListPages,
    GetPage,
    UpdatePage,
    ListAttachments,
    UploadAttachment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredShelf {
    pub name: String,
    pub books: Vec<RemoteId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChapter {
    pub name: String,
    pub book_id: RemoteId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPage {
    pub name: String,
    pub html: String,
    pub book_id: RemoteId,
    pub chapter_id: Option<RemoteId>,
}

type PageHook = Box<dyn Fn(&str, usize) + Send + Sync>;

#[derive(Default)]
struct State {
    next_id: RemoteId,
    shelves: BTreeMap<RemoteId, StoredShelf>,
    books: BTreeMap<RemoteId, String>,
    chapters: BTreeMap<RemoteId, StoredChapter>,
    pages: BTreeMap<RemoteId, StoredPage>,
    attachments: BTreeMap<RemoteId, Attachment>,
    calls: HashMap<Op, usize>,
    rate_limits: HashMap<Op, usize>,
    failing_names: HashSet<String>,
}

impl State {
    fn next_id(&mut self) -> RemoteId {
        self.next_id += 1;
        self.next_id
    }

    /// Count the call and apply scripted failures.
    fn enter(&mut self, op: Op, name: Option<&str>) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        if let Some(left) = self.rate_limits.get_mut(&op).filter(|left| **left > 0) {
            *left -= 1;
            return Err(AppError::api(429, "Too Many Requests"));
        }
        if let Some(name) = name.filter(|n| self.failing_names.contains(*n)) {
            return Err(AppError::api(500, format!("scripted failure for {name}")));
        }
        Ok(())
    }
}

fn not_found(kind: &str, id: RemoteId) -> AppError {
    AppError::api(404, format!("{kind} {id} not found"))
}

fn window<T: Clone>(items: impl Iterator<Item = T>, offset: usize, count: usize) -> Listing<T> {
    let all: Vec<T> = items.collect();
    let total = all.len();
    Listing {
        data: all.into_iter().skip(offset).take(count).collect(),
        total,
    }
}

/// In-memory [`CmsApi`] implementation.
#[derive(Default)]
pub struct InMemoryCms {
    state: Mutex<State>,
    page_hook: Option<PageHook>,
}

impl InMemoryCms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `hook` with the page name and the running page count after each
    /// page creation.
    pub fn with_page_hook(mut self, hook: impl Fn(&str, usize) + Send + Sync + 'static) -> Self {
        self.page_hook = Some(Box::new(hook));
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer the next `times` calls of `op` with HTTP 429.
    pub fn rate_limit(&self, op: Op, times: usize) {
        self.state().rate_limits.insert(op, times);
    }

    /// Fail every create of an entity with this name with HTTP 500.
    pub fn fail_named(&self, name: impl Into<String>) {
        self.state().failing_names.insert(name.into());
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn shelves(&self) -> BTreeMap<RemoteId, StoredShelf> {
        self.state().shelves.clone()
    }

    pub fn books(&self) -> BTreeMap<RemoteId, String> {
        self.state().books.clone()
    }

    pub fn chapters(&self) -> BTreeMap<RemoteId, StoredChapter> {
        self.state().chapters.clone()
    }

    pub fn pages(&self) -> BTreeMap<RemoteId, StoredPage> {
        self.state().pages.clone()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.state().attachments.values().cloned().collect()
    }

    /// Seed an existing attachment, as if uploaded earlier.
    pub fn insert_attachment(&self, uploaded_to: RemoteId, name: &str) -> RemoteId {
        let mut state = self.state();
        let id = state.next_id();
        state.attachments.insert(
            id,
            Attachment {
                id,
                name: name.to_string(),
                uploaded_to,
            },
        );
        id
    }
}

#[async_trait]
impl CmsApi for InMemoryCms {
    async fn create_shelf(&self, shelf: &NewShelf) -> Result<Created> {
        let mut state = self.state();
        state.enter(Op::CreateShelf, Some(shelf.name.as_str()))?;
        let id = state.next_id();
        state.shelves.insert(
            id,
            StoredShelf {
                name: shelf.name.clone(),
                books: shelf.books.clone(),
            },
        );
        Ok(Created { id })
    }

    async fn update_shelf_books(&self, shelf_id: RemoteId, books: &[RemoteId]) -> Result<()> {
        let mut state = self.state();
        state.enter(Op::UpdateShelf, None)?;
        let shelf = state
            .shelves
            .get_mut(&shelf_id)
            .ok_or_else(|| not_found("shelf", shelf_id))?;
        shelf.books = books.to_vec();
        Ok(())
    }

    async fn get_shelf(&self, shelf_id: RemoteId) -> Result<Shelf> {
        let mut state = self.state();
        state.enter(Op::GetShelf, None)?;
        let shelf = state
            .shelves
            .get(&shelf_id)
            .ok_or_else(|| not_found("shelf", shelf_id))?;
        let books = shelf
            .books
            .iter()
            .filter_map(|id| {
                state.books.get(id).map(|name| BookRef {
                    id: *id,
                    name: name.clone(),
                })
            })
            .collect();
        Ok(Shelf {
            id: shelf_id,
            name: shelf.name.clone(),
            books,
        })
    }

    async fn list_shelves(&self, offset: usize, count: usize) -> Result<Listing<ShelfSummary>> {
        let mut state = self.state();
        state.enter(Op::ListShelves, None)?;
        let items = state.shelves.iter().map(|(id, s)| ShelfSummary {
            id: *id,
            name: s.name.clone(),
        });
        Ok(window(items, offset, count))
    }

    async fn delete_shelf(&self, shelf_id: RemoteId) -> Result<()> {
        let mut state = self.state();
        state.enter(Op::DeleteShelf, None)?;
        state
            .shelves
            .remove(&shelf_id)
            .map(|_| ())
            .ok_or_else(|| not_found("shelf", shelf_id))
    }

    async fn create_book(&self, book: &NewBook) -> Result<Created> {
        let mut state = self.state();
        state.enter(Op::CreateBook, Some(book.name.as_str()))?;
        let id = state.next_id();
        state.books.insert(id, book.name.clone());
        Ok(Created { id })
    }

    async fn delete_book(&self, book_id: RemoteId) -> Result<()> {
        let mut state = self.state();
        state.enter(Op::DeleteBook, None)?;
        state
            .books
            .remove(&book_id)
            .ok_or_else(|| not_found("book", book_id))?;
        state.chapters.retain(|_, c| c.book_id != book_id);
        state.pages.retain(|_, p| p.book_id != book_id);
        Ok(())
    }

    async fn create_chapter(&self, chapter: &NewChapter) -> Result<Created> {
        let mut state = self.state();
        state.enter(Op::CreateChapter, Some(chapter.name.as_str()))?;
        if !state.books.contains_key(&chapter.book_id) {
            return Err(not_found("book", chapter.book_id));
        }
        let id = state.next_id();
        state.chapters.insert(
            id,
            StoredChapter {
                name: chapter.name.clone(),
                book_id: chapter.book_id,
            },
        );
        Ok(Created { id })
    }

    async fn create_page(&self, page: &NewPage) -> Result<Created> {
        let (id, count) = {
            let mut state = self.state();
            state.enter(Op::CreatePage, Some(page.name.as_str()))?;
            let book_id = match (page.chapter_id, page.book_id) {
                (Some(chapter_id), _) => {
                    state
                        .chapters
                        .get(&chapter_id)
                        .ok_or_else(|| not_found("chapter", chapter_id))?
                        .book_id
                }
                (None, Some(book_id)) if state.books.contains_key(&book_id) => book_id,
                (None, Some(book_id)) => return Err(not_found("book", book_id)),
                (None, None) => {
                    return Err(AppError::api(422, "book_id or chapter_id is required"));
                }
            };
            let id = state.next_id();
            state.pages.insert(
                id,
                StoredPage {
                    name: page.name.clone(),
                    html: page.html.clone(),
                    book_id,
                    chapter_id: page.chapter_id,
                },
            );
            (id, state.pages.len())
        };
        if let Some(hook) = &self.page_hook {
            hook(&page.name, count);
        }
        Ok(Created { id })
    }

    async fn list_pages(&self, offset: usize, count: usize) -> Result<Listing<PageSummary>> {
        let mut state = self.state();
        state.enter(Op::ListPages, None)?;
        let items = state.pages.iter().map(|(id, p)| PageSummary {
            id: *id,
            name: p.name.clone(),
            book_id: p.book_id,
        });
        Ok(window(items, offset, count))
    }

    async fn get_page(&self, page_id: RemoteId) -> Result<Page> {
        let mut state = self.state();
        state.enter(Op::GetPage, None)?;
        let page = state
            .pages
            .get(&page_id)
            .ok_or_else(|| not_found("page", page_id))?;
        Ok(Page {
            id: page_id,
            name: page.name.clone(),
            book_id: page.book_id,
            html: page.html.clone(),
        })
    }

    async fn update_page(&self, page_id: RemoteId, update: &PageUpdate) -> Result<()> {
        let mut state = self.state();
        state.enter(Op::UpdatePage, None)?;
        let page = state
            .pages
            .get_mut(&page_id)
            .ok_or_else(|| not_found("page", page_id))?;
        page.name = update.name.clone();
        page.html = update.html.clone();
        Ok(())
    }

    async fn list_attachments(&self, offset: usize, count: usize) -> Result<Listing<Attachment>> {
        let mut state = self.state();
        state.enter(Op::ListAttachments, None)?;
        let items = state.attachments.values().cloned();
        Ok(window(items, offset, count))
    }

    async fn upload_attachment(&self, attachment: &NewAttachment) -> Result<Created> {
        let mut state = self.state();
        state.enter(Op::UploadAttachment, Some(attachment.name.as_str()))?;
        if !state.pages.contains_key(&attachment.uploaded_to) {
            return Err(not_found("page", attachment.uploaded_to));
        }
        let id = state.next_id();
        state.attachments.insert(
            id,
            Attachment {
                id,
                name: attachment.name.clone(),
                uploaded_to: attachment.uploaded_to,
            },
        );
        Ok(Created { id })
    }
}
