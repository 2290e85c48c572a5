// src/api/mod.rs

//! Destination CMS API.
//!
//! [`CmsApi`] is the seam every stage talks through. Implementations:
//! - [`BookStackClient`]: the real HTTP client,
//! - [`InMemoryCms`]: an in-process fake for dry runs and tests,
//! - [`RetryingCms`]: a decorator adding the shared retry policy.

pub mod client;
pub mod memory;
pub mod retry;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::RemoteId;

pub use client::BookStackClient;
pub use memory::InMemoryCms;
pub use retry::{RetryPolicy, RetryingCms};

/// Page size used by every paginated listing.
pub const PAGE_SIZE: usize = 100;

/// `{ "id": 7 }` style responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Created {
    pub id: RemoteId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShelf {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub books: Vec<RemoteId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChapter {
    pub name: String,
    pub book_id: RemoteId,
}

/// A page goes either into a book or into a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPage {
    pub name: String,
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_id: Option<RemoteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<RemoteId>,
}

impl NewPage {
    pub fn in_book(book_id: RemoteId, name: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            html: non_empty(html.into()),
            book_id: Some(book_id),
            chapter_id: None,
        }
    }

    pub fn in_chapter(
        chapter_id: RemoteId,
        name: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            html: non_empty(html.into()),
            book_id: None,
            chapter_id: Some(chapter_id),
        }
    }
}

/// The API rejects empty bodies.
fn non_empty(html: String) -> String {
    if html.trim().is_empty() {
        "<p></p>".to_string()
    } else {
        html
    }
}

/// A book reference inside a shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRef {
    pub id: RemoteId,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shelf {
    pub id: RemoteId,
    pub name: String,
    #[serde(default)]
    pub books: Vec<BookRef>,
}

/// Entry of the shelf listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfSummary {
    pub id: RemoteId,
    pub name: String,
}

/// Entry of the page listing (no body).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub id: RemoteId,
    pub name: String,
    #[serde(default)]
    pub book_id: RemoteId,
}

/// A page with its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: RemoteId,
    pub name: String,
    #[serde(default)]
    pub book_id: RemoteId,
    #[serde(default)]
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageUpdate {
    pub name: String,
    pub html: String,
    pub book_id: RemoteId,
}

/// Entry of the attachment listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: RemoteId,
    pub name: String,
    pub uploaded_to: RemoteId,
}

/// A file to attach to a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub uploaded_to: RemoteId,
    pub name: String,
    pub path: PathBuf,
}

/// `{ "data": [...], "total": n }` list envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub total: usize,
}

/// Remote operations used by the migration.
#[async_trait]
pub trait CmsApi: Send + Sync {
    async fn create_shelf(&self, shelf: &NewShelf) -> Result<Created>;
    async fn update_shelf_books(&self, shelf_id: RemoteId, books: &[RemoteId]) -> Result<()>;
    async fn get_shelf(&self, shelf_id: RemoteId) -> Result<Shelf>;
    async fn list_shelves(&self, offset: usize, count: usize) -> Result<Listing<ShelfSummary>>;
    async fn delete_shelf(&self, shelf_id: RemoteId) -> Result<()>;

    async fn create_book(&self, book: &NewBook) -> Result<Created>;
    async fn delete_book(&self, book_id: RemoteId) -> Result<()>;

    async fn create_chapter(&self, chapter: &NewChapter) -> Result<Created>;

    async fn create_page(&self, page: &NewPage) -> Result<Created>;
    async fn list_pages(&self, offset: usize, count: usize) -> Result<Listing<PageSummary>>;
    async fn get_page(&self, page_id: RemoteId) -> Result<Page>;
    async fn update_page(&self, page_id: RemoteId, update: &PageUpdate) -> Result<()>;

    async fn list_attachments(&self, offset: usize, count: usize) -> Result<Listing<Attachment>>;
    async fn upload_attachment(&self, attachment: &NewAttachment) -> Result<Created>;
}

#[async_trait]
impl<T: CmsApi + ?Sized> CmsApi for std::sync::Arc<T> {
    async fn create_shelf(&self, shelf: &NewShelf) -> Result<Created> {
        (**self).create_shelf(shelf).await
    }
    async fn update_shelf_books(&self, shelf_id: RemoteId, books: &[RemoteId]) -> Result<()> {
        (**self).update_shelf_books(shelf_id, books).await
    }
    async fn get_shelf(&self, shelf_id: RemoteId) -> Result<Shelf> {
        (**self).get_shelf(shelf_id).await
    }
    async fn list_shelves(&self, offset: usize, count: usize) -> Result<Listing<ShelfSummary>> {
        (**self).list_shelves(offset, count).await
    }
    async fn delete_shelf(&self, shelf_id: RemoteId) -> Result<()> {
        (**self).delete_shelf(shelf_id).await
    }
    async fn create_book(&self, book: &NewBook) -> Result<Created> {
        (**self).create_book(book).await
    }
    async fn delete_book(&self, book_id: RemoteId) -> Result<()> {
        (**self).delete_book(book_id).await
    }
    async fn create_chapter(&self, chapter: &NewChapter) -> Result<Created> {
        (**self).create_chapter(chapter).await
    }
    async fn create_page(&self, page: &NewPage) -> Result<Created> {
        (**self).create_page(page).await
    }
    async fn list_pages(&self, offset: usize, count: usize) -> Result<Listing<PageSummary>> {
        (**self).list_pages(offset, count).await
    }
    async fn get_page(&self, page_id: RemoteId) -> Result<Page> {
        (**self).get_page(page_id).await
    }
    async fn update_page(&self, page_id: RemoteId, update: &PageUpdate) -> Result<()> {
        (**self).update_page(page_id, update).await
    }
    async fn list_attachments(&self, offset: usize, count: usize) -> Result<Listing<Attachment>> {
        (**self).list_attachments(offset, count).await
    }
    async fn upload_attachment(&self, attachment: &NewAttachment) -> Result<Created> {
        (**self).upload_attachment(attachment).await
    }
}

/// Drain an offset/count paginated listing.
///
/// Stops at the first page shorter than [`PAGE_SIZE`].
pub async fn collect_all<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: std::future::Future<Output = Result<Listing<T>>>,
{
    let mut all = Vec::new();
    let mut offset = 0;
    loop {
        let page = fetch(offset, PAGE_SIZE).await?;
        let len = page.data.len();
        all.extend(page.data);
        if len < PAGE_SIZE {
            break;
        }
        offset += PAGE_SIZE;
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_payload_shape() {
        let page = NewPage::in_chapter(5, "Intro", "  ");
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["chapter_id"], 5);
        assert_eq!(json["html"], "<p></p>");
        assert!(json.get("book_id").is_none());
    }

    #[test]
    fn test_listing_parses_envelope() {
        let listing: Listing<Attachment> = serde_json::from_str(
            r#"{"data":[{"id":1,"name":"a.pdf","uploaded_to":9,"extension":"pdf"}],"total":1}"#,
        )
        .unwrap();
        assert_eq!(listing.data[0].uploaded_to, 9);
        assert_eq!(listing.total, 1);
    }

    #[tokio::test]
    async fn test_collect_all_pages_through() {
        let items: Vec<usize> = (0..250).collect();
        let all = collect_all(|offset, count| {
            let data = items.iter().skip(offset).take(count).copied().collect();
            async move { Ok(Listing { data, total: 250 }) }
        })
        .await
        .unwrap();
        assert_eq!(all.len(), 250);
        assert_eq!(all[249], 249);
    }
}
