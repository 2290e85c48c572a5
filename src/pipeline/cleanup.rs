// src/pipeline/cleanup.rs

//! Undo a migration by deleting a shelf and its books.

use futures::stream::{self, StreamExt};

use crate::api::{CmsApi, Shelf, collect_all};
use crate::error::Result;
use crate::models::RemoteId;

/// Books deleted concurrently.
const DELETE_CONCURRENCY: usize = 4;

/// Outcome of [`remove_shelf`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub shelf: String,
    pub books_deleted: usize,
    /// Books whose deletion failed
    pub books_failed: Vec<RemoteId>,
}

/// Delete every book on a shelf, then the shelf.
///
/// Book failures are logged and reported; the shelf is deleted regardless.
pub async fn remove_shelf<A: CmsApi + ?Sized>(api: &A, shelf_id: RemoteId) -> Result<RemovalReport> {
    let shelf: Shelf = api.get_shelf(shelf_id).await?;
    log::info!(
        "Removing shelf {} ({}) with {} books",
        shelf.name,
        shelf.id,
        shelf.books.len()
    );

    let results: Vec<(RemoteId, Result<()>)> = stream::iter(shelf.books.iter().map(|b| b.id))
        .map(|book_id| async move { (book_id, api.delete_book(book_id).await) })
        .buffer_unordered(DELETE_CONCURRENCY)
        .collect()
        .await;

    let mut report = RemovalReport {
        shelf: shelf.name.clone(),
        ..Default::default()
    };
    for (book_id, result) in results {
        match result {
            Ok(()) => report.books_deleted += 1,
            Err(e) => {
                log::warn!("Error deleting book {}: {}", book_id, e);
                report.books_failed.push(book_id);
            }
        }
    }
    report.books_failed.sort_unstable();

    api.delete_shelf(shelf.id).await?;
    log::info!("Deleted shelf {}", shelf.name);
    Ok(report)
}

/// `(id, name)` of every remote shelf, for picking one to remove.
pub async fn list_shelves<A: CmsApi + ?Sized>(api: &A) -> Result<Vec<(RemoteId, String)>> {
    let shelves = collect_all(|offset, count| api.list_shelves(offset, count)).await?;
    Ok(shelves.into_iter().map(|s| (s.id, s.name)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{InMemoryCms, NewBook, NewPage, NewShelf};

    #[tokio::test]
    async fn test_removes_books_then_shelf() {
        let cms = InMemoryCms::new();
        let a = cms.create_book(&NewBook { name: "A".into() }).await.unwrap();
        let b = cms.create_book(&NewBook { name: "B".into() }).await.unwrap();
        let other = cms.create_book(&NewBook { name: "Other".into() }).await.unwrap();
        cms.create_page(&NewPage::in_book(a.id, "P", "<p>x</p>"))
            .await
            .unwrap();
        let shelf = cms
            .create_shelf(&NewShelf {
                name: "IT".into(),
                books: vec![a.id, b.id],
            })
            .await
            .unwrap();

        assert_eq!(list_shelves(&cms).await.unwrap(), vec![(shelf.id, "IT".to_string())]);

        let report = remove_shelf(&cms, shelf.id).await.unwrap();

        assert_eq!(report.shelf, "IT");
        assert_eq!(report.books_deleted, 2);
        assert!(report.books_failed.is_empty());
        assert!(cms.shelves().is_empty());
        assert_eq!(cms.books().keys().copied().collect::<Vec<_>>(), vec![other.id]);
        assert!(cms.pages().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_shelf_is_error() {
        let cms = InMemoryCms::new();
        let err = remove_shelf(&cms, 42).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
