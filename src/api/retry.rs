// src/api/retry.rs

//! Shared retry policy for remote calls.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{
    Attachment, CmsApi, Created, Listing, NewAttachment, NewBook, NewChapter, NewPage, NewShelf,
    Page, PageSummary, PageUpdate, Shelf, ShelfSummary,
};
use crate::error::{AppError, Result};
use crate::models::{RemoteId, RetryConfig};

/// Exponential back-off for retryable errors.
///
/// Attempt `n` (1-based) that fails with a retryable error is followed by
/// a sleep of `base_delay * multiplier^n`. After `max_attempts` calls the
/// last error is returned without a further sleep. Non-retryable errors
/// are returned immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub retryable: fn(&AppError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            multiplier: config.multiplier,
            retryable: AppError::is_rate_limited,
        }
    }

    /// Single attempt, no back-off.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        self.base_delay.mul_f64(self.multiplier.powi(exp))
    }

    /// Run `op` under the policy. `context` names the call in logs.
    pub async fn run<T, F, Fut>(&self, context: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if (self.retryable)(&e) && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "Rate limited ({}), waiting {}ms (attempt {}/{})",
                        context,
                        delay.as_millis(),
                        attempt,
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// [`CmsApi`] decorator routing every call through a [`RetryPolicy`].
pub struct RetryingCms<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: CmsApi> RetryingCms<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<A: CmsApi> CmsApi for RetryingCms<A> {
    async fn create_shelf(&self, shelf: &NewShelf) -> Result<Created> {
        self.policy
            .run("create shelf", || self.inner.create_shelf(shelf))
            .await
    }

    async fn update_shelf_books(&self, shelf_id: RemoteId, books: &[RemoteId]) -> Result<()> {
        self.policy
            .run("update shelf", || self.inner.update_shelf_books(shelf_id, books))
            .await
    }

    async fn get_shelf(&self, shelf_id: RemoteId) -> Result<Shelf> {
        self.policy
            .run("get shelf", || self.inner.get_shelf(shelf_id))
            .await
    }

    async fn list_shelves(&self, offset: usize, count: usize) -> Result<Listing<ShelfSummary>> {
        self.policy
            .run("list shelves", || self.inner.list_shelves(offset, count))
            .await
    }

    async fn delete_shelf(&self, shelf_id: RemoteId) -> Result<()> {
        self.policy
            .run("delete shelf", || self.inner.delete_shelf(shelf_id))
            .await
    }

    async fn create_book(&self, book: &NewBook) -> Result<Created> {
        self.policy
            .run("create book", || self.inner.create_book(book))
            .await
    }

    async fn delete_book(&self, book_id: RemoteId) -> Result<()> {
        self.policy
            .run("delete book", || self.inner.delete_book(book_id))
            .await
    }

    async fn create_chapter(&self, chapter: &NewChapter) -> Result<Created> {
        self.policy
            .run("create chapter", || self.inner.create_chapter(chapter))
            .await
    }

    async fn create_page(&self, page: &NewPage) -> Result<Created> {
        self.policy
            .run("create page", || self.inner.create_page(page))
            .await
    }

    async fn list_pages(&self, offset: usize, count: usize) -> Result<Listing<PageSummary>> {
        self.policy
            .run("list pages", || self.inner.list_pages(offset, count))
            .await
    }

    async fn get_page(&self, page_id: RemoteId) -> Result<Page> {
        self.policy
            .run("get page", || self.inner.get_page(page_id))
            .await
    }

    async fn update_page(&self, page_id: RemoteId, update: &PageUpdate) -> Result<()> {
        self.policy
            .run("update page", || self.inner.update_page(page_id, update))
            .await
    }

    async fn list_attachments(&self, offset: usize, count: usize) -> Result<Listing<Attachment>> {
        self.policy
            .run("list attachments", || self.inner.list_attachments(offset, count))
            .await
    }

    async fn upload_attachment(&self, attachment: &NewAttachment) -> Result<Created> {
        self.policy
            .run("upload attachment", || self.inner.upload_attachment(attachment))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryCms;
    use crate::api::memory::Op;
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(300),
            multiplier: 2.0,
            retryable: AppError::is_rate_limited,
        }
    }

    fn book() -> NewBook {
        NewBook {
            name: "Book".to_string(),
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = policy();
        assert_eq!(policy.delay_for(1), Duration::from_millis(600));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(4800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_k_rate_limits() {
        let cms = RetryingCms::new(InMemoryCms::new(), policy());
        cms.inner().rate_limit(Op::CreateBook, 3);

        let start = Instant::now();
        let created = cms.create_book(&book()).await;
        let waited = start.elapsed();

        assert!(created.is_ok());
        assert_eq!(cms.inner().calls(Op::CreateBook), 4);
        // 600 + 1200 + 2400
        assert!(waited >= Duration::from_millis(4200));
        assert!(waited < Duration::from_millis(4300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let cms = RetryingCms::new(InMemoryCms::new(), policy());
        cms.inner().rate_limit(Op::CreateBook, 100);

        let start = Instant::now();
        let err = cms.create_book(&book()).await.unwrap_err();

        assert!(err.is_rate_limited());
        assert_eq!(cms.inner().calls(Op::CreateBook), 5);
        // No sleep after the final attempt: 600 + 1200 + 2400 + 4800
        assert!(start.elapsed() < Duration::from_millis(9100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let cms = RetryingCms::new(InMemoryCms::new(), policy());
        cms.inner().fail_named("Book");

        let start = Instant::now();
        let err = cms.create_book(&book()).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(cms.inner().calls(Op::CreateBook), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
