// src/api/client.rs

//! HTTP client for a BookStack-style REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::api::{
    Attachment, CmsApi, Created, Listing, NewAttachment, NewBook, NewChapter, NewPage, NewShelf,
    Page, PageSummary, PageUpdate, Shelf, ShelfSummary,
};
use crate::error::{AppError, Result};
use crate::models::{ApiConfig, RemoteId};

/// Client for the destination API. `base` includes the `/api` prefix.
pub struct BookStackClient {
    client: Client,
    base: Url,
}

impl BookStackClient {
    /// Build a client from the API configuration.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut base = Url::parse(&config.url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let token = format!("Token {}:{}", config.token_id, config.token_secret);
        let mut auth = HeaderValue::from_str(&token)
            .map_err(|e| AppError::config(format!("Invalid API token: {e}")))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.base.join(path.trim_start_matches('/'))?;
        Ok(self.client.request(method, url))
    }

    /// Map non-success statuses into [`AppError::Api`].
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::api(status.as_u16(), error_message(&body)))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = Self::check(builder.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        Self::check(builder.send().await?).await?;
        Ok(())
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Created> {
        self.send_json(self.request(Method::POST, path)?.json(body))
            .await
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        offset: usize,
        count: usize,
    ) -> Result<Listing<T>> {
        let builder = self
            .request(Method::GET, path)?
            .query(&[("offset", offset), ("count", count)]);
        self.send_json(builder).await
    }
}

/// Pull `error.message` out of an API error body, else return it raw.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[async_trait]
impl CmsApi for BookStackClient {
    async fn create_shelf(&self, shelf: &NewShelf) -> Result<Created> {
        self.post("shelves", shelf).await
    }

    async fn update_shelf_books(&self, shelf_id: RemoteId, books: &[RemoteId]) -> Result<()> {
        let builder = self
            .request(Method::PUT, &format!("shelves/{shelf_id}"))?
            .json(&json!({ "books": books }));
        self.send_empty(builder).await
    }

    async fn get_shelf(&self, shelf_id: RemoteId) -> Result<Shelf> {
        self.send_json(self.request(Method::GET, &format!("shelves/{shelf_id}"))?)
            .await
    }

    async fn list_shelves(&self, offset: usize, count: usize) -> Result<Listing<ShelfSummary>> {
        self.list("shelves", offset, count).await
    }

    async fn delete_shelf(&self, shelf_id: RemoteId) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("shelves/{shelf_id}"))?)
            .await
    }

    async fn create_book(&self, book: &NewBook) -> Result<Created> {
        self.post("books", book).await
    }

    async fn delete_book(&self, book_id: RemoteId) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("books/{book_id}"))?)
            .await
    }

    async fn create_chapter(&self, chapter: &NewChapter) -> Result<Created> {
        self.post("chapters", chapter).await
    }

    async fn create_page(&self, page: &NewPage) -> Result<Created> {
        self.post("pages", page).await
    }

    async fn list_pages(&self, offset: usize, count: usize) -> Result<Listing<PageSummary>> {
        self.list("pages", offset, count).await
    }

    async fn get_page(&self, page_id: RemoteId) -> Result<Page> {
        self.send_json(self.request(Method::GET, &format!("pages/{page_id}"))?)
            .await
    }

    async fn update_page(&self, page_id: RemoteId, update: &PageUpdate) -> Result<()> {
        let builder = self
            .request(Method::PUT, &format!("pages/{page_id}"))?
            .json(update);
        self.send_empty(builder).await
    }

    async fn list_attachments(&self, offset: usize, count: usize) -> Result<Listing<Attachment>> {
        self.list("attachments", offset, count).await
    }

    async fn upload_attachment(&self, attachment: &NewAttachment) -> Result<Created> {
        let bytes = tokio::fs::read(&attachment.path).await?;
        let file_name = attachment
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&attachment.name)
            .to_string();

        let form = Form::new()
            .text("uploaded_to", attachment.uploaded_to.to_string())
            .text("name", attachment.name.clone())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let builder = self.request(Method::POST, "attachments")?.multipart(form);
        self.send_json(builder).await
    }
}
