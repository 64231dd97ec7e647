// src/services/remote.rs

//! Remote library client.
//!
//! Four calls: the book list (status snapshot), the manifest check, the
//! batched chapter upload and the status update. All of them carry the
//! admin secret header.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, Result};
use crate::models::{BookStatus, Chapter, FetchConfig, ManifestEntry, RemoteConfig};
use crate::utils::http::create_async_client;

/// A book as the remote library lists it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBook {
    pub id: String,
    pub title: String,
    pub status: BookStatus,
}

/// Remote book statuses keyed by trimmed title, fetched once per run.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    books: HashMap<String, RemoteBook>,
}

impl StatusSnapshot {
    pub fn new(books: impl IntoIterator<Item = RemoteBook>) -> Self {
        Self {
            books: books
                .into_iter()
                .map(|b| (b.title.trim().to_string(), b))
                .collect(),
        }
    }

    pub fn get(&self, title: &str) -> Option<&RemoteBook> {
        self.books.get(title.trim())
    }

    /// Whether the remote marks this title as finished.
    pub fn is_completed(&self, title: &str) -> bool {
        self.get(title)
            .is_some_and(|b| b.status == BookStatus::Completed)
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

/// Answer to a manifest check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSyncResponse {
    pub needs_full_upload: bool,
    #[serde(default)]
    pub missing_titles: Vec<String>,
}

/// Remote library operations used by the engine.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Snapshot of every remote book and its status.
    async fn book_statuses(&self) -> Result<StatusSnapshot>;

    /// Send the manifest and learn what the remote is missing.
    async fn check_sync(&self, title: &str, manifest: &[ManifestEntry])
    -> Result<CheckSyncResponse>;

    /// Upload one batch. Returns how many chapters the remote accepted.
    async fn upload_book(&self, metadata: &Map<String, Value>, chapters: &[Chapter])
    -> Result<usize>;

    /// Change the publication status of a remote book.
    async fn set_status(&self, book: &RemoteBook, status: BookStatus) -> Result<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckSyncRequest<'a> {
    title: &'a str,
    simple_chapters: &'a [ManifestEntry],
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    #[serde(flatten)]
    metadata: &'a Map<String, Value>,
    chapters: &'a [Chapter],
}

#[derive(Deserialize)]
struct UploadResponse {
    accepted: Option<usize>,
}

#[derive(Deserialize)]
struct ListedBook {
    id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    status: String,
}

/// JSON-over-HTTP implementation of [`RemoteStore`].
pub struct HttpRemote {
    client: Client,
    config: RemoteConfig,
    secret: String,
}

impl HttpRemote {
    /// Build a client, reading the admin secret from the environment.
    pub fn new(config: &RemoteConfig, fetch: &FetchConfig) -> Result<Self> {
        let secret = config.secret()?;
        Ok(Self::with_secret(create_async_client(fetch)?, config, secret))
    }

    pub fn with_secret(client: Client, config: &RemoteConfig, secret: impl Into<String>) -> Self {
        Self {
            client,
            config: config.clone(),
            secret: secret.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn status_of(&self, label: &str) -> BookStatus {
        let label = label.trim();
        if label == self.config.completed_label || label.eq_ignore_ascii_case("completed") {
            BookStatus::Completed
        } else {
            BookStatus::Ongoing
        }
    }

    fn label_of(&self, status: BookStatus) -> &str {
        match status {
            BookStatus::Completed => &self.config.completed_label,
            BookStatus::Ongoing => &self.config.ongoing_label,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn book_statuses(&self) -> Result<StatusSnapshot> {
        let url = self.endpoint(&self.config.books_path);
        let response = self
            .client
            .get(&url)
            .header(self.config.secret_header.as_str(), &self.secret)
            .query(&[("limit", "5000"), ("orderBy", "updatedAt"), ("order", "desc")])
            .send()
            .await?;
        let response = ensure_success(&url, response).await?;
        let status = response.status().as_u16();

        let listed: Vec<ListedBook> = response
            .json()
            .await
            .map_err(|e| AppError::remote(&url, status, format!("expected a book array: {e}")))?;

        Ok(StatusSnapshot::new(listed.into_iter().map(|b| RemoteBook {
            id: id_segment(&b.id),
            status: self.status_of(&b.status),
            title: b.title,
        })))
    }

    async fn check_sync(
        &self,
        title: &str,
        manifest: &[ManifestEntry],
    ) -> Result<CheckSyncResponse> {
        let url = self.endpoint(&self.config.check_sync_path);
        let response = self
            .client
            .post(&url)
            .header(self.config.secret_header.as_str(), &self.secret)
            .json(&CheckSyncRequest {
                title,
                simple_chapters: manifest,
            })
            .send()
            .await?;
        let response = ensure_success(&url, response).await?;
        let status = response.status().as_u16();

        response
            .json()
            .await
            .map_err(|e| AppError::remote(&url, status, format!("bad check-sync answer: {e}")))
    }

    async fn upload_book(
        &self,
        metadata: &Map<String, Value>,
        chapters: &[Chapter],
    ) -> Result<usize> {
        let url = self.endpoint(&self.config.upload_path);
        let response = self
            .client
            .post(&url)
            .header(self.config.secret_header.as_str(), &self.secret)
            .json(&UploadRequest { metadata, chapters })
            .send()
            .await?;
        let response = ensure_success(&url, response).await?;

        // Older servers answer with an empty or unrelated body.
        let body = response.text().await?;
        let accepted = serde_json::from_str::<UploadResponse>(&body)
            .ok()
            .and_then(|r| r.accepted)
            .unwrap_or(chapters.len());
        Ok(accepted)
    }

    async fn set_status(&self, book: &RemoteBook, status: BookStatus) -> Result<()> {
        let url = self.endpoint(&format!("{}/{}", self.config.books_path, book.id));
        let response = self
            .client
            .patch(&url)
            .header(self.config.secret_header.as_str(), &self.secret)
            .json(&serde_json::json!({ "status": self.label_of(status) }))
            .send()
            .await?;
        ensure_success(&url, response).await?;
        Ok(())
    }
}

/// Map 401/403 to [`AppError::Auth`] and other failures to [`AppError::Remote`].
async fn ensure_success(endpoint: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(AppError::Auth {
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::remote(endpoint, status.as_u16(), Snippet(&body)));
    }
    Ok(response)
}

fn id_segment(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// First line of a response body, capped for log output.
struct Snippet<'a>(&'a str);

impl fmt::Display for Snippet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self.0.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            return f.write_str("(empty body)");
        }
        let mut chars = line.chars();
        let head: String = chars.by_ref().take(200).collect();
        if chars.next().is_some() {
            write!(f, "{head}...")
        } else {
            f.write_str(&head)
        }
    }
}
