//! REST client for the Drive v3 API.
//!
//! Covers the storage operations the job needs: listing a folder,
//! downloading a file, creating a file, finding a file by name, and
//! replacing file content in place. Every network call is wrapped in
//! bounded retry with backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::retry::{with_backoff, DEFAULT_ATTEMPTS};

use super::auth::TokenProvider;
use super::error::{DriveError, Result};

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

/// Files fetched per listing page.
const PAGE_SIZE: u32 = 200;

/// Metadata fields requested for listings. Restricting fields keeps
/// responses small on folders with thousands of files.
const LIST_FIELDS: &str = "nextPageToken, files(id, name, md5Checksum, modifiedTime)";

/// Connect timeout for Drive requests (10 seconds).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total request timeout (120 seconds). Scanned bundles run to tens of
/// megabytes, so transfers need headroom.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Fixed boundary for multipart uploads.
const MULTIPART_BOUNDARY: &str = "pooldex_upload_2718281828";

/// Maximum length of an API error body carried into an error value.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// A document discovered in the incoming folder.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    /// Stable identity assigned by the storage backend.
    pub id: String,

    /// Display name, e.g. `pool_batch_07.pdf`.
    pub name: String,

    /// Content hash reported by the backend, when available.
    pub md5: Option<String>,

    /// Last modification time reported by the backend.
    pub modified_at: Option<DateTime<Utc>>,

    /// When this run first saw the file.
    pub discovered_at: DateTime<Utc>,
}

/// Storage operations the job needs from the backing drive.
///
/// Kept narrow so tests can substitute an in-memory implementation.
#[async_trait]
pub trait FolderStore: Send + Sync {
    /// Lists the candidate documents (PDFs) in a folder.
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<CandidateFile>>;

    /// Downloads the full content of a file.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Creates a file in a folder and returns its id.
    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        content: &[u8],
    ) -> Result<String>;

    /// Finds a file by exact name within a folder.
    async fn find_by_name(&self, folder_id: &str, name: &str) -> Result<Option<String>>;

    /// Replaces the content of an existing file, keeping its id and name.
    async fn replace(&self, file_id: &str, mime_type: &str, content: &[u8]) -> Result<()>;

    /// Creates or fully replaces a file by name within a folder.
    ///
    /// Readers of the folder only ever see a complete old version or a
    /// complete new version, never a mix.
    async fn upsert_by_name(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        content: &[u8],
    ) -> Result<String> {
        match self.find_by_name(folder_id, name).await? {
            Some(file_id) => {
                self.replace(&file_id, mime_type, content).await?;
                Ok(file_id)
            }
            None => self.upload(folder_id, name, mime_type, content).await,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    next_page_token: Option<String>,

    #[serde(default)]
    files: Vec<FileMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMeta {
    id: String,
    name: String,

    #[serde(default)]
    md5_checksum: Option<String>,

    #[serde(default)]
    modified_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

impl FileMeta {
    fn into_candidate(self, discovered_at: DateTime<Utc>) -> CandidateFile {
        let modified_at = self.modified_time.as_deref().and_then(|raw| {
            match DateTime::parse_from_rfc3339(raw) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(e) => {
                    debug!("Ignoring unparseable modifiedTime '{}': {}", raw, e);
                    None
                }
            }
        });

        CandidateFile {
            id: self.id,
            name: self.name,
            md5: self.md5_checksum,
            modified_at,
            discovered_at,
        }
    }
}

/// Escapes a value for use inside single quotes in a Drive search query.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Builds the listing query for a folder: PDFs only, trash excluded.
fn build_listing_query(folder_id: &str) -> String {
    format!(
        "'{}' in parents and mimeType = 'application/pdf' and trashed = false",
        escape_query_value(folder_id)
    )
}

/// Assembles a `multipart/related` upload body from metadata and content.
fn build_multipart_body(metadata_json: &str, mime_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata_json.len() + content.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata_json.as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

fn truncate_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        format!("{}... (truncated)", &body[..MAX_ERROR_BODY_LENGTH])
    } else {
        body.to_string()
    }
}

/// Converts a failed response into an API error, keeping a truncated body
/// for context.
async fn check_status(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DriveError::Api {
        operation,
        status,
        body: truncate_body(&body),
    })
}

/// Drive v3 client authenticated through a [`TokenProvider`].
pub struct DriveClient {
    http: Client,
    tokens: Arc<dyn TokenProvider>,
}

impl DriveClient {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, tokens })
    }

    async fn fetch_page(&self, query: &str, page_token: Option<&str>) -> Result<FileList> {
        let http = &self.http;
        let tokens = self.tokens.as_ref();
        let page_size = PAGE_SIZE.to_string();
        let page_size = page_size.as_str();

        with_backoff("drive.list", DEFAULT_ATTEMPTS, || async move {
            let token = tokens.access_token().await?;
            let mut request = http
                .get(DRIVE_FILES_URL)
                .query(&[
                    ("q", query),
                    ("pageSize", page_size),
                    ("orderBy", "name"),
                    ("fields", LIST_FIELDS),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ])
                .bearer_auth(token.expose_secret());
            if let Some(next) = page_token {
                request = request.query(&[("pageToken", next)]);
            }

            let response = request.send().await?;
            let response = check_status("drive.list", response).await?;
            response
                .json::<FileList>()
                .await
                .map_err(|e| DriveError::Parse {
                    operation: "drive.list",
                    reason: e.to_string(),
                })
        })
        .await
    }

    async fn search(&self, query: &str) -> Result<Vec<FileMeta>> {
        let http = &self.http;
        let tokens = self.tokens.as_ref();

        with_backoff("drive.search", DEFAULT_ATTEMPTS, || async move {
            let token = tokens.access_token().await?;
            let response = http
                .get(DRIVE_FILES_URL)
                .query(&[
                    ("q", query),
                    ("pageSize", "10"),
                    ("fields", "files(id, name)"),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ])
                .bearer_auth(token.expose_secret())
                .send()
                .await?;
            let response = check_status("drive.search", response).await?;
            let list: FileList = response.json().await.map_err(|e| DriveError::Parse {
                operation: "drive.search",
                reason: e.to_string(),
            })?;
            Ok(list.files)
        })
        .await
    }
}

#[async_trait]
impl FolderStore for DriveClient {
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<CandidateFile>> {
        let query = build_listing_query(folder_id);
        let mut pages = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.fetch_page(&query, page_token.as_deref()).await?;
            pages.extend(page.files);
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!("Listed {} candidate files in folder {}", pages.len(), folder_id);

        let discovered_at = Utc::now();
        Ok(pages
            .into_iter()
            .map(|meta| meta.into_candidate(discovered_at))
            .collect())
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let http = &self.http;
        let tokens = self.tokens.as_ref();
        let url = format!("{}/{}", DRIVE_FILES_URL, file_id);
        let url = url.as_str();

        with_backoff("drive.download", DEFAULT_ATTEMPTS, || async move {
            let token = tokens.access_token().await?;
            let response = http
                .get(url)
                .query(&[("alt", "media"), ("supportsAllDrives", "true")])
                .bearer_auth(token.expose_secret())
                .send()
                .await?;
            let response = check_status("drive.download", response).await?;
            let bytes = response.bytes().await?;
            Ok(bytes.to_vec())
        })
        .await
    }

    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        content: &[u8],
    ) -> Result<String> {
        let metadata = serde_json::json!({
            "name": name,
            "parents": [folder_id],
        })
        .to_string();
        let body = build_multipart_body(&metadata, mime_type, content);
        let body = body.as_slice();
        let content_type = format!("multipart/related; boundary={}", MULTIPART_BOUNDARY);
        let content_type = content_type.as_str();

        let http = &self.http;
        let tokens = self.tokens.as_ref();

        with_backoff("drive.upload", DEFAULT_ATTEMPTS, || async move {
            let token = tokens.access_token().await?;
            let response = http
                .post(DRIVE_UPLOAD_URL)
                .query(&[
                    ("uploadType", "multipart"),
                    ("fields", "id"),
                    ("supportsAllDrives", "true"),
                ])
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .bearer_auth(token.expose_secret())
                .body(body.to_vec())
                .send()
                .await?;
            let response = check_status("drive.upload", response).await?;
            let created: CreatedFile = response.json().await.map_err(|e| DriveError::Parse {
                operation: "drive.upload",
                reason: e.to_string(),
            })?;
            Ok(created.id)
        })
        .await
    }

    async fn find_by_name(&self, folder_id: &str, name: &str) -> Result<Option<String>> {
        let query = format!(
            "'{}' in parents and name = '{}' and trashed = false",
            escape_query_value(folder_id),
            escape_query_value(name)
        );
        let files = self.search(&query).await?;
        Ok(files.into_iter().next().map(|meta| meta.id))
    }

    async fn replace(&self, file_id: &str, mime_type: &str, content: &[u8]) -> Result<()> {
        let http = &self.http;
        let tokens = self.tokens.as_ref();
        let url = format!("{}/{}", DRIVE_UPLOAD_URL, file_id);
        let url = url.as_str();

        with_backoff("drive.replace", DEFAULT_ATTEMPTS, || async move {
            let token = tokens.access_token().await?;
            let response = http
                .patch(url)
                .query(&[("uploadType", "media"), ("supportsAllDrives", "true")])
                .header(reqwest::header::CONTENT_TYPE, mime_type)
                .bearer_auth(token.expose_secret())
                .body(content.to_vec())
                .send()
                .await?;
            check_status("drive.replace", response).await?;
            Ok(())
        })
        .await
    }
}
