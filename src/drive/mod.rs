//! Google Drive as the redundant remote store: folder list/create and file
//! upload primitives, with errors split into the transient class the upload
//! retry loop is allowed to chase and everything else.

pub mod upload;

pub use upload::{UploadManager, UploadReport};

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("remote returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected response shape: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Connection trouble, rate limiting, and server-side errors are worth
    /// retrying; everything else ends the attempt sequence for a destination.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Status { status, .. } => {
                matches!(status, 403 | 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

/// The narrow remote-storage surface the upload manager runs against.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Look up a folder by exact name under a parent. `None` means absent.
    async fn find_folder(&self, name: &str, parent: &str) -> Result<Option<String>, StoreError>;

    async fn create_folder(&self, name: &str, parent: &str) -> Result<String, StoreError>;

    /// Upload a local file into a folder, returning the new file id.
    async fn upload_file(&self, path: &Path, folder_id: &str) -> Result<String, StoreError>;
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
}

/// Drive v3 REST client. Credential acquisition happens outside; this takes
/// a ready bearer token.
pub struct DriveClient {
    http: reqwest::Client,
    token: String,
}

impl DriveClient {
    pub fn new(token: String) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self { http, token })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message: String = body.chars().take(200).collect();
        Err(StoreError::Status { status: status.as_u16(), message })
    }

    fn escape_query_value(value: &str) -> String {
        value.replace('\\', "\\\\").replace('\'', "\\'")
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn find_folder(&self, name: &str, parent: &str) -> Result<Option<String>, StoreError> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and '{}' in parents and trashed = false",
            Self::escape_query_value(name),
            FOLDER_MIME,
            Self::escape_query_value(parent),
        );
        let response = self
            .http
            .get(format!("{API_BASE}/files"))
            .bearer_auth(&self.token)
            .query(&[("q", query.as_str()), ("spaces", "drive"), ("fields", "files(id)")])
            .send()
            .await?;
        let list: FileList = Self::check(response).await?.json().await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, name: &str, parent: &str) -> Result<String, StoreError> {
        let body = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent],
        });
        let response = self
            .http
            .post(format!("{API_BASE}/files"))
            .bearer_auth(&self.token)
            .query(&[("fields", "id")])
            .json(&body)
            .send()
            .await?;
        let created: FileRef = Self::check(response).await?.json().await?;
        Ok(created.id)
    }

    async fn upload_file(&self, path: &Path, folder_id: &str) -> Result<String, StoreError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::Malformed(format!("bad artifact path {}", path.display())))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| StoreError::Io { path: path.display().to_string(), source })?;

        let metadata = serde_json::json!({ "name": file_name, "parents": [folder_id] });

        // Drive's multipart upload wants multipart/related: a JSON metadata
        // part followed by the file content part.
        const BOUNDARY: &str = "souq_scout_artifact";
        let mut body = Vec::with_capacity(bytes.len() + 512);
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(format!("--{BOUNDARY}\r\nContent-Type: {XLSX_MIME}\r\n\r\n").as_bytes());
        body.extend_from_slice(&bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let response = self
            .http
            .post(format!("{UPLOAD_BASE}/files"))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(reqwest::header::CONTENT_TYPE, format!("multipart/related; boundary={BOUNDARY}"))
            .body(body)
            .send()
            .await?;
        let created: FileRef = Self::check(response).await?.json().await?;
        Ok(created.id)
    }
}
