//! Google Drive API client.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

use drivemcp_auth::AccessTokenSource;
use drivemcp_common::{Error, FileId, Result};

use crate::download::{Chunk, ChunkSource};
use crate::export::FOLDER_MIME;

/// Google Drive API base URL.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Fields requested when listing files.
pub const LIST_FIELDS: &str = "id, name, mimeType, createdTime, modifiedTime, size, parents";

/// Fields requested when describing a single file.
pub const METADATA_FIELDS: &str =
    "id,name,mimeType,createdTime,modifiedTime,size,description,webViewLink,owners,parents";

/// Owner of a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
}

/// Google Drive file metadata from API.
///
/// Only the requested fields are present in a response, so everything
/// besides the ID is optional or defaulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// File ID.
    pub id: String,
    /// File name.
    #[serde(default)]
    pub name: String,
    /// MIME type.
    #[serde(default)]
    pub mime_type: String,
    /// File size in bytes (only for files with stored content).
    #[serde(default)]
    pub size: Option<String>,
    /// Created time.
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
    /// Modified time.
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    /// Parent folder IDs.
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
    /// Owners; absent unless requested.
    #[serde(default)]
    pub owners: Option<Vec<Owner>>,
}

impl DriveFile {
    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }

    /// Get size as u64.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_ref().and_then(|s| s.parse().ok())
    }
}

/// Response from listing files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// Google Drive API client.
#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    api_base: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl DriveClient {
    /// Create a new Drive client against `api_base`.
    pub fn new(tokens: Arc<dyn AccessTokenSource>, api_base: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("DriveMCP/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Get authorization header.
    async fn auth_header(&self) -> Result<String> {
        let token = self.tokens.access_token().await?;
        Ok(format!("Bearer {}", token))
    }

    fn file_url(&self, file_id: &FileId) -> String {
        format!("{}/files/{}", self.api_base, file_id)
    }

    /// List one page of files matching a Drive query.
    ///
    /// An empty `query` lists everything visible to the caller.
    pub async fn list_files(
        &self,
        query: &str,
        page_size: u32,
        fields: &str,
    ) -> Result<Vec<DriveFile>> {
        let url = format!("{}/files", self.api_base);
        let auth = self.auth_header().await?;
        let fields = format!("files({})", fields);
        let page_size = page_size.to_string();

        let mut request = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("pageSize", page_size.as_str()), ("fields", fields.as_str())]);

        if !query.is_empty() {
            request = request.query(&[("q", query)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to list files: {}", e)))?;

        let list_response: FileListResponse = handle_response(response).await?;
        debug!(count = list_response.files.len(), "Listed files");
        Ok(list_response.files)
    }

    /// Get file metadata by ID.
    pub async fn get_file(&self, file_id: &FileId, fields: &str) -> Result<DriveFile> {
        let auth = self.auth_header().await?;

        let response = self
            .http
            .get(self.file_url(file_id))
            .header(header::AUTHORIZATION, auth)
            .query(&[("fields", fields)])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to get file: {}", e)))?;

        handle_response(response).await
    }

    /// Prepare a ranged download of the stored bytes.
    ///
    /// No request is made until the first chunk is pulled.
    pub fn open_download(&self, file_id: &FileId, chunk_size: usize) -> Result<RangedDownload> {
        if chunk_size == 0 {
            return Err(Error::InvalidInput(
                "Chunk size must be positive".to_string(),
            ));
        }

        Ok(RangedDownload {
            client: self.clone(),
            url: self.file_url(file_id),
            chunk_size: chunk_size as u64,
            offset: 0,
            whole_body: None,
        })
    }

    /// Start a server-side export and stream its body.
    pub async fn open_export(&self, file_id: &FileId, target_mime: &str) -> Result<ExportStream> {
        let url = format!("{}/export", self.file_url(file_id));
        let auth = self.auth_header().await?;

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("mimeType", target_mime)])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to start export: {}", e)))?;

        let response = check_status(response).await?;
        Ok(ExportStream::from_response(response))
    }
}

/// Stored content pulled with successive `Range` requests.
pub struct RangedDownload {
    client: DriveClient,
    url: String,
    chunk_size: u64,
    offset: u64,
    /// Set once the server ignores the range and sends everything at once.
    whole_body: Option<ExportStream>,
}

#[async_trait]
impl ChunkSource for RangedDownload {
    async fn next_chunk(&mut self) -> Result<Chunk> {
        if let Some(body) = self.whole_body.as_mut() {
            return body.next_chunk().await;
        }

        let end = self.offset + self.chunk_size - 1;
        let auth = self.client.auth_header().await?;

        let response = self
            .client
            .http
            .get(&self.url)
            .header(header::AUTHORIZATION, auth)
            .header(header::RANGE, format!("bytes={}-{}", self.offset, end))
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to download chunk: {}", e)))?;

        match response.status() {
            // Server ignored the range and sent the whole body
            StatusCode::OK => {
                debug!(url = %self.url, "Range ignored; streaming whole body");
                self.whole_body
                    .insert(ExportStream::from_response(response))
                    .next_chunk()
                    .await
            }
            StatusCode::PARTIAL_CONTENT => {
                let total = response
                    .headers()
                    .get(header::CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(content_range_total);
                let data = read_body(response).await?;
                self.offset += data.len() as u64;

                let done = data.is_empty()
                    || match total {
                        Some(total) => self.offset >= total,
                        None => (data.len() as u64) < self.chunk_size,
                    };
                Ok(Chunk { data, done })
            }
            // Past the end; at offset 0 the file is empty
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(Chunk::last(Bytes::new())),
            _ => Err(status_error(response).await),
        }
    }
}

/// Exported content pulled from the response body stream.
pub struct ExportStream {
    stream: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
}

impl ExportStream {
    fn from_response(response: reqwest::Response) -> Self {
        let stream = response
            .bytes_stream()
            .map(|result| result.map_err(|e| Error::Network(format!("Stream read error: {}", e))));
        Self {
            stream: Box::pin(stream),
        }
    }
}

#[async_trait]
impl ChunkSource for ExportStream {
    async fn next_chunk(&mut self) -> Result<Chunk> {
        match self.stream.next().await {
            Some(Ok(data)) => Ok(Chunk::partial(data)),
            Some(Err(e)) => Err(e),
            None => Ok(Chunk::last(Bytes::new())),
        }
    }
}

/// Total length from a `Content-Range: bytes start-end/total` header.
fn content_range_total(value: &str) -> Option<u64> {
    value
        .strip_prefix("bytes ")?
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse().ok())
}

async fn read_body(response: reqwest::Response) -> Result<Bytes> {
    response
        .bytes()
        .await
        .map_err(|e| Error::Network(format!("Failed to read response body: {}", e)))
}

/// Map a failed response to an error.
async fn status_error(response: reqwest::Response) -> Error {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        Error::NotFound("Resource not found".to_string())
    } else if status == StatusCode::UNAUTHORIZED {
        Error::Authentication("Invalid or expired token".to_string())
    } else if status == StatusCode::FORBIDDEN {
        Error::PermissionDenied("Access denied".to_string())
    } else {
        let body = response.text().await.unwrap_or_default();
        Error::Network(format!("API error: {} - {}", status, body))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(status_error(response).await)
    }
}

/// Handle API response with error checking.
async fn handle_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    check_status(response)
        .await?
        .json()
        .await
        .map_err(|e| Error::Network(format!("Failed to parse response: {}", e)))
}
