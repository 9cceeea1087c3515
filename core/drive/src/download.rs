//! Chunked retrieval of file content into memory.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tracing::debug;

use drivemcp_common::{Error, FileId, Result, RetrievalError};

use crate::client::DriveClient;
use crate::export::{ExportPlan, RetrievalMode};

/// Default size of one ranged request (8 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Default upper bound on an accumulated payload (32 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 32 * 1024 * 1024;

/// One piece of a transfer.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub data: Bytes,
    /// The transfer has nothing further to deliver.
    pub done: bool,
}

impl Chunk {
    /// A chunk followed by more data.
    pub fn partial(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            done: false,
        }
    }

    /// The final chunk of a transfer.
    pub fn last(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            done: true,
        }
    }
}

/// Incremental source of transfer chunks.
#[async_trait]
pub trait ChunkSource: Send {
    /// Pull the next chunk.
    async fn next_chunk(&mut self) -> Result<Chunk>;
}

/// Drives a chunk source to completion with a bounded accumulator.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedDownloader {
    chunk_size: usize,
    max_payload_bytes: usize,
}

impl Default for ChunkedDownloader {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

impl ChunkedDownloader {
    /// Create a downloader.
    pub fn new(chunk_size: usize, max_payload_bytes: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_payload_bytes,
        }
    }

    /// Bytes requested per ranged chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Upper bound on the accumulated payload.
    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Pull chunks until the source reports completion.
    ///
    /// # Errors
    /// - `RetrievalError::Transfer` if any chunk fails; nothing is returned
    /// - `RetrievalError::TooLarge` once the payload exceeds the limit
    pub async fn drain<S: ChunkSource + ?Sized>(&self, source: &mut S) -> Result<Vec<u8>> {
        let mut buffer = BytesMut::new();
        let mut chunks = 0usize;

        loop {
            let chunk = source.next_chunk().await.map_err(into_transfer)?;
            chunks += 1;

            if buffer.len() + chunk.data.len() > self.max_payload_bytes {
                return Err(RetrievalError::TooLarge {
                    limit: self.max_payload_bytes,
                }
                .into());
            }
            buffer.extend_from_slice(&chunk.data);

            if chunk.done {
                break;
            }
        }

        debug!(chunks, bytes = buffer.len(), "Transfer complete");
        Ok(buffer.to_vec())
    }

    /// Retrieve the bytes of a file according to `plan`.
    pub async fn fetch(
        &self,
        client: &DriveClient,
        file_id: &FileId,
        plan: &ExportPlan,
    ) -> Result<Vec<u8>> {
        match plan.mode {
            RetrievalMode::Raw => {
                let mut source = client
                    .open_download(file_id, self.chunk_size)
                    .map_err(into_transfer)?;
                self.drain(&mut source).await
            }
            RetrievalMode::Export { target_mime } => {
                let mut source = client
                    .open_export(file_id, target_mime)
                    .await
                    .map_err(into_transfer)?;
                self.drain(&mut source).await
            }
        }
    }

    /// Retrieve a file and decode it as strict UTF-8.
    ///
    /// # Errors
    /// - Everything [`fetch`](Self::fetch) reports
    /// - `RetrievalError::Decode` for invalid UTF-8
    pub async fn fetch_text(
        &self,
        client: &DriveClient,
        file_id: &FileId,
        plan: &ExportPlan,
    ) -> Result<String> {
        let bytes = self.fetch(client, file_id, plan).await?;
        decode_utf8(bytes)
    }
}

/// Strict UTF-8 decoding.
pub fn decode_utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| RetrievalError::Decode(e.utf8_error().to_string()).into())
}

fn into_transfer(error: Error) -> Error {
    match error {
        Error::Retrieval(inner) => Error::Retrieval(inner),
        other => RetrievalError::Transfer(other.to_string()).into(),
    }
}
