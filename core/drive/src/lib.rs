//! Google Drive access for DriveMCP.
//!
//! - [`client`]: Drive v3 REST calls for listing, metadata and transfers
//! - [`export`]: which files can be rendered as text, and how
//! - [`download`]: bounded, chunked content retrieval
//! - [`session`]: the lazily authenticated, shared session

pub mod client;
pub mod download;
pub mod export;
pub mod session;

pub use client::{DriveClient, DriveFile, Owner, LIST_FIELDS, METADATA_FIELDS};
pub use download::{Chunk, ChunkSource, ChunkedDownloader};
pub use export::{
    ExportFormatResolver, ExportPlan, Representation, Resolution, RetrievalMode, FOLDER_MIME,
};
pub use session::{DriveConfig, DriveSession, SessionFactory};
