//! DriveMCP server library.
//!
//! Exposes read-only Google Drive tools over the Model Context Protocol.

pub mod config;
pub mod format;
pub mod service;

pub use config::{AuthArgs, DriveArgs};
pub use service::DriveToolService;
