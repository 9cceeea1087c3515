//! Common utilities and types shared across DriveMCP crates.
//!
//! This module provides the error taxonomy and the identifier types used by
//! the credential, drive and server layers.

pub mod error;
pub mod types;

pub use error::{Error, Result, RetrievalError};
pub use types::FileId;
