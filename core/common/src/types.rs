//! Common types used throughout DriveMCP.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a remote file or folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Alias the remote API accepts for the top-level folder.
    pub const ROOT: &'static str = "root";

    /// Create a new FileId from a string.
    ///
    /// # Preconditions
    /// - `id` must be non-empty after trimming
    /// - `id` must not contain quotes or path separators
    ///
    /// # Errors
    /// - Returns error if id is empty or malformed
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "File ID cannot be empty".to_string(),
            ));
        }
        if id.contains(['\'', '"', '/', '\\']) {
            return Err(crate::Error::InvalidInput(format!(
                "File ID contains invalid characters: {}",
                id
            )));
        }
        Ok(Self(id))
    }

    /// The top-level folder alias.
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Check if this is the top-level folder alias.
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
