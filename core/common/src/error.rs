//! Common error types for DriveMCP.

use thiserror::Error;

/// Top-level error type for DriveMCP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Credential storage is unreadable, corrupt or unwritable.
    #[error("Storage error: {0}")]
    Storage(String),

    /// No usable credential could be obtained, or a refresh failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Content retrieval failed.
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Remote API call failed.
    #[error("Network error: {0}")]
    Network(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Access to the resource was refused.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failure while draining a download or export transfer.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// A chunk request failed; the transfer was abandoned.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The payload is not valid UTF-8.
    #[error("content is not valid UTF-8: {0}")]
    Decode(String),

    /// The payload exceeded the configured limit.
    #[error("content exceeds the {limit} byte limit")]
    TooLarge {
        /// Configured maximum payload size in bytes.
        limit: usize,
    },
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_error_wraps_into_error() {
        let err: Error = RetrievalError::TooLarge { limit: 1024 }.into();
        assert!(matches!(
            err,
            Error::Retrieval(RetrievalError::TooLarge { limit: 1024 })
        ));
        assert_eq!(
            err.to_string(),
            "Retrieval error: content exceeds the 1024 byte limit"
        );
    }
}
