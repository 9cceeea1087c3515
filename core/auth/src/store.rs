//! Durable storage for the credential record.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use tokio::fs;

use drivemcp_common::{Error, Result};

use crate::credential::CredentialRecord;

/// Storage backend for the persisted credential.
///
/// Implementations must not perform network I/O.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the persisted record.
    ///
    /// # Returns
    /// - `Ok(None)` if no record has ever been stored
    ///
    /// # Errors
    /// - `Error::Storage` if the storage is unreadable or corrupt
    async fn load(&self) -> Result<Option<CredentialRecord>>;

    /// Persist a record, replacing any prior one.
    ///
    /// # Postconditions
    /// - A subsequent `load` returns `record`
    /// - A crash mid-write leaves the previous record intact
    ///
    /// # Errors
    /// - `Error::Storage` on write failure
    async fn save(&self, record: &CredentialRecord) -> Result<()>;
}

/// JSON file credential store.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store backed by `path`. The file is not touched until used.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "credentials".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    #[cfg(unix)]
    async fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .await?;
        file.write_all(data).await?;
        file.sync_all().await
    }

    #[cfg(not(unix))]
    async fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
        fs::write(path, data).await
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<CredentialRecord>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "Failed to read credential file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let record = serde_json::from_slice(&data).map_err(|e| {
            Error::Storage(format!(
                "Credential file {} is corrupt: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(Some(record))
    }

    async fn save(&self, record: &CredentialRecord) -> Result<()> {
        let data = serde_json::to_vec_pretty(record)
            .map_err(|e| Error::Storage(format!("Failed to serialize credential: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::Storage(format!(
                    "Failed to create credential directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let temp = self.temp_path();
        Self::write_private(&temp, &data).await.map_err(|e| {
            Error::Storage(format!("Failed to write {}: {}", temp.display(), e))
        })?;

        fs::rename(&temp, &self.path).await.map_err(|e| {
            Error::Storage(format!(
                "Failed to replace credential file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %self.path.display(), "Persisted credential");
        Ok(())
    }
}

/// In-memory credential store.
///
/// Useful for testing and for hosts that must not write to disk. Counts
/// saves so callers can assert on persistence.
#[derive(Default)]
pub struct MemoryCredentialStore {
    record: RwLock<Option<CredentialRecord>>,
    saves: AtomicUsize,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `record`.
    pub fn with_record(record: CredentialRecord) -> Self {
        Self {
            record: RwLock::new(Some(record)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current record, if any.
    pub fn current(&self) -> Option<CredentialRecord> {
        self.record.read().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<CredentialRecord>> {
        let guard = self
            .record
            .read()
            .map_err(|_| Error::Storage("Credential store lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    async fn save(&self, record: &CredentialRecord) -> Result<()> {
        let mut guard = self
            .record
            .write()
            .map_err(|_| Error::Storage("Credential store lock poisoned".to_string()))?;
        *guard = Some(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
