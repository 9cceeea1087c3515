//! Lazily constructed, process-wide Drive session.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use drivemcp_auth::{AuthStrategy, CredentialResolver, TokenManager};
use drivemcp_common::Result;

use crate::client::{DriveClient, DRIVE_API_BASE};
use crate::download::{ChunkedDownloader, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD_BYTES};

/// Drive access configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Drive v3 API base URL.
    pub api_base: String,
    /// Bytes requested per ranged download chunk.
    pub chunk_size: usize,
    /// Upper bound on downloaded content held in memory.
    pub max_payload_bytes: usize,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: DRIVE_API_BASE.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Authenticated Drive access bound to one credential.
pub struct DriveSession {
    client: DriveClient,
    tokens: Arc<TokenManager>,
    downloader: ChunkedDownloader,
    strategy: AuthStrategy,
}

impl DriveSession {
    /// REST client.
    pub fn client(&self) -> &DriveClient {
        &self.client
    }

    /// Content downloader configured for this session.
    pub fn downloader(&self) -> &ChunkedDownloader {
        &self.downloader
    }

    /// Token manager backing the client.
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Strategy that produced the session credential.
    pub fn strategy(&self) -> AuthStrategy {
        self.strategy
    }
}

/// Creates the session on first use and hands out the same handle after.
pub struct SessionFactory {
    resolver: Arc<dyn CredentialResolver>,
    config: DriveConfig,
    session: OnceCell<Arc<DriveSession>>,
}

impl SessionFactory {
    /// Create a factory. Nothing is resolved until [`get_session`](Self::get_session).
    pub fn new(resolver: Arc<dyn CredentialResolver>, config: DriveConfig) -> Self {
        Self {
            resolver,
            config,
            session: OnceCell::new(),
        }
    }

    /// Get the shared session, resolving credentials on the first call.
    ///
    /// Concurrent first callers wait on the same initialization. A failed
    /// initialization leaves the factory empty so the next call retries.
    ///
    /// # Errors
    /// - Credential resolution failed
    pub async fn get_session(&self) -> Result<Arc<DriveSession>> {
        self.session
            .get_or_try_init(|| self.create_session())
            .await
            .cloned()
    }

    /// Whether a session has been established.
    pub fn is_initialized(&self) -> bool {
        self.session.initialized()
    }

    async fn create_session(&self) -> Result<Arc<DriveSession>> {
        let record = self.resolver.resolve().await?;
        let strategy = record.strategy;
        info!(%strategy, expires_at = %record.expires_at, "Drive session established");

        let tokens = Arc::new(TokenManager::new(self.resolver.clone(), record));
        let client = DriveClient::new(tokens.clone(), self.config.api_base.clone())?;

        Ok(Arc::new(DriveSession {
            client,
            tokens,
            downloader: ChunkedDownloader::new(
                self.config.chunk_size,
                self.config.max_payload_bytes,
            ),
            strategy,
        }))
    }
}
