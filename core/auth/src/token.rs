//! Access-token management for a live session.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use drivemcp_common::Result;

use crate::credential::CredentialRecord;
use crate::resolver::CredentialResolver;

/// Supplies bearer tokens for API requests.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Get a non-expired access token.
    async fn access_token(&self) -> Result<String>;
}

/// Token manager that renews expired tokens through the resolver.
pub struct TokenManager {
    resolver: Arc<dyn CredentialResolver>,
    record: RwLock<CredentialRecord>,
}

impl TokenManager {
    /// Create a new token manager with an initial credential.
    pub fn new(resolver: Arc<dyn CredentialResolver>, record: CredentialRecord) -> Self {
        Self {
            resolver,
            record: RwLock::new(record),
        }
    }

    /// Get a valid access token, renewing if necessary.
    ///
    /// # Postconditions
    /// - Returns a valid (non-expired) access token
    ///
    /// # Errors
    /// - Renewal failed
    pub async fn get_access_token(&self) -> Result<String> {
        let record = self.record.read().await;

        if !record.is_expired() {
            return Ok(record.access_token.clone());
        }

        drop(record);

        // Need to renew
        let mut record = self.record.write().await;

        // Double-check after acquiring write lock
        if !record.is_expired() {
            return Ok(record.access_token.clone());
        }

        tracing::info!(strategy = %record.strategy, "Renewing expired access token");

        *record = self.resolver.renew(&record).await?;

        Ok(record.access_token.clone())
    }

    /// Get the current credential.
    pub async fn current(&self) -> CredentialRecord {
        self.record.read().await.clone()
    }
}

#[async_trait]
impl AccessTokenSource for TokenManager {
    async fn access_token(&self) -> Result<String> {
        self.get_access_token().await
    }
}

/// Fixed token, for tests and pre-authorized hosts.
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
