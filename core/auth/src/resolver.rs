//! Credential acquisition with a fixed strategy precedence.
//!
//! Resolution order:
//! 1. persisted credential (refreshed when expired and refreshable)
//! 2. interactive installed-app OAuth, if the client-secret file exists
//! 3. service-account key named by the environment, if the file exists
//! 4. failure

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use drivemcp_common::{Error, Result};

use crate::credential::{AuthStrategy, CredentialRecord, CredentialState, DRIVE_READONLY_SCOPE};
use crate::store::CredentialStore;

/// Environment variable naming the service-account key file.
pub const SERVICE_ACCOUNT_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Default credential persistence file.
pub const DEFAULT_TOKEN_PATH: &str = "token.json";

/// Default client-secret configuration file.
pub const DEFAULT_CLIENT_SECRET_PATH: &str = "credentials.json";

/// Message of the terminal resolution failure.
pub const NO_CREDENTIALS: &str = "no valid credentials found";

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Refresh `record`, returning the renewed record.
    async fn refresh(&self, record: &CredentialRecord) -> Result<CredentialRecord>;
}

/// Blocking user-consent authorization step.
#[async_trait]
pub trait InteractiveAuthorizer: Send + Sync {
    /// Run the consent flow using the client registration at `client_secret_path`.
    async fn authorize(&self, client_secret_path: &Path, scope: &str) -> Result<CredentialRecord>;
}

/// Non-interactive service-account grant.
#[async_trait]
pub trait ServiceAccountAuthorizer: Send + Sync {
    /// Mint an access token from the key at `key_path`.
    async fn authorize(&self, key_path: &Path, scope: &str) -> Result<CredentialRecord>;
}

/// Source of credentials for a session.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Obtain a usable credential, running strategies in precedence order.
    async fn resolve(&self) -> Result<CredentialRecord>;

    /// Renew a credential whose access token has expired mid-session.
    async fn renew(&self, current: &CredentialRecord) -> Result<CredentialRecord>;
}

/// Locations and scope used during resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Credential persistence file.
    pub token_path: PathBuf,
    /// Client-secret configuration file; its presence enables the interactive flow.
    pub client_secret_path: PathBuf,
    /// Service-account key file, normally taken from `GOOGLE_APPLICATION_CREDENTIALS`.
    #[serde(default)]
    pub service_account_key: Option<PathBuf>,
    /// Scope requested from every strategy.
    pub scope: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            client_secret_path: PathBuf::from(DEFAULT_CLIENT_SECRET_PATH),
            service_account_key: None,
            scope: DRIVE_READONLY_SCOPE.to_string(),
        }
    }
}

/// Decides which credential-acquisition strategy runs.
pub struct AuthStrategyResolver {
    settings: AuthSettings,
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    interactive: Arc<dyn InteractiveAuthorizer>,
    service_account: Arc<dyn ServiceAccountAuthorizer>,
}

impl AuthStrategyResolver {
    /// Create a resolver from its collaborators.
    pub fn new(
        settings: AuthSettings,
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        interactive: Arc<dyn InteractiveAuthorizer>,
        service_account: Arc<dyn ServiceAccountAuthorizer>,
    ) -> Self {
        Self {
            settings,
            store,
            refresher,
            interactive,
            service_account,
        }
    }

    /// Current settings.
    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Refresh and persist. The unrefreshed record is never written back.
    async fn refresh_and_persist(&self, record: &CredentialRecord) -> Result<CredentialRecord> {
        info!("Refreshing expired access token");

        let refreshed = self.refresher.refresh(record).await.map_err(|e| match e {
            Error::Authentication(msg) => Error::Authentication(msg),
            other => Error::Authentication(format!("Token refresh failed: {}", other)),
        })?;

        if refreshed.is_expired() {
            return Err(Error::Authentication(
                "Token refresh returned an already expired token".to_string(),
            ));
        }

        self.store.save(&refreshed).await?;
        Ok(refreshed)
    }

    /// Examine the stored record. `Ok(None)` means fall through to the
    /// acquisition strategies.
    async fn from_store(&self) -> Result<Option<CredentialRecord>> {
        let Some(record) = self.store.load().await? else {
            debug!("No stored credential");
            return Ok(None);
        };

        if !record.covers_scope(&self.settings.scope) {
            warn!(
                scope = %self.settings.scope,
                "Stored credential does not cover the required scope; re-authorizing"
            );
            return Ok(None);
        }

        match record.state() {
            CredentialState::Valid => {
                debug!(strategy = %record.strategy, "Using stored credential");
                Ok(Some(record))
            }
            CredentialState::ExpiredWithRefresh => {
                self.refresh_and_persist(&record).await.map(Some)
            }
            CredentialState::ExpiredNoRefresh | CredentialState::Unusable => {
                warn!("Stored credential is expired and cannot be refreshed; replacing it");
                Ok(None)
            }
        }
    }

    fn service_account_key(&self) -> Option<&Path> {
        self.settings
            .service_account_key
            .as_deref()
            .filter(|path| path.is_file())
    }
}

#[async_trait]
impl CredentialResolver for AuthStrategyResolver {
    async fn resolve(&self) -> Result<CredentialRecord> {
        if let Some(record) = self.from_store().await? {
            return Ok(record);
        }

        let client_secret = &self.settings.client_secret_path;
        if client_secret.is_file() {
            info!(path = %client_secret.display(), "Starting interactive authorization");
            let record = self
                .interactive
                .authorize(client_secret, &self.settings.scope)
                .await?;
            self.store.save(&record).await?;
            return Ok(record);
        }

        if let Some(key_path) = self.service_account_key() {
            info!(path = %key_path.display(), "Using service account credentials");
            return self
                .service_account
                .authorize(key_path, &self.settings.scope)
                .await;
        }

        Err(Error::Authentication(NO_CREDENTIALS.to_string()))
    }

    async fn renew(&self, current: &CredentialRecord) -> Result<CredentialRecord> {
        match current.strategy {
            AuthStrategy::InteractiveOAuth if current.is_refreshable() => {
                self.refresh_and_persist(current).await
            }
            AuthStrategy::InteractiveOAuth => Err(Error::Authentication(
                "Access token expired and cannot be refreshed; re-authorize with `drivemcp auth`"
                    .to_string(),
            )),
            AuthStrategy::ServiceAccount => {
                let key_path = self.service_account_key().ok_or_else(|| {
                    Error::Authentication(
                        "Service account key is no longer available".to_string(),
                    )
                })?;
                self.service_account
                    .authorize(key_path, &self.settings.scope)
                    .await
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod stubs {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records which strategy branches ran.
    #[derive(Default)]
    pub struct Calls {
        pub refresh: AtomicUsize,
        pub interactive: AtomicUsize,
        pub service_account: AtomicUsize,
    }

    impl Calls {
        pub fn get(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    pub struct StubRefresher {
        pub calls: Arc<Calls>,
        pub result: fn(&CredentialRecord) -> Result<CredentialRecord>,
    }

    #[async_trait]
    impl TokenRefresher for StubRefresher {
        async fn refresh(&self, record: &CredentialRecord) -> Result<CredentialRecord> {
            self.calls.refresh.fetch_add(1, Ordering::SeqCst);
            (self.result)(record)
        }
    }

    pub struct StubInteractive {
        pub calls: Arc<Calls>,
        pub record: Option<CredentialRecord>,
    }

    #[async_trait]
    impl InteractiveAuthorizer for StubInteractive {
        async fn authorize(&self, _path: &Path, _scope: &str) -> Result<CredentialRecord> {
            self.calls.interactive.fetch_add(1, Ordering::SeqCst);
            self.record
                .clone()
                .ok_or_else(|| Error::Authentication("consent denied".to_string()))
        }
    }

    pub struct StubServiceAccount {
        pub calls: Arc<Calls>,
        pub record: Option<CredentialRecord>,
    }

    #[async_trait]
    impl ServiceAccountAuthorizer for StubServiceAccount {
        async fn authorize(&self, _path: &Path, _scope: &str) -> Result<CredentialRecord> {
            self.calls.service_account.fetch_add(1, Ordering::SeqCst);
            self.record
                .clone()
                .ok_or_else(|| Error::Authentication("bad key".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stubs::*;
    use super::*;
    use crate::credential::fixtures::oauth_record;
    use crate::store::{FileCredentialStore, MemoryCredentialStore};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn refreshed_ok(record: &CredentialRecord) -> Result<CredentialRecord> {
        let mut renewed = record.clone();
        renewed.access_token = "refreshed".to_string();
        renewed.expires_at = Utc::now() + Duration::hours(1);
        Ok(renewed)
    }

    fn refresh_fails(_: &CredentialRecord) -> Result<CredentialRecord> {
        Err(Error::Authentication("invalid_grant".to_string()))
    }

    fn service_record() -> CredentialRecord {
        CredentialRecord {
            access_token: "sa-token".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + Duration::hours(1),
            scopes: vec![DRIVE_READONLY_SCOPE.to_string()],
            strategy: AuthStrategy::ServiceAccount,
            client: None,
        }
    }

    struct Harness {
        _dir: TempDir,
        settings: AuthSettings,
        calls: Arc<Calls>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let settings = AuthSettings {
                token_path: dir.path().join("token.json"),
                client_secret_path: dir.path().join("credentials.json"),
                service_account_key: None,
                scope: DRIVE_READONLY_SCOPE.to_string(),
            };
            Self {
                _dir: dir,
                settings,
                calls: Arc::new(Calls::default()),
            }
        }

        fn with_client_secret(self) -> Self {
            std::fs::write(&self.settings.client_secret_path, b"{}").unwrap();
            self
        }

        fn with_service_account_key(mut self) -> Self {
            let key = self.settings.token_path.with_file_name("sa.json");
            std::fs::write(&key, b"{}").unwrap();
            self.settings.service_account_key = Some(key);
            self
        }

        fn resolver(
            &self,
            store: Arc<dyn CredentialStore>,
            refresh: fn(&CredentialRecord) -> Result<CredentialRecord>,
        ) -> AuthStrategyResolver {
            AuthStrategyResolver::new(
                self.settings.clone(),
                store,
                Arc::new(StubRefresher {
                    calls: self.calls.clone(),
                    result: refresh,
                }),
                Arc::new(StubInteractive {
                    calls: self.calls.clone(),
                    record: Some(oauth_record(Duration::hours(1), Some("fresh-refresh"))),
                }),
                Arc::new(StubServiceAccount {
                    calls: self.calls.clone(),
                    record: Some(service_record()),
                }),
            )
        }
    }

    #[tokio::test]
    async fn test_valid_cached_credential_short_circuits() {
        let harness = Harness::new().with_client_secret().with_service_account_key();
        let store = Arc::new(MemoryCredentialStore::with_record(oauth_record(
            Duration::hours(1),
            Some("refresh"),
        )));
        let resolver = harness.resolver(store.clone(), refreshed_ok);

        let record = resolver.resolve().await.unwrap();

        assert_eq!(record.access_token, "access");
        assert_eq!(Calls::get(&harness.calls.refresh), 0);
        assert_eq!(Calls::get(&harness.calls.interactive), 0);
        assert_eq!(Calls::get(&harness.calls.service_account), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_credential_is_refreshed_and_persisted() {
        let harness = Harness::new();
        let store = Arc::new(MemoryCredentialStore::with_record(oauth_record(
            Duration::hours(-1),
            Some("refresh"),
        )));
        let resolver = harness.resolver(store.clone(), refreshed_ok);

        let record = resolver.resolve().await.unwrap();

        assert_eq!(record.access_token, "refreshed");
        assert_eq!(store.save_count(), 1);
        let persisted = store.current().unwrap();
        assert_eq!(persisted.access_token, "refreshed");
        assert!(persisted.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_blank_access_token_is_refreshed() {
        let harness = Harness::new();
        let mut stored = oauth_record(Duration::hours(1), Some("refresh"));
        stored.access_token.clear();
        let store = Arc::new(MemoryCredentialStore::with_record(stored));
        let resolver = harness.resolver(store.clone(), refreshed_ok);

        let record = resolver.resolve().await.unwrap();

        assert_eq!(record.access_token, "refreshed");
        assert_eq!(Calls::get(&harness.calls.refresh), 1);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_terminal_and_not_persisted() {
        let harness = Harness::new().with_client_secret().with_service_account_key();
        let store = Arc::new(MemoryCredentialStore::with_record(oauth_record(
            Duration::hours(-1),
            Some("refresh"),
        )));
        let resolver = harness.resolver(store.clone(), refresh_fails);

        let result = resolver.resolve().await;

        assert!(matches!(result, Err(Error::Authentication(_))));
        assert_eq!(store.save_count(), 0);
        assert_eq!(Calls::get(&harness.calls.interactive), 0);
        assert_eq!(Calls::get(&harness.calls.service_account), 0);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_is_replaced_interactively() {
        let harness = Harness::new().with_client_secret();
        let store = Arc::new(MemoryCredentialStore::with_record(oauth_record(
            Duration::hours(-1),
            None,
        )));
        let resolver = harness.resolver(store.clone(), refreshed_ok);

        let record = resolver.resolve().await.unwrap();

        assert_eq!(record.refresh_token.as_deref(), Some("fresh-refresh"));
        assert_eq!(Calls::get(&harness.calls.refresh), 0);
        assert_eq!(Calls::get(&harness.calls.interactive), 1);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_scope_mismatch_forces_reauthorization() {
        let harness = Harness::new().with_client_secret();
        let mut stale = oauth_record(Duration::hours(1), Some("refresh"));
        stale.scopes = vec!["https://www.googleapis.com/auth/drive.metadata".to_string()];
        let store = Arc::new(MemoryCredentialStore::with_record(stale));
        let resolver = harness.resolver(store.clone(), refreshed_ok);

        resolver.resolve().await.unwrap();

        assert_eq!(Calls::get(&harness.calls.interactive), 1);
    }

    #[tokio::test]
    async fn test_interactive_takes_precedence_over_service_account() {
        let harness = Harness::new().with_client_secret().with_service_account_key();
        let store = Arc::new(MemoryCredentialStore::new());
        let resolver = harness.resolver(store.clone(), refreshed_ok);

        let record = resolver.resolve().await.unwrap();

        assert_eq!(record.strategy, AuthStrategy::InteractiveOAuth);
        assert_eq!(Calls::get(&harness.calls.interactive), 1);
        assert_eq!(Calls::get(&harness.calls.service_account), 0);
    }

    #[tokio::test]
    async fn test_service_account_is_not_persisted() {
        let harness = Harness::new().with_service_account_key();
        let store = Arc::new(MemoryCredentialStore::new());
        let resolver = harness.resolver(store.clone(), refreshed_ok);

        let record = resolver.resolve().await.unwrap();

        assert_eq!(record.strategy, AuthStrategy::ServiceAccount);
        assert_eq!(Calls::get(&harness.calls.service_account), 1);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_service_account_file_is_skipped() {
        let mut harness = Harness::new();
        let missing = harness.settings.token_path.with_file_name("missing.json");
        harness.settings.service_account_key = Some(missing);
        let resolver = harness.resolver(Arc::new(MemoryCredentialStore::new()), refreshed_ok);

        let result = resolver.resolve().await;

        assert!(matches!(result, Err(Error::Authentication(ref msg)) if msg == NO_CREDENTIALS));
        assert_eq!(Calls::get(&harness.calls.service_account), 0);
    }

    #[tokio::test]
    async fn test_no_sources_fails_with_no_valid_credentials() {
        let harness = Harness::new();
        let store = Arc::new(FileCredentialStore::new(&harness.settings.token_path));
        let resolver = harness.resolver(store, refreshed_ok);

        let err = resolver.resolve().await.unwrap_err();

        assert!(matches!(err, Error::Authentication(ref msg) if msg == NO_CREDENTIALS));
        assert!(!harness.settings.token_path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_store_is_storage_error() {
        let harness = Harness::new().with_client_secret();
        std::fs::write(&harness.settings.token_path, b"{broken").unwrap();
        let store = Arc::new(FileCredentialStore::new(&harness.settings.token_path));
        let resolver = harness.resolver(store, refreshed_ok);

        let result = resolver.resolve().await;

        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(Calls::get(&harness.calls.interactive), 0);
    }

    #[tokio::test]
    async fn test_interactive_failure_is_not_persisted() {
        let harness = Harness::new().with_client_secret();
        let store = Arc::new(MemoryCredentialStore::new());
        let resolver = AuthStrategyResolver::new(
            harness.settings.clone(),
            store.clone(),
            Arc::new(StubRefresher {
                calls: harness.calls.clone(),
                result: refreshed_ok,
            }),
            Arc::new(StubInteractive {
                calls: harness.calls.clone(),
                record: None,
            }),
            Arc::new(StubServiceAccount {
                calls: harness.calls.clone(),
                record: Some(service_record()),
            }),
        );

        let result = resolver.resolve().await;

        assert!(matches!(result, Err(Error::Authentication(_))));
        assert_eq!(store.save_count(), 0);
        // Interactive failure does not fall through to the service account
        assert_eq!(Calls::get(&harness.calls.service_account), 0);
    }

    #[tokio::test]
    async fn test_renew_refreshes_oauth_record() {
        let harness = Harness::new();
        let store = Arc::new(MemoryCredentialStore::new());
        let resolver = harness.resolver(store.clone(), refreshed_ok);

        let renewed = resolver
            .renew(&oauth_record(Duration::hours(-1), Some("refresh")))
            .await
            .unwrap();

        assert_eq!(renewed.access_token, "refreshed");
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_renew_reissues_service_account_token() {
        let harness = Harness::new().with_service_account_key();
        let store = Arc::new(MemoryCredentialStore::new());
        let resolver = harness.resolver(store.clone(), refreshed_ok);

        let mut expired = service_record();
        expired.expires_at = Utc::now() - Duration::hours(1);
        let renewed = resolver.renew(&expired).await.unwrap();

        assert_eq!(renewed.access_token, "sa-token");
        assert_eq!(Calls::get(&harness.calls.service_account), 1);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_renew_without_refresh_token_fails() {
        let harness = Harness::new();
        let resolver = harness.resolver(Arc::new(MemoryCredentialStore::new()), refreshed_ok);

        let result = resolver.renew(&oauth_record(Duration::hours(-1), None)).await;

        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = AuthSettings::default();
        assert_eq!(settings.token_path, PathBuf::from("token.json"));
        assert_eq!(settings.client_secret_path, PathBuf::from("credentials.json"));
        assert!(settings.service_account_key.is_none());
        assert_eq!(settings.scope, DRIVE_READONLY_SCOPE);
    }
}
