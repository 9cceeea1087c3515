//! Credential records and their validity rules.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Read-only Google Drive scope requested by every strategy.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Default OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_MARGIN_MINUTES: i64 = 5;

/// Strategy that issued a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStrategy {
    /// Installed-app OAuth flow with user consent.
    InteractiveOAuth,
    /// Non-interactive service-account JWT grant.
    ServiceAccount,
}

impl fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStrategy::InteractiveOAuth => write!(f, "interactive OAuth"),
            AuthStrategy::ServiceAccount => write!(f, "service account"),
        }
    }
}

/// OAuth client registration needed to refresh a token later.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// Persisted access credential with its validity window.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Bearer token for API requests.
    pub access_token: String,
    /// Token used to obtain a new access token, if the strategy issues one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
    /// Scopes granted to the access token.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Strategy that produced this record.
    pub strategy: AuthStrategy,
    /// Client registration used for refreshes (interactive OAuth only).
    #[serde(default)]
    pub client: Option<ClientRegistration>,
}

impl CredentialRecord {
    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now() + Duration::minutes(EXPIRY_MARGIN_MINUTES)
    }

    /// Whether an expired token can be renewed without user interaction.
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
            && self.client.is_some()
    }

    /// Whether the granted scopes include `scope`.
    pub fn covers_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|granted| granted == scope)
    }

    /// Where this record sits in the credential lifecycle.
    pub fn state(&self) -> CredentialState {
        if self.access_token.is_empty() && !self.is_refreshable() {
            CredentialState::Unusable
        } else if !self.access_token.is_empty() && !self.is_expired() {
            CredentialState::Valid
        } else if self.is_refreshable() {
            CredentialState::ExpiredWithRefresh
        } else {
            CredentialState::ExpiredNoRefresh
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("strategy", &self.strategy)
            .field("client", &self.client)
            .finish()
    }
}

/// Lifecycle state of a stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Access token is live.
    Valid,
    /// Access token expired; a refresh can renew it.
    ExpiredWithRefresh,
    /// Access token expired and cannot be renewed.
    ExpiredNoRefresh,
    /// Record carries no usable token at all.
    Unusable,
}
