//! OAuth2 client plumbing for the installed-app flow and token refresh.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use std::path::Path;

use drivemcp_common::{Error, Result};

use crate::credential::{AuthStrategy, ClientRegistration, CredentialRecord, GOOGLE_TOKEN_URL};
use crate::resolver::TokenRefresher;

/// Default OAuth2 authorization endpoint.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Client registration file as downloaded from the Google Cloud console.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    #[serde(default)]
    installed: Option<ClientSecretEntry>,
    #[serde(default)]
    web: Option<ClientSecretEntry>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretEntry {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

/// OAuth client registration read from the client-secret file.
#[derive(Clone)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

impl std::fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ClientSecrets {
    /// Parse a client-secret document.
    ///
    /// Accepts both the `installed` (desktop) and `web` layouts; `installed`
    /// wins when both are present.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretFile = serde_json::from_str(json)
            .map_err(|e| Error::Serialization(format!("Invalid client secret file: {}", e)))?;

        let entry = file.installed.or(file.web).ok_or_else(|| {
            Error::InvalidInput(
                "Client secret file has neither an 'installed' nor a 'web' section".to_string(),
            )
        })?;

        Ok(Self {
            client_id: entry.client_id,
            client_secret: entry.client_secret,
            auth_uri: entry.auth_uri.unwrap_or_else(|| GOOGLE_AUTH_URL.to_string()),
            token_uri: entry
                .token_uri
                .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
        })
    }

    /// Read and parse a client-secret file.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// Registration data kept with the credential for later refreshes.
    pub fn registration(&self) -> ClientRegistration {
        ClientRegistration {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            token_uri: self.token_uri.clone(),
        }
    }
}

/// Authorization request awaiting the user's consent.
pub struct PendingAuthorization {
    /// URL the user must visit.
    pub url: String,
    csrf_state: String,
    pkce_verifier: PkceCodeVerifier,
    redirect_url: String,
    scope: String,
}

impl PendingAuthorization {
    /// Anti-forgery state the callback must echo back.
    pub fn csrf_state(&self) -> &str {
        &self.csrf_state
    }
}

fn parse_url<T>(
    kind: &str,
    raw: &str,
    ctor: impl FnOnce(String) -> std::result::Result<T, url::ParseError>,
) -> Result<T> {
    ctor(raw.to_string())
        .map_err(|e| Error::InvalidInput(format!("Invalid {} URL: {}", kind, e)))
}

/// OAuth2 client for Google endpoints.
pub struct OAuthClient {
    http: oauth2::reqwest::Client,
}

impl OAuthClient {
    /// Create a new OAuth client.
    pub fn new() -> Result<Self> {
        let http = oauth2::reqwest::Client::builder()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    /// Generate the authorization URL for the user to visit.
    ///
    /// Requests offline access so the response carries a refresh token, and
    /// binds the request to a PKCE verifier.
    pub fn authorization_url(
        &self,
        secrets: &ClientSecrets,
        redirect_url: &str,
        scope: &str,
    ) -> Result<PendingAuthorization> {
        let client = BasicClient::new(ClientId::new(secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(secrets.client_secret.clone()))
            .set_auth_uri(parse_url("auth", &secrets.auth_uri, AuthUrl::new)?)
            .set_redirect_uri(parse_url("redirect", redirect_url, RedirectUrl::new)?);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(scope.to_string()))
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        Ok(PendingAuthorization {
            url: auth_url.to_string(),
            csrf_state: csrf_token.secret().clone(),
            pkce_verifier,
            redirect_url: redirect_url.to_string(),
            scope: scope.to_string(),
        })
    }

    /// Exchange an authorization code for a credential.
    ///
    /// # Preconditions
    /// - `code` came from the callback of `pending`
    ///
    /// # Errors
    /// - Invalid authorization code
    /// - No refresh token in the response
    /// - Network errors
    pub async fn exchange_code(
        &self,
        secrets: &ClientSecrets,
        pending: PendingAuthorization,
        code: &str,
    ) -> Result<CredentialRecord> {
        let client = BasicClient::new(ClientId::new(secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(secrets.client_secret.clone()))
            .set_token_uri(parse_url("token", &secrets.token_uri, TokenUrl::new)?)
            .set_redirect_uri(parse_url("redirect", &pending.redirect_url, RedirectUrl::new)?);

        let token_result = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(pending.pkce_verifier)
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token exchange failed: {}", e)))?;

        let refresh_token = token_result
            .refresh_token()
            .ok_or_else(|| {
                Error::Authentication("No refresh token received. Ensure 'offline' access and 'consent' prompt were requested.".to_string())
            })?
            .secret()
            .clone();

        Ok(CredentialRecord {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: Some(refresh_token),
            expires_at: expiry_from(token_result.expires_in()),
            scopes: granted_scopes(token_result.scopes(), &pending.scope),
            strategy: AuthStrategy::InteractiveOAuth,
            client: Some(secrets.registration()),
        })
    }

    /// Refresh an access token using the record's refresh token.
    ///
    /// # Postconditions
    /// - Returns a record with a new access token and a future expiry
    /// - Keeps the old refresh token when the endpoint does not rotate it
    ///
    /// # Errors
    /// - Record has no refresh token or client registration
    /// - Invalid or revoked refresh token
    /// - Network errors
    pub async fn refresh(&self, record: &CredentialRecord) -> Result<CredentialRecord> {
        let refresh_token = record
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Authentication("Credential has no refresh token".to_string()))?;
        let registration = record.client.as_ref().ok_or_else(|| {
            Error::Authentication("Credential has no client registration to refresh against".to_string())
        })?;

        let client = BasicClient::new(ClientId::new(registration.client_id.clone()))
            .set_client_secret(ClientSecret::new(registration.client_secret.clone()))
            .set_token_uri(parse_url("token", &registration.token_uri, TokenUrl::new)?);

        let token_result = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token refresh failed: {}", e)))?;

        // Refresh tokens may or may not be returned in refresh response
        let new_refresh_token = token_result
            .refresh_token()
            .map(|t| t.secret().clone())
            .unwrap_or_else(|| refresh_token.to_string());

        let scopes = match token_result.scopes() {
            Some(scopes) => scopes.iter().map(|s| s.as_str().to_owned()).collect(),
            None => record.scopes.clone(),
        };

        Ok(CredentialRecord {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: Some(new_refresh_token),
            expires_at: expiry_from(token_result.expires_in()),
            scopes,
            strategy: record.strategy,
            client: record.client.clone(),
        })
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    async fn refresh(&self, record: &CredentialRecord) -> Result<CredentialRecord> {
        OAuthClient::refresh(self, record).await
    }
}

pub(crate) fn expiry_from(expires_in: Option<std::time::Duration>) -> chrono::DateTime<Utc> {
    let expires_in =
        expires_in.unwrap_or_else(|| std::time::Duration::from_secs(DEFAULT_TOKEN_LIFETIME_SECS));
    Utc::now() + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1))
}

fn granted_scopes(scopes: Option<&Vec<Scope>>, requested: &str) -> Vec<String> {
    match scopes {
        Some(scopes) if !scopes.is_empty() => scopes.iter().map(|s| s.as_str().to_owned()).collect(),
        _ => vec![requested.to_string()],
    }
}
