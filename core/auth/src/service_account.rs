//! Service-account credentials via the OAuth2 JWT bearer grant.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use drivemcp_common::{Error, Result};

use crate::credential::{AuthStrategy, CredentialRecord, GOOGLE_TOKEN_URL};
use crate::oauth::expiry_from;
use crate::resolver::ServiceAccountAuthorizer;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion lifetime; Google rejects anything above one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Service-account key file contents. Zeroized on drop.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    key_type: Option<String>,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Parse a key document.
    ///
    /// # Errors
    /// - Malformed JSON
    /// - Document is a different credential type
    pub fn from_json(json: &str) -> Result<Self> {
        let key: Self = serde_json::from_str(json)
            .map_err(|e| Error::Serialization(format!("Invalid service account key: {}", e)))?;

        match key.key_type.as_deref() {
            None | Some("service_account") => Ok(key),
            Some(other) => Err(Error::InvalidInput(format!(
                "Expected a service_account key, found '{}'",
                other
            ))),
        }
    }

    /// Read and parse a key file.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Sign the JWT assertion for the bearer grant.
pub fn signed_assertion(key: &ServiceAccountKey, scope: &str) -> Result<String> {
    let iat = Utc::now().timestamp();
    let claims = Claims {
        iss: &key.client_email,
        scope,
        aud: &key.token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    };

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| Error::Authentication(format!("Invalid service account private key: {}", e)))?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    encode(&header, &claims, &encoding_key)
        .map_err(|e| Error::Authentication(format!("Failed to sign assertion: {}", e)))
}

/// Non-interactive service-account grant.
pub struct ServiceAccountFlow {
    http: reqwest::Client,
}

impl ServiceAccountFlow {
    /// Create a new flow.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("DriveMCP/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Exchange a signed assertion for an access token.
    ///
    /// # Errors
    /// - Invalid private key
    /// - Token endpoint rejected the assertion
    /// - Network errors
    pub async fn exchange(&self, key: &ServiceAccountKey, scope: &str) -> Result<CredentialRecord> {
        let assertion = signed_assertion(key, scope)?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::Authentication(format!("Service account token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Authentication(format!(
                "Service account token request rejected: {} - {}",
                status, body
            )));
        }

        let grant: TokenGrant = response.json().await.map_err(|e| {
            Error::Authentication(format!("Failed to parse token response: {}", e))
        })?;

        debug!(client_email = %key.client_email, "Issued service account token");

        Ok(CredentialRecord {
            access_token: grant.access_token,
            refresh_token: None,
            expires_at: expiry_from(grant.expires_in.map(std::time::Duration::from_secs)),
            scopes: vec![scope.to_string()],
            strategy: AuthStrategy::ServiceAccount,
            client: None,
        })
    }
}

#[async_trait]
impl ServiceAccountAuthorizer for ServiceAccountFlow {
    async fn authorize(&self, key_path: &Path, scope: &str) -> Result<CredentialRecord> {
        let key = ServiceAccountKey::from_file(key_path).await.map_err(|e| {
            Error::Authentication(format!(
                "Cannot use service account key {}: {}",
                key_path.display(),
                e
            ))
        })?;
        self.exchange(&key, scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::DRIVE_READONLY_SCOPE;
    use jsonwebtoken::{decode_header, DecodingKey, Validation};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_KEY_PEM: &str = include_str!("../testdata/service_account_test_key.pem");

    fn key_json(token_uri: &str) -> String {
        serde_json::json!({
            "type": "service_account",
            "project_id": "demo",
            "private_key_id": "kid-1",
            "private_key": TEST_KEY_PEM,
            "client_email": "reader@demo.iam.gserviceaccount.com",
            "token_uri": token_uri,
        })
        .to_string()
    }

    #[test]
    fn test_parse_key() {
        let key = ServiceAccountKey::from_json(&key_json(GOOGLE_TOKEN_URL)).unwrap();
        assert_eq!(key.client_email, "reader@demo.iam.gserviceaccount.com");
        assert_eq!(key.token_uri, GOOGLE_TOKEN_URL);
        assert!(!format!("{:?}", key).contains("PRIVATE KEY"));
    }

    #[test]
    fn test_parse_rejects_other_credential_types() {
        let json = r#"{"type": "authorized_user", "client_email": "x", "private_key": "y"}"#;
        assert!(matches!(
            ServiceAccountKey::from_json(json),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_signed_assertion_claims() {
        let key = ServiceAccountKey::from_json(&key_json(GOOGLE_TOKEN_URL)).unwrap();
        let jwt = signed_assertion(&key, DRIVE_READONLY_SCOPE).unwrap();

        let header = decode_header(&jwt).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("kid-1"));

        // Payload is inspectable without verifying the signature
        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.set_audience(&[GOOGLE_TOKEN_URL]);
        let data = jsonwebtoken::decode::<serde_json::Value>(
            &jwt,
            &DecodingKey::from_secret(b"unused"),
            &validation,
        )
        .unwrap();
        assert_eq!(data.claims["iss"], "reader@demo.iam.gserviceaccount.com");
        assert_eq!(data.claims["scope"], DRIVE_READONLY_SCOPE);
    }

    #[test]
    fn test_signed_assertion_with_invalid_key() {
        let json = r#"{"client_email": "x", "private_key": "not-a-valid-key"}"#;
        let key = ServiceAccountKey::from_json(json).unwrap();
        assert!(matches!(
            signed_assertion(&key, DRIVE_READONLY_SCOPE),
            Err(Error::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "sa-access",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let key_path = dir.path().join("sa.json");
        std::fs::write(&key_path, key_json(&format!("{}/token", server.uri()))).unwrap();

        let flow = ServiceAccountFlow::new().unwrap();
        let record = flow.authorize(&key_path, DRIVE_READONLY_SCOPE).await.unwrap();

        assert_eq!(record.access_token, "sa-access");
        assert_eq!(record.strategy, AuthStrategy::ServiceAccount);
        assert!(record.refresh_token.is_none());
        assert!(!record.is_expired());
    }

    #[tokio::test]
    async fn test_exchange_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let key = ServiceAccountKey::from_json(&key_json(&format!("{}/token", server.uri()))).unwrap();
        let flow = ServiceAccountFlow::new().unwrap();

        let err = flow.exchange(&key, DRIVE_READONLY_SCOPE).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_missing_key_file() {
        let flow = ServiceAccountFlow::new().unwrap();
        let result = flow
            .authorize(Path::new("/nonexistent/sa.json"), DRIVE_READONLY_SCOPE)
            .await;
        assert!(matches!(result, Err(Error::Authentication(_))));
    }
}
