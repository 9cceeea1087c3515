//! Command-line and environment configuration.

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use drivemcp_auth::resolver::{DEFAULT_CLIENT_SECRET_PATH, DEFAULT_TOKEN_PATH, SERVICE_ACCOUNT_ENV};
use drivemcp_auth::{
    AuthSettings, AuthStrategyResolver, FileCredentialStore, InstalledAppFlow, OAuthClient,
    ServiceAccountFlow, DRIVE_READONLY_SCOPE,
};
use drivemcp_common::Result;
use drivemcp_drive::client::DRIVE_API_BASE;
use drivemcp_drive::download::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD_BYTES};
use drivemcp_drive::DriveConfig;

/// Credential locations.
#[derive(Debug, Clone, Args)]
pub struct AuthArgs {
    /// Credential persistence file.
    #[arg(long, env = "DRIVEMCP_TOKEN_PATH", default_value = DEFAULT_TOKEN_PATH)]
    pub token_path: PathBuf,

    /// OAuth client-secret file; enables the interactive flow when present.
    #[arg(long, env = "DRIVEMCP_CLIENT_SECRET_PATH", default_value = DEFAULT_CLIENT_SECRET_PATH)]
    pub client_secret_path: PathBuf,

    /// Service-account key file.
    #[arg(long, env = SERVICE_ACCOUNT_ENV)]
    pub service_account_key: Option<PathBuf>,

    /// OAuth scope to request.
    #[arg(long, default_value = DRIVE_READONLY_SCOPE)]
    pub scope: String,

    /// Print the consent URL without launching a browser.
    #[arg(long)]
    pub no_browser: bool,
}

impl AuthArgs {
    /// Resolution settings.
    pub fn settings(&self) -> AuthSettings {
        AuthSettings {
            token_path: self.token_path.clone(),
            client_secret_path: self.client_secret_path.clone(),
            service_account_key: self.service_account_key.clone(),
            scope: self.scope.clone(),
        }
    }

    /// Production resolver: token file, installed-app flow, service account.
    pub fn resolver(&self) -> Result<AuthStrategyResolver> {
        let settings = self.settings();
        let oauth = Arc::new(OAuthClient::new()?);

        Ok(AuthStrategyResolver::new(
            settings.clone(),
            Arc::new(FileCredentialStore::new(settings.token_path)),
            oauth.clone(),
            Arc::new(InstalledAppFlow::new(oauth, !self.no_browser)),
            Arc::new(ServiceAccountFlow::new()?),
        ))
    }
}

/// Drive API and transfer settings.
#[derive(Debug, Clone, Args)]
pub struct DriveArgs {
    /// Drive v3 API base URL.
    #[arg(long, env = "DRIVEMCP_API_BASE", default_value = DRIVE_API_BASE)]
    pub api_base: String,

    /// Bytes per ranged download request.
    #[arg(long, env = "DRIVEMCP_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Largest file content held in memory.
    #[arg(long, env = "DRIVEMCP_MAX_PAYLOAD_BYTES", default_value_t = DEFAULT_MAX_PAYLOAD_BYTES)]
    pub max_payload_bytes: usize,
}

impl DriveArgs {
    /// Drive configuration.
    pub fn config(&self) -> DriveConfig {
        DriveConfig {
            api_base: self.api_base.clone(),
            chunk_size: self.chunk_size,
            max_payload_bytes: self.max_payload_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        auth: AuthArgs,
        #[command(flatten)]
        drive: DriveArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::try_parse_from(["drivemcp"]).unwrap();
        let settings = cli.auth.settings();
        let defaults = AuthSettings::default();

        assert_eq!(settings.client_secret_path, defaults.client_secret_path);
        assert_eq!(settings.scope, DRIVE_READONLY_SCOPE);
        assert_eq!(cli.drive.config(), DriveConfig::default());
    }

    #[test]
    fn test_overrides() {
        let cli = TestCli::try_parse_from([
            "drivemcp",
            "--token-path",
            "/tmp/t.json",
            "--service-account-key",
            "/tmp/sa.json",
            "--chunk-size",
            "1024",
            "--no-browser",
        ])
        .unwrap();

        let settings = cli.auth.settings();
        assert_eq!(settings.token_path, PathBuf::from("/tmp/t.json"));
        assert_eq!(settings.service_account_key, Some(PathBuf::from("/tmp/sa.json")));
        assert!(cli.auth.no_browser);
        assert_eq!(cli.drive.config().chunk_size, 1024);
    }

    #[test]
    fn test_resolver_construction() {
        let cli = TestCli::try_parse_from(["drivemcp", "--token-path", "/tmp/t.json"]).unwrap();
        let resolver = cli.auth.resolver().unwrap();
        assert_eq!(resolver.settings().token_path, PathBuf::from("/tmp/t.json"));
    }
}
