//! Installed-app authorization with a loopback redirect listener.

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use drivemcp_common::{Error, Result};

use crate::credential::CredentialRecord;
use crate::oauth::{ClientSecrets, OAuthClient};
use crate::resolver::InteractiveAuthorizer;

const SUCCESS_PAGE: &str = "<html><body><h3>Authorization complete.</h3>\
<p>You may close this window and return to the application.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body><h3>Authorization failed.</h3>\
<p>Return to the application for details.</p></body></html>";

/// Query parameters of a request hitting the redirect URI.
#[derive(Debug, Default, Deserialize)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Outcome carried by a redirect request.
#[derive(Debug, PartialEq, Eq)]
enum Callback {
    /// Authorization code and echoed state.
    Code { code: String, state: Option<String> },
    /// The provider reported an error (e.g. the user declined).
    Denied(String),
    /// Request without a code or error.
    Ignored,
}

impl From<RedirectParams> for Callback {
    fn from(params: RedirectParams) -> Self {
        match (params.code, params.error) {
            (_, Some(error)) => Callback::Denied(error),
            (Some(code), None) => Callback::Code {
                code,
                state: params.state,
            },
            (None, None) => Callback::Ignored,
        }
    }
}

struct RedirectState {
    expected_state: String,
    outcome: Mutex<Option<oneshot::Sender<Result<String>>>>,
}

impl RedirectState {
    /// Hand the first decisive outcome to the waiting flow.
    async fn settle(&self, outcome: Result<String>) {
        if let Some(sender) = self.outcome.lock().await.take() {
            let _ = sender.send(outcome);
        }
    }
}

async fn receive_redirect(
    State(state): State<Arc<RedirectState>>,
    Query(params): Query<RedirectParams>,
) -> (StatusCode, Html<&'static str>) {
    match Callback::from(params) {
        Callback::Ignored => (StatusCode::NOT_FOUND, Html("")),
        Callback::Denied(error) => {
            state
                .settle(Err(Error::Authentication(format!(
                    "Authorization denied: {}",
                    error
                ))))
                .await;
            (StatusCode::OK, Html(FAILURE_PAGE))
        }
        Callback::Code { code, state: echoed } => {
            if echoed.as_deref() != Some(state.expected_state.as_str()) {
                state
                    .settle(Err(Error::Authentication(
                        "Authorization state mismatch; possible CSRF attempt".to_string(),
                    )))
                    .await;
                return (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE));
            }
            debug!("Received authorization code");
            state.settle(Ok(code)).await;
            (StatusCode::OK, Html(SUCCESS_PAGE))
        }
    }
}

/// HTTP listener on an ephemeral loopback port that receives the OAuth
/// redirect.
pub struct LoopbackListener {
    listener: TcpListener,
    port: u16,
}

impl LoopbackListener {
    /// Bind to `127.0.0.1` on a port chosen by the OS.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        debug!(port, "Bound OAuth redirect listener");
        Ok(Self { listener, port })
    }

    /// Redirect URI to register in the authorization request.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    /// Port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve the redirect URI until it delivers a code, then shut down.
    ///
    /// # Errors
    /// - The user declined, or the provider returned an error
    /// - The echoed state does not match `expected_state`
    /// - The listener stopped before a redirect arrived
    pub async fn wait_for_code(self, expected_state: &str) -> Result<String> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(RedirectState {
            expected_state: expected_state.to_string(),
            outcome: Mutex::new(Some(outcome_tx)),
        });
        let app = Router::new()
            .route("/", get(receive_redirect))
            .with_state(state);

        let server = axum::serve(self.listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let mut server = tokio::spawn(async move { server.await });

        let outcome = tokio::select! {
            outcome = outcome_rx => outcome.unwrap_or_else(|_| {
                Err(Error::Authentication(
                    "Redirect listener closed before authorization completed".to_string(),
                ))
            }),
            served = &mut server => {
                let reason = match served {
                    Ok(Ok(())) => "listener stopped".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => e.to_string(),
                };
                return Err(Error::Authentication(format!(
                    "Redirect listener failed: {}",
                    reason
                )));
            }
        };

        let _ = shutdown_tx.send(());
        outcome
    }
}

/// Interactive installed-app OAuth flow.
///
/// Prints the consent URL to stderr, optionally opens the browser, and
/// blocks until the redirect reaches the loopback listener.
pub struct InstalledAppFlow {
    oauth: Arc<OAuthClient>,
    open_browser: bool,
}

impl InstalledAppFlow {
    /// Create a new flow.
    pub fn new(oauth: Arc<OAuthClient>, open_browser: bool) -> Self {
        Self {
            oauth,
            open_browser,
        }
    }
}

#[async_trait]
impl InteractiveAuthorizer for InstalledAppFlow {
    async fn authorize(&self, client_secret_path: &Path, scope: &str) -> Result<CredentialRecord> {
        let secrets = ClientSecrets::from_file(client_secret_path)
            .await
            .map_err(|e| {
                Error::Authentication(format!(
                    "Cannot use client secret file {}: {}",
                    client_secret_path.display(),
                    e
                ))
            })?;

        let listener = LoopbackListener::bind().await?;
        let pending = self
            .oauth
            .authorization_url(&secrets, &listener.redirect_uri(), scope)?;

        eprintln!(
            "Please visit this URL to authorize this application:\n{}",
            pending.url
        );
        if self.open_browser {
            if let Err(e) = open::that(&pending.url) {
                warn!("Failed to open browser: {}", e);
            }
        }

        info!(port = listener.port(), "Waiting for authorization redirect");
        let code = listener.wait_for_code(pending.csrf_state()).await?;

        let record = self.oauth.exchange_code(&secrets, pending, &code).await?;
        info!("Interactive authorization complete");
        Ok(record)
    }
}
