//! Local callback receiver for interactive authorization
//!
//! A CLI has no public endpoint for the provider to redirect to, so each
//! interactive session binds a throwaway HTTP listener on an OS-assigned
//! loopback port and advertises `http://localhost:<port>` as the redirect
//! URI. The first request that reaches the listener decides the outcome:
//!
//! - `?code=...&state=<session state>` → code signaled, success page served
//! - provider `error`, missing `code` or wrong `state` → error signaled
//!
//! The outcome travels over one single-shot, buffered channel that the
//! waiting side bounds with a timer. Later requests (favicon fetches,
//! reloads) never block and never replace the first outcome.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::{CALLBACK_SHUTDOWN_GRACE, SUCCESS_PAGE};
use crate::error::{Error, Result};
use crate::identity::ClientIdentity;
use crate::pkce::{compute_challenge, generate_verifier};
use crate::token::{self, TokenRecord};

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Shared handler state: the expected anti-forgery token and the single-shot
/// outcome sender. The first request to classify takes the sender.
#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    outcome_tx: Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>,
}

impl CallbackState {
    fn classify(&self, params: CallbackParams) -> Result<String> {
        if let Some(error) = params.error {
            let detail = params
                .error_description
                .map(|d| format!(": {d}"))
                .unwrap_or_default();
            return Err(Error::InteractiveDenied(format!(
                "provider returned {error}{detail}"
            )));
        }

        let code = match params.code {
            Some(code) if !code.is_empty() => code,
            _ => return Err(Error::InteractiveDenied("no code in callback".into())),
        };

        if params.state.as_deref() != Some(&*self.expected_state) {
            return Err(Error::InteractiveDenied("state mismatch in callback".into()));
        }

        Ok(code)
    }

    /// Deliver the outcome unless an earlier request already did.
    fn signal(&self, outcome: Result<String>) {
        let sender = self.outcome_tx.lock().ok().and_then(|mut slot| slot.take());
        match sender {
            Some(tx) => {
                // The receiver may already be gone after a timeout
                let _ = tx.send(outcome);
            }
            None => debug!(
                accepted = outcome.is_ok(),
                "callback outcome already delivered, ignoring"
            ),
        }
    }
}

/// Single fallback handler: every path is treated as the redirect target.
async fn handle_callback(
    State(state): State<CallbackState>,
    query: std::result::Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    let outcome = match query {
        Ok(Query(params)) => state.classify(params),
        Err(rejection) => Err(Error::InteractiveDenied(format!(
            "malformed callback query: {rejection}"
        ))),
    };

    let response = match &outcome {
        Ok(_) => {
            info!("authorization code received");
            (StatusCode::OK, Html(SUCCESS_PAGE)).into_response()
        }
        Err(error) => {
            warn!(error = %error, "authorization callback rejected");
            (StatusCode::BAD_REQUEST, format!("Authentication failed: {error}")).into_response()
        }
    };
    state.signal(outcome);
    response
}

fn callback_router(state: CallbackState) -> Router {
    Router::new().fallback(handle_callback).with_state(state)
}

/// Running callback server. Stopped explicitly via `shutdown` or, as a
/// fallback, aborted on drop.
struct CallbackServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    fn start(listener: TcpListener, app: Router) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "callback server error");
            }
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stop accepting, let an in-flight response finish within the grace
    /// period, then force the task down. The listener is closed on return.
    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(CALLBACK_SHUTDOWN_GRACE, &mut handle)
                .await
                .is_err()
            {
                warn!("callback server did not drain in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
        debug!("callback listener closed");
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// One interactive authorization attempt bound to an ephemeral port.
pub struct AuthorizationSession {
    state: String,
    verifier: String,
    port: u16,
    redirect_uri: String,
    authorization_url: String,
    outcome_rx: oneshot::Receiver<Result<String>>,
    server: CallbackServer,
}

impl AuthorizationSession {
    /// Bind the loopback listener, start serving, and build the
    /// authorization URL for `identity`.
    pub async fn bind(identity: &ClientIdentity) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(|e| Error::Io(format!("binding callback listener: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::Io(format!("reading callback listener address: {e}")))?
            .port();

        let redirect_uri = format!("http://localhost:{port}");
        let state = uuid::Uuid::new_v4().as_simple().to_string();
        let verifier = generate_verifier();
        let authorization_url =
            build_authorization_url(identity, &redirect_uri, &state, &compute_challenge(&verifier))?;

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let handler_state = CallbackState {
            expected_state: Arc::from(state.as_str()),
            outcome_tx: Arc::new(Mutex::new(Some(outcome_tx))),
        };
        let server = CallbackServer::start(listener, callback_router(handler_state));

        info!(port, "callback listener ready");
        Ok(Self {
            state,
            verifier,
            port,
            redirect_uri,
            authorization_url,
            outcome_rx,
            server,
        })
    }

    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Anti-forgery token expected back in the callback.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Wait for the callback, close the listener, and exchange the code.
    ///
    /// The listener is closed before this returns on every path.
    pub async fn complete(
        self,
        client: &reqwest::Client,
        identity: &ClientIdentity,
        timeout: Duration,
    ) -> Result<TokenRecord> {
        let AuthorizationSession {
            verifier,
            redirect_uri,
            outcome_rx,
            server,
            ..
        } = self;

        let outcome = match tokio::time::timeout(timeout, outcome_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::Io("callback server stopped unexpectedly".into())),
            Err(_) => Err(Error::InteractiveTimeout(timeout)),
        };
        server.shutdown().await;

        let code = outcome?;
        token::exchange_code(client, identity, &code, &redirect_uri, &verifier).await
    }
}

/// Build the authorization URL with offline access so a refresh token is issued.
pub fn build_authorization_url(
    identity: &ClientIdentity,
    redirect_uri: &str,
    state: &str,
    challenge: &str,
) -> Result<String> {
    let scope = identity.scopes.join(" ");
    let url = reqwest::Url::parse_with_params(
        &identity.auth_uri,
        &[
            ("client_id", identity.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
            ("access_type", "offline"),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| Error::ConfigUnreadable(format!("invalid auth_uri {}: {e}", identity.auth_uri)))?;
    Ok(url.into())
}
