//! Authenticator: turns on-disk state into an authenticated transport
//!
//! Every `get_client` call starts from disk. There is no in-memory cache
//! across calls, since each CLI command is its own process. Persistence is
//! best-effort: a token that could not be cached is still returned, with
//! the failure attached as a warning.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::flow::InteractiveAuthorizer;
use crate::identity::ClientIdentity;
use crate::state::{AuthAction, AuthEvent, AuthState, handle_event};
use crate::token;
use crate::transport::AuthenticatedClient;

/// Paths and scopes the authenticator works with.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Client secret file from the Google Cloud console
    pub credentials_file: PathBuf,
    /// Cached token file
    pub token_file: PathBuf,
    pub scopes: Vec<String>,
}

/// Result of a successful `get_client`.
#[derive(Debug)]
pub struct Authorization {
    pub client: AuthenticatedClient,
    /// Set when the token was obtained but could not be cached
    pub persist_warning: Option<Error>,
}

pub struct Authenticator {
    settings: AuthSettings,
    store: CredentialStore,
    http: reqwest::Client,
    interactive: Box<dyn InteractiveAuthorizer>,
}

impl Authenticator {
    pub fn new(
        settings: AuthSettings,
        http: reqwest::Client,
        interactive: Box<dyn InteractiveAuthorizer>,
    ) -> Self {
        let store = CredentialStore::new(&settings.token_file);
        Self {
            settings,
            store,
            http,
            interactive,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Load the client identity with the configured scopes.
    pub fn identity(&self) -> Result<ClientIdentity> {
        ClientIdentity::load(&self.settings.credentials_file, &self.settings.scopes)
    }

    /// Classify the cached token without touching the network.
    pub async fn inspect(&self) -> AuthState {
        let loaded = self.store.load().await.ok();
        AuthState::from_loaded(loaded, Utc::now())
    }

    /// Produce an authenticated transport: cached token, silent refresh,
    /// or interactive authorization, in that order.
    ///
    /// Errors only when the identity file is unreadable or the interactive
    /// flow fails. Refresh failures degrade to the interactive flow.
    pub async fn get_client(&self) -> Result<Authorization> {
        let identity = Arc::new(self.identity()?);
        debug!(scopes = ?identity.scopes, "using scopes");

        let loaded = match self.store.load().await {
            Ok(token) => Some(token),
            Err(e) => {
                info!(error = %e, "no usable cached token");
                None
            }
        };

        let mut state = AuthState::from_loaded(loaded, Utc::now());
        let mut event = AuthEvent::Start;
        loop {
            let from = state.label();
            let (next, action) = handle_event(state, event);
            debug!(from, to = next.label(), "auth state transition");
            state = next;

            event = match action {
                AuthAction::Refresh { token } => {
                    match token::refresh_token(&self.http, &identity, &token).await {
                        Ok(refreshed) => {
                            info!("cached token refreshed");
                            AuthEvent::RefreshSucceeded(refreshed)
                        }
                        Err(e) => {
                            warn!(error = %e, "token refresh failed, falling back to interactive authorization");
                            AuthEvent::RefreshFailed
                        }
                    }
                }
                AuthAction::RunInteractive => {
                    let token = self.interactive.authorize(&identity).await?;
                    info!("interactive authorization completed");
                    AuthEvent::InteractiveSucceeded(token)
                }
                AuthAction::Finish { token, persist } => {
                    let persist_warning = if persist {
                        self.persist(&identity, &token).await
                    } else {
                        None
                    };
                    let client = AuthenticatedClient::new(self.http.clone(), identity, token);
                    return Ok(Authorization {
                        client,
                        persist_warning,
                    });
                }
                AuthAction::None => {
                    return Err(Error::RefreshFailed(format!(
                        "no transition from state {}",
                        state.label()
                    )));
                }
            };
        }
    }

    /// Save the token, reporting failure as a warning instead of an error.
    async fn persist(&self, identity: &ClientIdentity, token: &token::TokenRecord) -> Option<Error> {
        match self.store.save(identity, token).await {
            Ok(()) => None,
            Err(e) => {
                let e = match e {
                    Error::PersistFailed(_) => e,
                    other => Error::PersistFailed(other.to_string()),
                };
                warn!(
                    path = %self.store.path().display(),
                    error = %e,
                    "unable to cache oauth token, continuing with in-memory token"
                );
                Some(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTokenEndpoint;
    use crate::token::TokenRecord;
    use axum::http::StatusCode;
    use std::future::Future;
    use std::path::Path;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Interactive stand-in that counts invocations.
    struct FakeInteractive {
        calls: Arc<AtomicUsize>,
        outcome: fn() -> Result<TokenRecord>,
    }

    impl InteractiveAuthorizer for FakeInteractive {
        fn authorize<'a>(
            &'a self,
            _identity: &'a ClientIdentity,
        ) -> Pin<Box<dyn Future<Output = Result<TokenRecord>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = (self.outcome)();
            Box::pin(async move { outcome })
        }
    }

    fn interactive_token() -> Result<TokenRecord> {
        Ok(TokenRecord {
            access_token: "at_interactive".into(),
            token_type: "Bearer".into(),
            refresh_token: "rt_interactive".into(),
            expiry: Some(Utc::now() + chrono::Duration::hours(1)),
            scopes: vec![],
        })
    }

    fn interactive_timeout() -> Result<TokenRecord> {
        Err(Error::InteractiveTimeout(std::time::Duration::from_secs(120)))
    }

    fn token(access: &str, refresh: &str, expires_in_secs: i64) -> TokenRecord {
        TokenRecord {
            access_token: access.into(),
            token_type: "Bearer".into(),
            refresh_token: refresh.into(),
            expiry: Some(Utc::now() + chrono::Duration::seconds(expires_in_secs)),
            scopes: vec![],
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        endpoint: MockTokenEndpoint,
        calls: Arc<AtomicUsize>,
        authenticator: Authenticator,
    }

    impl Fixture {
        async fn new(endpoint: MockTokenEndpoint, outcome: fn() -> Result<TokenRecord>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self::in_dir(dir, endpoint, outcome, None)
        }

        fn in_dir(
            dir: tempfile::TempDir,
            endpoint: MockTokenEndpoint,
            outcome: fn() -> Result<TokenRecord>,
            token_file: Option<&Path>,
        ) -> Self {
            let credentials_file = dir.path().join("credentials.json");
            std::fs::write(&credentials_file, endpoint.client_secret_json()).unwrap();
            let calls = Arc::new(AtomicUsize::new(0));
            let settings = AuthSettings {
                credentials_file,
                token_file: token_file
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| dir.path().join("token.json")),
                scopes: vec!["https://www.googleapis.com/auth/drive.readonly".into()],
            };
            let authenticator = Authenticator::new(
                settings,
                reqwest::Client::new(),
                Box::new(FakeInteractive {
                    calls: calls.clone(),
                    outcome,
                }),
            );
            Self {
                dir,
                endpoint,
                calls,
                authenticator,
            }
        }

        async fn seed(&self, token: &TokenRecord) {
            let identity = self.authenticator.identity().unwrap();
            CredentialStore::new(&self.authenticator.settings().token_file)
                .save(&identity, token)
                .await
                .unwrap();
        }

        async fn cached(&self) -> TokenRecord {
            CredentialStore::new(&self.authenticator.settings().token_file)
                .load()
                .await
                .unwrap()
        }

        fn interactive_calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn refreshed_json() -> serde_json::Value {
        serde_json::json!({
            "access_token": "at_refreshed",
            "token_type": "Bearer",
            "expires_in": 3600
        })
    }

    #[tokio::test]
    async fn valid_cached_token_is_used_as_is() {
        let fixture = Fixture::new(MockTokenEndpoint::ok(refreshed_json()).await, interactive_token).await;
        fixture.seed(&token("at_cached", "rt", 3600)).await;

        let auth = fixture.authenticator.get_client().await.unwrap();

        assert_eq!(auth.client.access_token().await.unwrap(), "at_cached");
        assert!(auth.persist_warning.is_none());
        assert_eq!(fixture.interactive_calls(), 0);
        assert!(fixture.endpoint.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_token_runs_interactive_once_without_refresh() {
        let fixture = Fixture::new(MockTokenEndpoint::ok(refreshed_json()).await, interactive_token).await;

        let auth = fixture.authenticator.get_client().await.unwrap();

        assert_eq!(fixture.interactive_calls(), 1);
        assert!(fixture.endpoint.requests().is_empty());
        assert_eq!(auth.client.access_token().await.unwrap(), "at_interactive");
        assert_eq!(fixture.cached().await.access_token, "at_interactive");
    }

    #[tokio::test]
    async fn corrupt_token_file_runs_interactive() {
        let fixture = Fixture::new(MockTokenEndpoint::ok(refreshed_json()).await, interactive_token).await;
        std::fs::write(&fixture.authenticator.settings().token_file, "{{{").unwrap();

        fixture.authenticator.get_client().await.unwrap();

        assert_eq!(fixture.interactive_calls(), 1);
        assert_eq!(fixture.cached().await.access_token, "at_interactive");
    }

    #[tokio::test]
    async fn expired_token_without_refresh_runs_interactive() {
        let fixture = Fixture::new(MockTokenEndpoint::ok(refreshed_json()).await, interactive_token).await;
        fixture.seed(&token("at_stale", "", -60)).await;

        fixture.authenticator.get_client().await.unwrap();

        assert_eq!(fixture.interactive_calls(), 1);
        assert!(fixture.endpoint.requests().is_empty());
    }

    #[tokio::test]
    async fn successful_refresh_skips_interactive_and_persists() {
        let fixture = Fixture::new(MockTokenEndpoint::ok(refreshed_json()).await, interactive_token).await;
        fixture.seed(&token("at_stale", "rt_keep", -60)).await;

        let auth = fixture.authenticator.get_client().await.unwrap();

        assert_eq!(fixture.interactive_calls(), 0);
        assert_eq!(fixture.endpoint.requests().len(), 1);
        assert_eq!(auth.client.access_token().await.unwrap(), "at_refreshed");
        let cached = fixture.cached().await;
        assert_eq!(cached.access_token, "at_refreshed");
        assert_eq!(cached.refresh_token, "rt_keep");
        assert!(cached.is_valid());
    }

    #[tokio::test]
    async fn empty_access_token_with_refresh_token_attempts_refresh() {
        let fixture = Fixture::new(MockTokenEndpoint::ok(refreshed_json()).await, interactive_token).await;
        fixture.seed(&token("", "rt_only", 3600)).await;

        let auth = fixture.authenticator.get_client().await.unwrap();

        assert_eq!(fixture.endpoint.requests().len(), 1);
        assert_eq!(fixture.endpoint.requests()[0]["refresh_token"], "rt_only");
        assert_eq!(auth.client.access_token().await.unwrap(), "at_refreshed");
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_interactive() {
        let endpoint = MockTokenEndpoint::failing(
            StatusCode::BAD_REQUEST,
            serde_json::json!({"error": "invalid_grant"}),
        )
        .await;
        let fixture = Fixture::new(endpoint, interactive_token).await;
        fixture.seed(&token("at_stale", "rt_revoked", -60)).await;

        let auth = fixture.authenticator.get_client().await.unwrap();

        assert_eq!(fixture.endpoint.requests().len(), 1);
        assert_eq!(fixture.interactive_calls(), 1);
        assert_eq!(auth.client.access_token().await.unwrap(), "at_interactive");
    }

    #[tokio::test]
    async fn interactive_failure_is_returned() {
        let fixture = Fixture::new(MockTokenEndpoint::ok(refreshed_json()).await, interactive_timeout).await;

        let result = fixture.authenticator.get_client().await;

        assert!(matches!(result, Err(Error::InteractiveTimeout(_))));
        assert_eq!(fixture.interactive_calls(), 1);
    }

    #[tokio::test]
    async fn refresh_failure_error_is_not_propagated() {
        let endpoint = MockTokenEndpoint::failing(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"error": "backend"}),
        )
        .await;
        let fixture = Fixture::new(endpoint, interactive_timeout).await;
        fixture.seed(&token("at_stale", "rt", -60)).await;

        // The caller sees the interactive outcome, never the refresh error
        let result = fixture.authenticator.get_client().await;
        assert!(matches!(result, Err(Error::InteractiveTimeout(_))));
    }

    #[tokio::test]
    async fn missing_identity_file_is_fatal() {
        let fixture = Fixture::new(MockTokenEndpoint::ok(refreshed_json()).await, interactive_token).await;
        std::fs::remove_file(&fixture.authenticator.settings().credentials_file).unwrap();

        let result = fixture.authenticator.get_client().await;

        assert!(matches!(result, Err(Error::ConfigUnreadable(_))));
        assert_eq!(fixture.interactive_calls(), 0);
    }

    #[tokio::test]
    async fn persist_failure_still_returns_usable_client() {
        let dir = tempfile::tempdir().unwrap();
        let unwritable = dir.path().join("missing-dir").join("token.json");
        let fixture = Fixture::in_dir(
            dir,
            MockTokenEndpoint::ok(refreshed_json()).await,
            interactive_token,
            Some(&unwritable),
        );

        let auth = fixture.authenticator.get_client().await.unwrap();

                assert!(matches!(auth.persist_warning, Some(Error::PersistFailed(_))));
        assert_eq!(auth.client.access_token().await.unwrap(), "at_interactive");
        assert!(!fixture.dir.path().join("missing-dir").exists());
    }

    #[tokio::test]
    async fn persist_failure_after_refresh_still_returns_refreshed_client() {
        let fixture = Fixture::new(MockTokenEndpoint::ok(refreshed_json()).await, interactive_token).await;
        fixture.seed(&token("at_stale", "rt_keep", -60)).await;

        // A directory at the temp file path makes the save fail for any user
        let blocker = fixture
            .dir
            .path()
            .join(format!(".token.json.tmp.{}", std::process::id()));
        std::fs::create_dir(&blocker).unwrap();

        let auth = fixture.authenticator.get_client().await.unwrap();

        assert!(matches!(auth.persist_warning, Some(Error::PersistFailed(_))));
        assert_eq!(auth.client.access_token().await.unwrap(), "at_refreshed");
        assert_eq!(fixture.interactive_calls(), 0);
        assert_eq!(fixture.endpoint.requests().len(), 1);
        assert_eq!(fixture.cached().await.access_token, "at_stale");
    }

    #[tokio::test]
    async fn inspect_reports_cached_state() {
        let fixture = Fixture::new(MockTokenEndpoint::ok(refreshed_json()).await, interactive_token).await;
        assert_eq!(fixture.authenticator.inspect().await, AuthState::NoToken);

        fixture.seed(&token("at", "rt", -60)).await;
        assert!(matches!(
            fixture.authenticator.inspect().await,
            AuthState::TokenExpiredRefreshable { .. }
        ));
    }
}
