//! Interactive authorization strategies
//!
//! The `Authenticator` only needs "get me a fresh token from the user";
//! how that happens sits behind `InteractiveAuthorizer`. The production
//! implementation is the loopback redirect flow in `callback`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::callback::AuthorizationSession;
use crate::constants::CALLBACK_TIMEOUT;
use crate::error::Result;
use crate::identity::ClientIdentity;
use crate::token::TokenRecord;

/// Obtains a new token with the user's involvement.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Box<dyn InteractiveAuthorizer>`).
pub trait InteractiveAuthorizer: Send + Sync {
    fn authorize<'a>(
        &'a self,
        identity: &'a ClientIdentity,
    ) -> Pin<Box<dyn Future<Output = Result<TokenRecord>> + Send + 'a>>;
}

/// Callback that shows the authorization URL to the user.
pub type Prompt = Arc<dyn Fn(&str) + Send + Sync>;

/// Loopback redirect flow: bind, prompt, wait, exchange.
pub struct LocalCallbackFlow {
    client: reqwest::Client,
    timeout: Duration,
    prompt: Prompt,
}

impl LocalCallbackFlow {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: CALLBACK_TIMEOUT,
            prompt: Arc::new(|url: &str| {
                info!(url, "visit the authorization URL to continue");
            }),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace how the authorization URL is shown (the CLI prints it).
    pub fn with_prompt(mut self, prompt: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }
}

impl InteractiveAuthorizer for LocalCallbackFlow {
    fn authorize<'a>(
        &'a self,
        identity: &'a ClientIdentity,
    ) -> Pin<Box<dyn Future<Output = Result<TokenRecord>> + Send + 'a>> {
        Box::pin(async move {
            let session = AuthorizationSession::bind(identity).await?;
            (self.prompt)(session.authorization_url());
            info!(
                redirect_uri = session.redirect_uri(),
                timeout_secs = self.timeout.as_secs(),
                "waiting for authorization callback"
            );
            session.complete(&self.client, identity, self.timeout).await
        })
    }
}
