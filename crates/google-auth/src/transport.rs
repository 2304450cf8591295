//! Authenticated HTTP transport handed to task runners
//!
//! Attaches the bearer token to each request and refreshes it in memory
//! when it is about to expire, so a long download or triage run outlives
//! the one-hour access token. Refreshes here are not written back to the
//! credentials file; the next invocation refreshes from disk again.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::REFRESH_SKEW;
use crate::error::{Error, Result};
use crate::identity::ClientIdentity;
use crate::token::{self, TokenRecord};

/// Cheap to clone; clones share the token state.
#[derive(Clone)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    identity: Arc<ClientIdentity>,
    token: Arc<Mutex<TokenRecord>>,
}

impl AuthenticatedClient {
    pub fn new(http: reqwest::Client, identity: Arc<ClientIdentity>, token: TokenRecord) -> Self {
        Self {
            http,
            identity,
            token: Arc::new(Mutex::new(token)),
        }
    }

    /// Current access token, refreshed first if it expires within the skew window.
    ///
    /// Fails when the token is stale and cannot be refreshed; callers abort
    /// their run rather than retry.
    pub async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if !token.expires_within(REFRESH_SKEW, Utc::now()) {
            return Ok(token.access_token.clone());
        }

        if !token.is_refreshable() {
            return Err(Error::InvalidCredentials(
                "access token expired and no refresh token is available".into(),
            ));
        }

        debug!("access token expiring, refreshing in place");
        let refreshed = token::refresh_token(&self.http, &self.identity, &token).await?;
        *token = refreshed;
        info!(expiry = ?token.expiry, "access token refreshed for this run");
        Ok(token.access_token.clone())
    }

    /// Snapshot of the current token record.
    pub async fn token(&self) -> TokenRecord {
        self.token.lock().await.clone()
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// GET request with the bearer token attached.
    pub async fn get(&self, url: &str) -> Result<reqwest::RequestBuilder> {
        let bearer = self.access_token().await?;
        Ok(self.http.get(url).bearer_auth(bearer))
    }

    /// POST request with the bearer token attached.
    pub async fn post(&self, url: &str) -> Result<reqwest::RequestBuilder> {
        let bearer = self.access_token().await?;
        Ok(self.http.post(url).bearer_auth(bearer))
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("client_id", &self.identity.client_id)
            .finish_non_exhaustive()
    }
}
