//! Token records and token endpoint calls
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (interactive flow completion)
//! 2. Token refresh (silent refresh and in-process transport refresh)
//!
//! Both operations POST a form to the identity's `token_uri` with different
//! grant types and convert the response into a `TokenRecord` with an
//! absolute expiry.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::ASSUMED_TOKEN_LIFETIME;
use crate::error::{Error, Result};
use crate::identity::ClientIdentity;

/// The user's grant as cached on disk.
///
/// `expiry` is absolute. A record without an expiry is never valid, which
/// also covers the zero timestamp written by older tools.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    /// Granted scopes, recorded for audit only.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl TokenRecord {
    /// Valid iff the access token is non-empty and expires after `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expiry.is_some_and(|expiry| expiry > now)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// A record with a refresh token can be renewed even when expired.
    pub fn is_refreshable(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// True when the token is invalid now or becomes invalid within `window`.
    pub fn expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
        !self.is_valid_at(now + window)
    }

    /// Time left before expiry, if the token is currently valid.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        match self.expiry {
            Some(expiry) if self.is_valid_at(now) => Some(expiry - now),
            _ => None,
        }
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &redacted(&self.access_token))
            .field("token_type", &self.token_type)
            .field("refresh_token", &redacted(&self.refresh_token))
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

fn redacted(value: &str) -> &'static str {
    if value.is_empty() { "" } else { "[REDACTED]" }
}

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time; when absent a
/// short lifetime is assumed. Refresh responses usually omit `refresh_token`.
#[derive(Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space-separated granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert into a record, keeping `previous_refresh` when the response
    /// carries no refresh token and `requested_scopes` when it lists none.
    pub fn into_record(
        self,
        now: DateTime<Utc>,
        previous_refresh: &str,
        requested_scopes: &[String],
    ) -> TokenRecord {
        let lifetime = match self.expires_in.filter(|secs| *secs > 0) {
            Some(secs) => secs,
            None => {
                debug!(
                    assumed_secs = ASSUMED_TOKEN_LIFETIME.as_secs(),
                    "token response has no expires_in, assuming a short lifetime"
                );
                ASSUMED_TOKEN_LIFETIME.as_secs() as i64
            }
        };
        let expiry = Some(now + chrono::Duration::seconds(lifetime));
        let refresh_token = self
            .refresh_token
            .filter(|rt| !rt.is_empty())
            .unwrap_or_else(|| previous_refresh.to_string());
        let scopes = match self.scope {
            Some(scope) if !scope.trim().is_empty() => {
                scope.split_whitespace().map(str::to_string).collect()
            }
            _ => requested_scopes.to_vec(),
        };

        TokenRecord {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token,
            expiry,
            scopes,
        }
    }
}

/// Exchange an authorization code for tokens (interactive flow completion).
///
/// `redirect_uri` must be the exact value advertised in the authorization
/// URL. `verifier` is the PKCE code verifier of the same session.
pub async fn exchange_code(
    client: &reqwest::Client,
    identity: &ClientIdentity,
    code: &str,
    redirect_uri: &str,
    verifier: &str,
) -> Result<TokenRecord> {
    let response = client
        .post(&identity.token_uri)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", identity.client_id.as_str()),
            ("client_secret", identity.client_secret.expose().as_str()),
            ("code_verifier", verifier),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;
    if token.access_token.is_empty() {
        return Err(Error::TokenExchange(
            "token response has an empty access_token".into(),
        ));
    }

    debug!("authorization code exchanged");
    Ok(token.into_record(Utc::now(), "", &identity.scopes))
}

/// Refresh an access token using the record's refresh token.
///
/// The returned record keeps the old refresh token unless the provider
/// issued a new one.
pub async fn refresh_token(
    client: &reqwest::Client,
    identity: &ClientIdentity,
    current: &TokenRecord,
) -> Result<TokenRecord> {
    if !current.is_refreshable() {
        return Err(Error::RefreshFailed("token has no refresh token".into()));
    }

    let response = client
        .post(&identity.token_uri)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", current.refresh_token.as_str()),
            ("client_id", identity.client_id.as_str()),
            ("client_secret", identity.client_secret.expose().as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // Revoked or expired refresh tokens come back as invalid_grant
        if status.as_u16() == 401 || status.as_u16() == 403 || body.contains("invalid_grant") {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::RefreshFailed(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::RefreshFailed(format!("invalid refresh response: {e}")))?;
    if token.access_token.is_empty() {
        return Err(Error::RefreshFailed(
            "refresh response has an empty access_token".into(),
        ));
    }

    debug!("access token refreshed");
    Ok(token.into_record(Utc::now(), &current.refresh_token, &current.scopes))
}
