//! Google OAuth constants
//!
//! Endpoint defaults are used when the client secret file omits
//! `auth_uri` / `token_uri`. Client id and secret always come from the file.

use std::time::Duration;

/// Google authorization endpoint
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google token endpoint for code exchange and refresh
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// How long the local callback listener waits for the browser redirect.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Grace period for in-flight callback responses when the listener shuts down.
pub const CALLBACK_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// The transport refreshes tokens expiring within this window.
pub const REFRESH_SKEW: Duration = Duration::from_secs(10);

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const ASSUMED_TOKEN_LIFETIME: Duration = Duration::from_secs(300);

/// Page shown in the browser once the authorization code has been received.
pub const SUCCESS_PAGE: &str = "<html><body><h1>Authentication successful!</h1><p>You can close this window.</p></body></html>";
