//! Error types for credential acquisition and refresh

use std::time::Duration;

/// Errors from authentication operations.
///
/// Token file errors (`NotFound`, `Corrupt`) and refresh errors are
/// recoverable inside `Authenticator::get_client`; everything else is
/// surfaced to the command that asked for a client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("client identity unreadable: {0}")]
    ConfigUnreadable(String),

    #[error("token file not found: {0}")]
    NotFound(String),

    #[error("token file corrupt: {0}")]
    Corrupt(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("authorization denied: {0}")]
    InteractiveDenied(String),

    #[error("authorization timed out after {}s", .0.as_secs())]
    InteractiveTimeout(Duration),

    #[error("failed to persist credentials: {0}")]
    PersistFailed(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
