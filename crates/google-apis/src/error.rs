//! Error types for remote API calls

/// Errors from Drive and Gmail operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Auth(#[from] google_auth::Error),

    #[error("access token rejected: {0}")]
    Unauthorized(String),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid Google Drive folder link: {0}")]
    InvalidLink(String),
}

impl Error {
    /// Authentication problems abort a run instead of being skipped per item.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::Unauthorized(_))
    }
}

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;
