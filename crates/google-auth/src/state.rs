//! Credential acquisition state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! `Authenticator::get_client` executes the I/O implied by each action and
//! feeds the result back as the next event.
//!
//! ```text
//! NoToken ───────────────┐
//! TokenExpiredNoRefresh ─┼─ Start ──────────────► AwaitingInteractive
//! TokenExpiredRefreshable ─ Start ─► (Refresh) ─┬─ RefreshFailed ─► AwaitingInteractive
//!                                               └─ RefreshSucceeded ─► Authenticated
//! AwaitingInteractive ─ InteractiveSucceeded ─► Authenticated
//! TokenValid ─ Start ─► Authenticated
//! ```

use chrono::{DateTime, Utc};

use crate::token::TokenRecord;

/// Where a `get_client` call stands.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// Token file missing or unreadable
    NoToken,
    /// Cached token invalid and cannot be refreshed
    TokenExpiredNoRefresh,
    /// Cached token invalid but carries a refresh token
    TokenExpiredRefreshable { token: TokenRecord },
    /// Cached token usable as-is
    TokenValid { token: TokenRecord },
    /// Waiting on the user to complete the browser flow
    AwaitingInteractive,
    /// Usable token in hand
    Authenticated { token: TokenRecord },
}

impl AuthState {
    /// Classify the result of loading the token file.
    pub fn from_loaded(token: Option<TokenRecord>, now: DateTime<Utc>) -> Self {
        match token {
            None => AuthState::NoToken,
            Some(token) if token.is_valid_at(now) => AuthState::TokenValid { token },
            Some(token) if token.is_refreshable() => AuthState::TokenExpiredRefreshable { token },
            Some(_) => AuthState::TokenExpiredNoRefresh,
        }
    }

    /// Short label for logs and status output.
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::NoToken => "no_token",
            AuthState::TokenExpiredNoRefresh => "token_expired_no_refresh",
            AuthState::TokenExpiredRefreshable { .. } => "token_expired_refreshable",
            AuthState::TokenValid { .. } => "token_valid",
            AuthState::AwaitingInteractive => "awaiting_interactive",
            AuthState::Authenticated { .. } => "authenticated",
        }
    }
}

/// Events that drive state transitions.
#[derive(Debug)]
pub enum AuthEvent {
    /// Kick off evaluation of the loaded state
    Start,
    RefreshSucceeded(TokenRecord),
    RefreshFailed,
    InteractiveSucceeded(TokenRecord),
}

/// Actions the caller should execute after a state transition.
#[derive(Debug, PartialEq)]
pub enum AuthAction {
    /// Exchange the refresh token for a new access token
    Refresh { token: TokenRecord },
    /// Run the browser flow
    RunInteractive,
    /// Done: build the transport, persisting first when `persist` is set
    Finish { token: TokenRecord, persist: bool },
    /// Event does not apply to this state
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: AuthState, event: AuthEvent) -> (AuthState, AuthAction) {
    match (state, event) {
        (AuthState::TokenValid { token }, AuthEvent::Start) => (
            AuthState::Authenticated {
                token: token.clone(),
            },
            AuthAction::Finish {
                token,
                persist: false,
            },
        ),

        (AuthState::TokenExpiredRefreshable { token }, AuthEvent::Start) => (
            AuthState::TokenExpiredRefreshable {
                token: token.clone(),
            },
            AuthAction::Refresh { token },
        ),

        (AuthState::NoToken | AuthState::TokenExpiredNoRefresh, AuthEvent::Start) => {
            (AuthState::AwaitingInteractive, AuthAction::RunInteractive)
        }

        // --- Silent refresh ---
        (AuthState::TokenExpiredRefreshable { .. }, AuthEvent::RefreshSucceeded(token)) => (
            AuthState::Authenticated {
                token: token.clone(),
            },
            AuthAction::Finish {
                token,
                persist: true,
            },
        ),

        (AuthState::TokenExpiredRefreshable { .. }, AuthEvent::RefreshFailed) => {
            (AuthState::AwaitingInteractive, AuthAction::RunInteractive)
        }

        // --- Interactive ---
        (AuthState::AwaitingInteractive, AuthEvent::InteractiveSucceeded(token)) => (
            AuthState::Authenticated {
                token: token.clone(),
            },
            AuthAction::Finish {
                token,
                persist: true,
            },
        ),

        (state, _) => (state, AuthAction::None),
    }
}
