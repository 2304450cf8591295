//! Google OAuth credential acquisition for command-line tools
//!
//! Obtains, caches and refreshes a user grant without any long-running
//! process. Each command invocation rebuilds its state from disk.
//!
//! Credential flow:
//! 1. `identity::ClientIdentity::load()` reads the console client secret file
//! 2. `credentials::CredentialStore::load()` reads the cached token, if any
//! 3. `state::handle_event()` decides: use it, refresh it, or ask the user
//! 4. `token::refresh_token()` renews a stale token silently
//! 5. `callback::AuthorizationSession` runs the loopback redirect flow and
//!    `token::exchange_code()` completes it
//! 6. `credentials::CredentialStore::save()` caches the result (best-effort)
//! 7. `transport::AuthenticatedClient` attaches the token to API requests

pub mod authenticator;
pub mod callback;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod identity;
pub mod pkce;
pub mod state;
pub mod token;
pub mod transport;

#[cfg(test)]
mod testing;

pub use authenticator::{AuthSettings, Authenticator, Authorization};
pub use callback::AuthorizationSession;
pub use credentials::CredentialStore;
pub use error::{Error, Result};
pub use flow::{InteractiveAuthorizer, LocalCallbackFlow};
pub use identity::ClientIdentity;
pub use state::{AuthAction, AuthEvent, AuthState};
pub use token::{TokenRecord, TokenResponse, exchange_code, refresh_token};
pub use transport::AuthenticatedClient;
