//! Client identity loading
//!
//! Reads the client secret file downloaded from the Google Cloud console.
//! Only the fields the flow needs are deserialized; the rest of the document
//! is ignored.

use std::path::Path;

use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::constants::{AUTHORIZE_ENDPOINT, TOKEN_ENDPOINT};
use crate::error::{Error, Result};

/// The registered application's identity plus the scopes this process requests.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub auth_uri: String,
    pub token_uri: String,
    pub scopes: Vec<String>,
}

/// Console document: one of `installed` (desktop app) or `web`.
#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecretEntry>,
    web: Option<ClientSecretEntry>,
}

#[derive(Deserialize)]
struct ClientSecretEntry {
    client_id: String,
    client_secret: Secret<String>,
    #[serde(default = "default_auth_uri")]
    auth_uri: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_auth_uri() -> String {
    AUTHORIZE_ENDPOINT.to_string()
}

fn default_token_uri() -> String {
    TOKEN_ENDPOINT.to_string()
}

impl ClientIdentity {
    /// Load the identity from a client secret file, attaching the configured scopes.
    pub fn load(path: &Path, scopes: &[String]) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigUnreadable(format!(
                "unable to read client secret file {}: {e}",
                path.display()
            ))
        })?;
        let identity = Self::from_json(&contents, scopes)?;
        debug!(path = %path.display(), client_id = %identity.client_id, "loaded client identity");
        Ok(identity)
    }

    /// Parse a client secret document.
    pub fn from_json(contents: &str, scopes: &[String]) -> Result<Self> {
        let file: ClientSecretFile = serde_json::from_str(contents)
            .map_err(|e| Error::ConfigUnreadable(format!("parsing client secret file: {e}")))?;

        let entry = file.installed.or(file.web).ok_or_else(|| {
            Error::ConfigUnreadable(
                "client secret file has neither an \"installed\" nor a \"web\" section".into(),
            )
        })?;

        if entry.client_id.is_empty() {
            return Err(Error::ConfigUnreadable("client_id is empty".into()));
        }

        Ok(Self {
            client_id: entry.client_id,
            client_secret: entry.client_secret,
            auth_uri: entry.auth_uri,
            token_uri: entry.token_uri,
            scopes: scopes.to_vec(),
        })
    }
}
