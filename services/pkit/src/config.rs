//! Configuration types and loading
//!
//! Config precedence: `--config` flag > `PKIT_CONFIG` env var > `config.toml`.
//! Relative paths inside the file are resolved against the working directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use google_auth::AuthSettings;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    pub google: GoogleConfig,
}

/// Process-wide knobs
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Raise the default log level to debug
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            http_timeout_secs: default_http_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GoogleConfig {
    /// TOML file listing senders for `delete-spam`
    #[serde(default)]
    pub spam_emails_file: Option<PathBuf>,
    pub auth: AuthConfig,
}

/// OAuth client and token cache settings
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    pub scopes: Vec<String>,
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,
}

/// Spam sender list file
#[derive(Debug, Deserialize)]
struct SpamList {
    #[serde(default)]
    spam_emails: Vec<String>,
}

fn default_http_timeout() -> u64 {
    60
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_callback_timeout() -> u64 {
    120
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> common::Result<Self> {
        let config: Config = toml::from_str(contents)?;

        let auth = &config.google.auth;
        if auth.scopes.is_empty() {
            return Err(common::Error::Config(
                "google.auth.scopes must list at least one scope".into(),
            ));
        }
        if auth.scopes.iter().any(|s| s.trim().is_empty()) {
            return Err(common::Error::Config(
                "google.auth.scopes must not contain empty entries".into(),
            ));
        }

        if auth.callback_timeout_secs == 0 {
            return Err(common::Error::Config(
                "callback_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.settings.http_timeout_secs == 0 {
            return Err(common::Error::Config(
                "http_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or PKIT_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("PKIT_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("config.toml")
    }

    pub fn auth_settings(&self) -> AuthSettings {
        let auth = &self.google.auth;
        AuthSettings {
            credentials_file: auth.credentials_file.clone(),
            token_file: auth.token_file.clone(),
            scopes: auth.scopes.clone(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.http_timeout_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.google.auth.callback_timeout_secs)
    }
}

/// Read the sender list used by `delete-spam`, dropping blanks and duplicates.
pub fn load_spam_list(path: &Path) -> common::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!(
            "failed to read spam_emails_file {}: {e}",
            path.display()
        ))
    })?;
    let list: SpamList = toml::from_str(&contents)?;

    let mut senders: Vec<String> = Vec::with_capacity(list.spam_emails.len());
    for sender in list.spam_emails {
        let sender = sender.trim().to_string();
        if !sender.is_empty() && !senders.contains(&sender) {
            senders.push(sender);
        }
    }
    Ok(senders)
}
