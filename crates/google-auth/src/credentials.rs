//! Credential storage for the cached OAuth token
//!
//! One JSON file holds the client id/secret pair next to the token fields,
//! so the file alone is enough for other tools to refresh the grant. Writes
//! go to a temp file in the same directory that is renamed over the target,
//! so a reader never sees a partial file. There is no locking: concurrent
//! invocations racing on the same file are accepted for a single-operator
//! tool.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identity::ClientIdentity;
use crate::token::TokenRecord;

/// On-disk shape of the credentials file.
#[derive(Serialize)]
struct PersistedCredentials<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    access_token: &'a str,
    token_type: &'a str,
    refresh_token: &'a str,
    expiry: Option<DateTime<Utc>>,
    scopes: &'a [String],
}

/// Credentials file at a fixed path.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the token fields from the file.
    ///
    /// Fails with `NotFound` when the file does not exist and `Corrupt` when
    /// it cannot be parsed. Identity fields in the file are ignored.
    pub async fn load(&self) -> Result<TokenRecord> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(self.path.display().to_string()));
            }
            Err(e) => {
                return Err(Error::Corrupt(format!(
                    "reading {}: {e}",
                    self.path.display()
                )));
            }
        };

        let token: TokenRecord = serde_json::from_str(&contents)
            .map_err(|e| Error::Corrupt(format!("parsing {}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), valid = token.is_valid(), "loaded cached token");
        Ok(token)
    }

    /// Write the identity's client id/secret and scopes together with the
    /// token, replacing any existing file.
    pub async fn save(&self, identity: &ClientIdentity, token: &TokenRecord) -> Result<()> {
        let persisted = PersistedCredentials {
            client_id: &identity.client_id,
            client_secret: identity.client_secret.expose(),
            access_token: &token.access_token,
            token_type: &token.token_type,
            refresh_token: &token.refresh_token,
            expiry: token.expiry,
            scopes: &identity.scopes,
        };
        let json = serde_json::to_string_pretty(&persisted)
            .map_err(|e| Error::PersistFailed(format!("serializing credentials: {e}")))?;

        write_atomic(&self.path, json.as_bytes()).await?;
        info!(path = %self.path.display(), "cached credentials");
        Ok(())
    }
}

/// Write `data` to `path` atomically with owner-only permissions.
///
/// The temp file is created with mode 0600 (unix) before any bytes are
/// written, then renamed over the target.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::PersistFailed("credential path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::PersistFailed("credential path has no file name".into()))?
        .to_string_lossy();
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(&tmp_path)
        .await
        .map_err(|e| Error::PersistFailed(format!("creating {}: {e}", tmp_path.display())))?;

    // A stale temp file keeps its old mode; force 0600 either way
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| Error::PersistFailed(format!("setting credential file permissions: {e}")))?;
    }

    let written = async {
        file.write_all(data).await?;
        file.sync_all().await
    }
    .await;
    drop(file);
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::PersistFailed(format!(
            "writing {}: {e}",
            tmp_path.display()
        )));
    }

    tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
        Error::PersistFailed(format!("renaming temp credential file to {}: {e}", path.display()))
    })?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;

    fn identity() -> ClientIdentity {
        ClientIdentity {
            client_id: "client-1.apps.googleusercontent.com".into(),
            client_secret: Secret::new("GOCSPX-1".to_string()),
            auth_uri: crate::constants::AUTHORIZE_ENDPOINT.into(),
            token_uri: crate::constants::TOKEN_ENDPOINT.into(),
            scopes: vec![
                "https://www.googleapis.com/auth/drive.readonly".to_string(),
                "https://www.googleapis.com/auth/gmail.modify".to_string(),
            ],
        }
    }

    fn token(suffix: &str) -> TokenRecord {
        TokenRecord {
            access_token: format!("at_{suffix}"),
            token_type: "Bearer".into(),
            refresh_token: format!("rt_{suffix}"),
            expiry: Some(Utc::now() + chrono::Duration::hours(1)),
            scopes: vec![],
        }
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"));
        let original = token("1");

        store.save(&identity(), &original).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded.access_token, original.access_token);
        assert_eq!(loaded.token_type, original.token_type);
        assert_eq!(loaded.refresh_token, original.refresh_token);
        assert_eq!(loaded.expiry, original.expiry);
        assert_eq!(loaded.scopes, identity().scopes);
    }

    #[tokio::test]
    async fn saved_file_carries_client_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        CredentialStore::new(&path)
            .save(&identity(), &token("1"))
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["client_id"], "client-1.apps.googleusercontent.com");
        assert_eq!(value["client_secret"], "GOCSPX-1");
        assert_eq!(value["access_token"], "at_1");
        assert_eq!(value["token_type"], "Bearer");
        assert_eq!(value["refresh_token"], "rt_1");
        assert!(value["expiry"].is_string());
        assert_eq!(value["scopes"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn save_replaces_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"));
        tokio::fs::write(store.path(), "x".repeat(4096)).await.unwrap();

        store.save(&identity(), &token("1")).await.unwrap();
        store.save(&identity(), &token("2")).await.unwrap();

        assert_eq!(store.load().await.unwrap().access_token, "at_2");
        // no temp files left behind
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load().await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn unparseable_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"));
        tokio::fs::write(store.path(), "{\"access_token\": ").await.unwrap();
        assert!(matches!(store.load().await, Err(Error::Corrupt(_))));
    }

    #[tokio::test]
    async fn save_into_missing_directory_is_persist_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("no-such-dir").join("token.json"));
        let result = store.save(&identity(), &token("1")).await;
        assert!(matches!(result, Err(Error::PersistFailed(_))));
    }

    #[tokio::test]
    async fn loads_file_written_by_older_tool() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"));
        let legacy = r#"{"access_token":"ya29.a0","client_id":"id","client_secret":"s","expiry":"2024-03-01T09:15:00.123456+07:00","refresh_token":"1//0g","scopes":["https://mail.google.com/"],"token_type":"Bearer"}"#;
        tokio::fs::write(store.path(), legacy).await.unwrap();

        let token = store.load().await.unwrap();
        assert_eq!(token.access_token, "ya29.a0");
        assert_eq!(token.refresh_token, "1//0g");
        assert_eq!(token.scopes, vec!["https://mail.google.com/"]);
        assert!(!token.is_valid());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"));
        store.save(&identity(), &token("1")).await.unwrap();

        let metadata = tokio::fs::metadata(store.path()).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }
}
