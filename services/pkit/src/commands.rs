//! Subcommand implementations
//!
//! Each command gets its authenticated transport from the `Authenticator`
//! and prints user-facing results to stdout. Diagnostics go through tracing.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use google_apis::{DriveApi, GmailApi, TriageSummary, download_folder, trash_unread_from};
use google_auth::{AuthState, Authenticator, Authorization, CredentialStore};
use tracing::{info, warn};

use crate::config::{Config, load_spam_list};

async fn authorize(auth: &Authenticator) -> Result<Authorization> {
    let authorization = auth
        .get_client()
        .await
        .context("failed to obtain Google credentials")?;
    if let Some(warning) = &authorization.persist_warning {
        warn!(
            path = %auth.settings().token_file.display(),
            error = %warning,
            "credentials obtained but not cached; the next run may ask to authorize again"
        );
    }
    Ok(authorization)
}

/// Trash unread mail from every sender on the configured spam list.
pub async fn delete_spam(config: &Config, auth: &Authenticator) -> Result<()> {
    let spam_file = config
        .google
        .spam_emails_file
        .as_deref()
        .context("google.spam_emails_file is not configured")?;
    let senders = load_spam_list(spam_file)
        .with_context(|| format!("failed to load spam list from {}", spam_file.display()))?;

    if senders.is_empty() {
        println!("No spam senders listed in {}", spam_file.display());
        return Ok(());
    }
    info!(senders = senders.len(), "starting spam triage");

    let authorization = authorize(auth).await?;
    let gmail = GmailApi::new(authorization.client);
    let summary = trash_unread_from(&gmail, &senders)
        .await
        .context("spam triage aborted")?;

    println!("{}", describe_triage(&summary));
    Ok(())
}

fn describe_triage(summary: &TriageSummary) -> String {
    let mut lines: Vec<String> = summary
        .senders
        .iter()
        .map(|report| match &report.search_error {
            Some(error) => format!("{}: search failed ({error})", report.sender),
            None if report.failed > 0 => format!(
                "{}: moved {} of {} messages to trash, {} failed",
                report.sender, report.trashed, report.matched, report.failed
            ),
            None => format!(
                "{}: moved {} messages to trash",
                report.sender, report.trashed
            ),
        })
        .collect();
    lines.push(format!("Total moved to trash: {}", summary.total_trashed()));
    let failed = summary.total_failed();
    if failed > 0 {
        lines.push(format!("Total failures: {failed} (see log for details)"));
    }
    lines.join("\n")
}

/// Download a shared Drive folder into `output`.
pub async fn download_drive(auth: &Authenticator, link: &str, output: &Path) -> Result<()> {
    let authorization = authorize(auth).await?;
    let drive = DriveApi::new(authorization.client);
    let summary = download_folder(&drive, link, output)
        .await
        .with_context(|| format!("failed to download {link}"))?;

    println!(
        "Downloaded {} files ({} skipped, {} failed) from {} folders into {}",
        summary.downloaded,
        summary.skipped,
        summary.failed,
        summary.folders,
        output.display()
    );
    Ok(())
}

/// Authorize if needed, then write the credentials to `filename`.
pub async fn create_token(auth: &Authenticator, filename: &Path) -> Result<()> {
    let authorization = authorize(auth).await?;
    let token = authorization.client.token().await;

    CredentialStore::new(filename)
        .save(authorization.client.identity(), &token)
        .await
        .with_context(|| format!("failed to write credentials to {}", filename.display()))?;

    println!("Credentials written to {}", filename.display());
    Ok(())
}

/// Report what the next command would do with the cached token.
pub async fn token_status(auth: &Authenticator) -> Result<()> {
    let state = auth.inspect().await;
    println!(
        "{}",
        describe_state(&state, &auth.settings().token_file, Utc::now())
    );
    Ok(())
}

fn describe_state(state: &AuthState, token_file: &Path, now: DateTime<Utc>) -> String {
    match state {
        AuthState::NoToken => format!(
            "No usable cached token at {}; the next command will ask you to authorize",
            token_file.display()
        ),
        AuthState::TokenValid { token } | AuthState::Authenticated { token } => {
            match token.remaining(now) {
                Some(remaining) => format!(
                    "Token valid for another {}m{:02}s (expires {})",
                    remaining.num_minutes(),
                    remaining.num_seconds() % 60,
                    token
                        .expiry
                        .map(|e| e.to_rfc3339())
                        .unwrap_or_default()
                ),
                None => "Token valid".to_string(),
            }
        }
        AuthState::TokenExpiredRefreshable { .. } => {
            "Token expired; it will be refreshed silently on next use".to_string()
        }
        AuthState::TokenExpiredNoRefresh => {
            "Token expired and has no refresh token; the next command will ask you to authorize"
                .to_string()
        }
        AuthState::AwaitingInteractive => "Authorization in progress".to_string(),
    }
}
