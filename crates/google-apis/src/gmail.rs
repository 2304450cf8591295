//! Gmail v1: message search, trash, and the spam triage run.

use google_auth::AuthenticatedClient;
use reqwest::header::CONTENT_LENGTH;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::http::{check, json, send_error};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// The authenticated user.
const ME: &str = "me";

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

pub struct GmailApi {
    client: AuthenticatedClient,
    base_url: String,
}

impl GmailApi {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self::with_base_url(client, GMAIL_API_BASE)
    }

    pub fn with_base_url(client: AuthenticatedClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Every message matching a Gmail search query, across all pages.
    pub async fn search(&self, query: &str) -> Result<Vec<MessageRef>> {
        let url = format!("{}/users/{ME}/messages", self.base_url);
        let mut messages = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).await?.query(&[("q", query)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: MessageList = json(request.send().await.map_err(send_error)?).await?;
            messages.extend(page.messages);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(query, count = messages.len(), "search complete");
        Ok(messages)
    }

    /// Move one message to the trash.
    pub async fn trash(&self, message_id: &str) -> Result<()> {
        let url = format!("{}/users/{ME}/messages/{message_id}/trash", self.base_url);
        let response = self
            .client
            .post(&url)
            .await?
            .header(CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(send_error)?;
        check(response).await?;
        Ok(())
    }
}

fn unread_from(sender: &str) -> String {
    format!("is:unread from:{sender}")
}

/// Outcome for one sender.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SenderReport {
    pub sender: String,
    pub matched: usize,
    pub trashed: usize,
    pub failed: usize,
    /// Set when the search itself failed; no messages were touched.
    pub search_error: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TriageSummary {
    pub senders: Vec<SenderReport>,
}

impl TriageSummary {
    pub fn total_trashed(&self) -> usize {
        self.senders.iter().map(|s| s.trashed).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.senders
            .iter()
            .map(|s| s.failed + usize::from(s.search_error.is_some()))
            .sum()
    }
}

/// Trash every unread message from each sender in turn.
///
/// A failed search or trash is logged and the run moves on; an
/// authentication failure ends it.
pub async fn trash_unread_from(api: &GmailApi, senders: &[String]) -> Result<TriageSummary> {
    let mut summary = TriageSummary::default();

    for sender in senders.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let mut report = SenderReport {
            sender: sender.to_string(),
            ..SenderReport::default()
        };

        let messages = match api.search(&unread_from(sender)).await {
            Ok(messages) => messages,
            Err(e) if e.is_auth_failure() => return Err(e),
            Err(e) => {
                warn!(sender, error = %e, "error searching messages");
                report.search_error = Some(e.to_string());
                summary.senders.push(report);
                continue;
            }
        };
        report.matched = messages.len();

        for message in &messages {
            match api.trash(&message.id).await {
                Ok(()) => {
                    debug!(sender, message_id = %message.id, "moved to trash");
                    report.trashed += 1;
                }
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    warn!(sender, message_id = %message.id, error = %e, "error trashing message");
                    report.failed += 1;
                }
            }
        }

        info!(sender, trashed = report.trashed, "processed sender");
        summary.senders.push(report);
    }

    Ok(summary)
}
