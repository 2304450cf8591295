//! Thin Drive and Gmail wrappers plus the bulk operations built on them
//!
//! Both runners take an `AuthenticatedClient` and nothing else from the
//! auth layer. Per-item failures are logged and counted; authentication
//! failures abort the run, since the authenticator does not re-run mid-task.

pub mod drive;
pub mod error;
pub mod gmail;
mod http;

#[cfg(test)]
mod testing;

pub use drive::{DownloadSummary, DriveApi, DriveFile, download_folder, folder_id_from_link};
pub use error::{Error, Result};
pub use gmail::{GmailApi, SenderReport, TriageSummary, trash_unread_from};
