//! Google Drive v3: folder metadata, child listing, media download, and the
//! recursive folder download built on them.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use google_auth::AuthenticatedClient;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::http::{check, json, send_error};

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Docs, Sheets, etc. have no binary content to download.
const GOOGLE_NATIVE_PREFIX: &str = "application/vnd.google-apps.";

const FILE_FIELDS: &str = "id,name,mimeType";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType)";
const PAGE_SIZE: &str = "1000";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    pub fn is_google_native(&self) -> bool {
        self.mime_type.starts_with(GOOGLE_NATIVE_PREFIX) && !self.is_folder()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

pub struct DriveApi {
    client: AuthenticatedClient,
    base_url: String,
}

impl DriveApi {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self::with_base_url(client, DRIVE_API_BASE)
    }

    pub fn with_base_url(client: AuthenticatedClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `files.get` metadata for one file or folder.
    pub async fn get_file(&self, file_id: &str) -> Result<DriveFile> {
        let url = format!("{}/files/{file_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .await?
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(send_error)?;
        json(response).await
    }

    /// All direct children of a folder, following `nextPageToken`.
    pub async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>> {
        let url = format!("{}/files", self.base_url);
        let query = format!("'{folder_id}' in parents");
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).await?.query(&[
                ("q", query.as_str()),
                ("fields", LIST_FIELDS),
                ("pageSize", PAGE_SIZE),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: FileList = json(request.send().await.map_err(send_error)?).await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(folder_id, count = files.len(), "listed folder");
        Ok(files)
    }

    /// Stream a file's content to `dest`, via `<dest>.part` so an
    /// interrupted download is never mistaken for a finished one.
    pub async fn download(&self, file_id: &str, dest: &Path) -> Result<u64> {
        let url = format!("{}/files/{file_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .await?
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(send_error)?;
        let response = check(response).await?;

        let part = part_path(dest);
        let mut file = tokio::fs::File::create(&part)
            .await
            .map_err(|e| Error::Io(format!("creating {}: {e}", part.display())))?;

        let mut stream = response.bytes_stream();
        let copied: Result<u64> = async {
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(send_error)?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| Error::Io(format!("writing {}: {e}", part.display())))?;
                written += chunk.len() as u64;
            }
            file.flush()
                .await
                .map_err(|e| Error::Io(format!("flushing {}: {e}", part.display())))?;
            Ok(written)
        }
        .await;
        drop(file);

        let written = match copied {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| Error::Io(format!("renaming {}: {e}", part.display())))?;
        Ok(written)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Extract a folder id from a Drive link (`.../folders/<id>` or `...?id=<id>`),
/// or accept a bare id.
pub fn folder_id_from_link(link: &str) -> Option<String> {
    let link = link.trim();
    let Ok(url) = reqwest::Url::parse(link) else {
        return valid_id(link).or_else(|| id_after_marker(link));
    };

    if let Some((_, id)) = url.query_pairs().find(|(key, _)| key == "id") {
        return valid_id(&id);
    }

    let mut segments = url.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "folders" {
            return segments.next().and_then(valid_id);
        }
    }
    None
}

/// Scheme-less links: the id-character run after `folders/` or `id=`.
fn id_after_marker(link: &str) -> Option<String> {
    ["folders/", "id="].iter().find_map(|marker| {
        let (_, rest) = link.split_once(*marker)?;
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        valid_id(&rest[..end])
    })
}

fn valid_id(candidate: &str) -> Option<String> {
    let valid = !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| candidate.to_string())
}

/// Make a Drive name safe to use as a single path component.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Outcome counts of a folder download.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub folders: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Download the folder behind `link` into `output/<folder name>`, recursing
/// into subfolders. Existing local files are skipped.
pub async fn download_folder(api: &DriveApi, link: &str, output: &Path) -> Result<DownloadSummary> {
    let folder_id = folder_id_from_link(link).ok_or_else(|| Error::InvalidLink(link.to_string()))?;
    let folder = api.get_file(&folder_id).await?;
    info!(folder = %folder.name, "downloading folder");

    let root = output.join(sanitize_name(&folder.name));
    let mut summary = DownloadSummary::default();
    let mut pending = vec![(folder.id, root.clone())];

    while let Some((id, local)) = pending.pop() {
        let is_root = local == root;

        let prepared = match tokio::fs::create_dir_all(&local).await {
            Ok(()) => api.list_children(&id).await,
            Err(e) => Err(Error::Io(format!("creating {}: {e}", local.display()))),
        };
        let children = match prepared {
            Ok(children) => children,
            Err(e) if is_root || e.is_auth_failure() => return Err(e),
            Err(e) => {
                warn!(path = %local.display(), error = %e, "error downloading folder");
                summary.failed += 1;
                continue;
            }
        };
        summary.folders += 1;

        for child in children {
            let path = local.join(sanitize_name(&child.name));

            if child.is_folder() {
                info!(folder = %child.name, "entering folder");
                pending.push((child.id, path));
                continue;
            }

            if child.is_google_native() {
                warn!(file = %child.name, mime_type = %child.mime_type, "skipping Google-native document, it has no downloadable content");
                summary.failed += 1;
                continue;
            }

            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                info!(file = %child.name, "skipping existing file");
                summary.skipped += 1;
                continue;
            }

            match api.download(&child.id, &path).await {
                Ok(bytes) => {
                    info!(file = %child.name, bytes, "downloaded");
                    summary.downloaded += 1;
                }
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    warn!(file = %child.name, error = %e, "error downloading file");
                    summary.failed += 1;
                }
            }
        }
    }

    Ok(summary)
}
