//! Google Drive v3 REST backend.
//!
//! Talks to Drive with a ready OAuth bearer token; obtaining the token
//! (service-account JWT exchange, user consent, …) is the caller's business.
//!
//! | Primitive        | Drive call |
//! |------------------|------------|
//! | `authenticate`   | `GET  /drive/v3/about?fields=user` |
//! | `list`           | `GET  /drive/v3/files?q=…` (paged) |
//! | `create_folder`  | `POST /drive/v3/files` with the folder MIME type |
//! | `create_file`    | `POST /upload/drive/v3/files?uploadType=multipart` |
//! | `update_file`    | `PATCH /upload/drive/v3/files/{id}?uploadType=media` |
//! | `fetch_metadata` | `GET  /drive/v3/files/{id}` |
//! | `download`       | `GET  /drive/v3/files/{id}?alt=media` |
//! | `delete`         | `DELETE /drive/v3/files/{id}` |
//!
//! Every call sets `supportsAllDrives` so shared drives work. HTTP 409 and
//! 412 map to [`StoreError::Conflict`].

use super::backend::{Entry, EntryFilter, EntryKind, FileId, FolderId, StoreBackend};
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const ENTRY_FIELDS: &str = "id,name,mimeType,version";
const MULTIPART_BOUNDARY_BASE: &str = "pdf-intake-multipart-boundary";

/// Drive file resource, restricted to the fields we request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    /// Drive serialises int64 fields as strings.
    #[serde(default)]
    version: Option<String>,
}

impl From<DriveFile> for Entry {
    fn from(f: DriveFile) -> Self {
        let kind = if f.mime_type == FOLDER_MIME {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        Entry {
            id: f.id,
            name: f.name,
            kind,
            mime_type: f.mime_type,
            version: f.version.and_then(|v| v.parse().ok()).unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

/// A [`StoreBackend`] backed by Google Drive.
#[derive(Clone)]
pub struct DriveBackend {
    client: Client,
    token: String,
}

impl fmt::Debug for DriveBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveBackend")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl DriveBackend {
    /// Build a backend for the given bearer token.
    ///
    /// `timeout` bounds every individual HTTP request.
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            token: token.into(),
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .query(&[("supportsAllDrives", "true")])
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, StoreError> {
        let response = self.authed(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response.text().await.unwrap_or_default();
        debug!("Drive {} failed: HTTP {} {}", what, status, detail);
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized { detail },
            StatusCode::NOT_FOUND => StoreError::NotFound {
                what: what.to_string(),
            },
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => StoreError::Conflict {
                name: what.to_string(),
            },
            _ => StoreError::Http {
                status: status.as_u16(),
                detail,
            },
        })
    }

    async fn send_for_entry(&self, request: RequestBuilder, what: &str) -> Result<Entry, StoreError> {
        let file: DriveFile = self.send(request, what).await?.json().await?;
        Ok(file.into())
    }
}

/// Drive `q` expression for the children of `parent` matching `filter`.
fn list_query(parent: &FolderId, filter: &EntryFilter) -> String {
    let mut q = format!("'{}' in parents and trashed = false", escape(parent.as_str()));
    if let Some(name) = &filter.name {
        q.push_str(&format!(" and name = '{}'", escape(name)));
    }
    match filter.kind {
        Some(EntryKind::Folder) => q.push_str(&format!(" and mimeType = '{FOLDER_MIME}'")),
        Some(EntryKind::File) => q.push_str(&format!(" and mimeType != '{FOLDER_MIME}'")),
        None => {}
    }
    q
}

/// Escape a literal for a Drive query string.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// A multipart boundary that occurs nowhere in `parts`.
fn boundary_for(parts: &[&[u8]]) -> String {
    let mut seq: u32 = 0;
    loop {
        let candidate = format!("{MULTIPART_BOUNDARY_BASE}-{seq:08x}");
        let needle = candidate.as_bytes();
        if !parts
            .iter()
            .any(|part| part.windows(needle.len()).any(|w| w == needle))
        {
            return candidate;
        }
        seq += 1;
    }
}

/// `multipart/related` body: JSON metadata part followed by the media part.
fn multipart_body(boundary: &str, metadata: &str, mime_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
             --{boundary}\r\nContent-Type: {mime_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[async_trait]
impl StoreBackend for DriveBackend {
    async fn authenticate(&self) -> Result<(), StoreError> {
        let url = format!("{API_BASE}/about");
        self.send(self.client.get(url).query(&[("fields", "user")]), "about")
            .await
            .map(|_| ())
    }

    async fn list(&self, parent: &FolderId, filter: &EntryFilter) -> Result<Vec<Entry>, StoreError> {
        let url = format!("{API_BASE}/files");
        let q = list_query(parent, filter);
        let fields = format!("nextPageToken,files({ENTRY_FIELDS})");
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).query(&[
                ("q", q.as_str()),
                ("fields", fields.as_str()),
                ("includeItemsFromAllDrives", "true"),
                ("pageSize", "1000"),
            ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: FileList = self.send(request, &q).await?.json().await?;
            entries.extend(page.files.into_iter().map(Entry::from));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Drive list [{}] → {} entries", q, entries.len());
        Ok(entries)
    }

    async fn create_folder(&self, parent: &FolderId, name: &str) -> Result<Entry, StoreError> {
        let url = format!("{API_BASE}/files");
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent.as_str()],
        });
        let request = self
            .client
            .post(url)
            .query(&[("fields", ENTRY_FIELDS)])
            .json(&metadata);
        self.send_for_entry(request, name).await
    }

    async fn create_file(
        &self,
        parent: &FolderId,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<Entry, StoreError> {
        let url = format!("{UPLOAD_BASE}/files");
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": mime_type,
            "parents": [parent.as_str()],
        })
        .to_string();
        let boundary = boundary_for(&[metadata.as_bytes(), content.as_slice()]);
        let request = self
            .client
            .post(url)
            .query(&[("uploadType", "multipart"), ("fields", ENTRY_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(multipart_body(&boundary, &metadata, mime_type, &content));
        self.send_for_entry(request, name).await
    }

    async fn update_file(&self, entry: &Entry, mime_type: &str, content: Vec<u8>) -> Result<Entry, StoreError> {
        let url = format!("{UPLOAD_BASE}/files/{}", entry.id);
        let request = self
            .client
            .patch(url)
            .query(&[("uploadType", "media"), ("fields", ENTRY_FIELDS)])
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(content);
        self.send_for_entry(request, &entry.name).await
    }

    async fn fetch_metadata(&self, id: &FileId) -> Result<Entry, StoreError> {
        let url = format!("{API_BASE}/files/{id}");
        let request = self.client.get(url).query(&[("fields", ENTRY_FIELDS)]);
        self.send_for_entry(request, id.as_str()).await
    }

    async fn download(&self, id: &FileId) -> Result<Vec<u8>, StoreError> {
        let url = format!("{API_BASE}/files/{id}");
        let request = self.client.get(url).query(&[("alt", "media")]);
        let bytes = self.send(request, id.as_str()).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let url = format!("{API_BASE}/files/{id}");
        self.send(self.client.delete(url), id).await.map(|_| ())
    }
}
