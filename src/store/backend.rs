//! Primitive operations a remote file store must provide.
//!
//! Backends stay deliberately dumb: list, create, update, delete. The
//! overwrite and retry protocols live once in [`super::RemoteStore`] so every
//! backend gets the same partial-failure behaviour.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle of a folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub String);

/// Opaque handle of a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub String);

impl FolderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Folder,
    File,
}

/// Metadata of one folder or file as the backend last reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
    pub mime_type: String,
    /// Monotonic revision counter; a stale value makes `update_file` conflict.
    pub version: u64,
}

impl Entry {
    pub fn folder_id(&self) -> FolderId {
        FolderId(self.id.clone())
    }

    pub fn file_id(&self) -> FileId {
        FileId(self.id.clone())
    }
}

/// Narrow a directory listing. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub name: Option<String>,
    pub kind: Option<EntryKind>,
}

impl EntryFilter {
    pub fn folders_named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            kind: Some(EntryKind::Folder),
        }
    }

    pub fn files_named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            kind: Some(EntryKind::File),
        }
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        self.name.as_ref().is_none_or(|n| *n == entry.name)
            && self.kind.is_none_or(|k| k == entry.kind)
    }
}

/// A remote hierarchical file store without transactions.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Check that the configured credentials are accepted.
    async fn authenticate(&self) -> Result<(), StoreError>;

    /// Non-trashed direct children of `parent` matching `filter`.
    async fn list(&self, parent: &FolderId, filter: &EntryFilter) -> Result<Vec<Entry>, StoreError>;

    async fn create_folder(&self, parent: &FolderId, name: &str) -> Result<Entry, StoreError>;

    async fn create_file(
        &self,
        parent: &FolderId,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<Entry, StoreError>;

    /// Replace the content of an existing file, keeping its identity.
    ///
    /// Returns [`StoreError::Conflict`] when the file changed since `entry`
    /// was read.
    async fn update_file(
        &self,
        entry: &Entry,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<Entry, StoreError>;

    /// Re-read the metadata of a file (fresh version).
    async fn fetch_metadata(&self, id: &FileId) -> Result<Entry, StoreError>;

    async fn download(&self, id: &FileId) -> Result<Vec<u8>, StoreError>;

    /// Delete a file or a folder (and everything under it).
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
