//! Remote file store: folders, single-identity files, and the ledger table.
//!
//! The store has no transactions, so every multi-step write is an explicit
//! protocol with a known partial-failure window:
//!
//! | Operation                   | Protocol                                  | Window |
//! |-----------------------------|-------------------------------------------|--------|
//! | [`RemoteStore::ensure_folder`] | list → create if absent                | two concurrent callers can both create |
//! | [`RemoteStore::write_file`]    | list → delete every match → create     | readers may see no file |
//! | [`RemoteStore::write_tabular_with_retry`] | update first match in place, retry on conflict | duplicates removed after the write |
//!
//! ## Submodules
//!
//! * [`backend`] — the primitive [`StoreBackend`] trait and handle types
//! * [`memory`]  — in-process backend for tests and dry runs
//! * [`drive`]   — Google Drive v3 REST backend
//! * [`tabular`] — the CSV [`Table`] the ledger is stored as

pub mod backend;
pub mod drive;
pub mod memory;
pub mod tabular;

pub use backend::{Entry, EntryFilter, EntryKind, FileId, FolderId, StoreBackend};
pub use tabular::Table;

use crate::config::{AuthPolicy, RetryPolicy};
use crate::error::{IntakeError, StoreError};
use serde::{Deserialize, Serialize};
use tabular::{CSV_MIME, CSV_MIME_TYPES};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// A file the store has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub id: FileId,
    pub name: String,
    pub folder: FolderId,
}

impl FileHandle {
    fn from_entry(entry: &Entry, folder: &FolderId) -> Self {
        Self {
            id: entry.file_id(),
            name: entry.name.clone(),
            folder: folder.clone(),
        }
    }
}

/// High-level store operations shared by every backend.
///
/// Holds no state besides the backend; callers pass folder handles and a
/// freshly read ledger into each operation.
pub struct RemoteStore<B> {
    backend: B,
}

impl<B: StoreBackend> RemoteStore<B> {
    /// Wrap a backend without checking credentials.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Wrap a backend after it accepted our credentials.
    ///
    /// Tries `policy.max_attempts` times with a fixed delay in between.
    pub async fn connect(backend: B, policy: &AuthPolicy) -> Result<Self, IntakeError> {
        let attempts = policy.max_attempts.max(1);
        let mut last_err = String::new();

        for attempt in 1..=attempts {
            match backend.authenticate().await {
                Ok(()) => {
                    info!("Authenticated with the file store");
                    return Ok(Self { backend });
                }
                Err(e) => {
                    warn!("Authentication failed (attempt {}/{}): {}", attempt, attempts, e);
                    last_err = e.to_string();
                    if attempt < attempts {
                        sleep(policy.delay).await;
                    }
                }
            }
        }

        Err(IntakeError::AuthenticationFailed {
            attempts,
            detail: last_err,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Return the folder `name` directly under `parent`, creating it if absent.
    ///
    /// Not atomic: two callers racing on the same name can both create a
    /// folder. Later calls then pick the first one the backend lists.
    pub async fn ensure_folder(&self, parent: &FolderId, name: &str) -> Result<FolderId, StoreError> {
        let existing = self
            .backend
            .list(parent, &EntryFilter::folders_named(name))
            .await?;

        if let Some(folder) = existing.first() {
            if existing.len() > 1 {
                warn!(
                    "{} folders named '{}' under {}; using {}",
                    existing.len(),
                    name,
                    parent,
                    folder.id
                );
            }
            debug!("Found folder '{}' ({})", name, folder.id);
            return Ok(folder.folder_id());
        }

        let created = self.backend.create_folder(parent, name).await?;
        info!("Created folder '{}' ({}) under {}", name, created.id, parent);
        Ok(created.folder_id())
    }

    /// Store `content` as the only file called `name` in `folder`.
    ///
    /// Deletes every existing match first, then creates the new file. Between
    /// the two phases the folder holds no file with this name; a failure
    /// there leaves it that way.
    pub async fn write_file(
        &self,
        folder: &FolderId,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<FileHandle, StoreError> {
        let existing = self.backend.list(folder, &EntryFilter::files_named(name)).await?;
        for old in &existing {
            info!("Deleting existing file '{}' ({})", old.name, old.id);
            self.backend.delete(&old.id).await?;
        }

        let created = self
            .backend
            .create_file(folder, name, mime_type, content)
            .await?;
        info!("Uploaded '{}' ({}) to folder {}", name, created.id, folder);
        Ok(FileHandle::from_entry(&created, folder))
    }

    /// Read the CSV file `name` from `folder`.
    ///
    /// Only files with a CSV-family MIME type are read. `Ok(None)` means no
    /// file of that name exists. Same-named files that are all of another
    /// type are [`StoreError::MalformedTabular`]: the writer matches by name
    /// alone and would overwrite them.
    pub async fn read_tabular(&self, folder: &FolderId, name: &str) -> Result<Option<Table>, StoreError> {
        let candidates = self.backend.list(folder, &EntryFilter::files_named(name)).await?;
        let Some(file) = candidates
            .iter()
            .find(|e| CSV_MIME_TYPES.contains(&e.mime_type.as_str()))
        else {
            if let Some(other) = candidates.first() {
                warn!(
                    "'{}' ({}) in folder {} has MIME type {}, not CSV",
                    name, other.id, folder, other.mime_type
                );
                return Err(StoreError::MalformedTabular {
                    name: name.to_string(),
                    detail: format!("stored with MIME type {}, expected CSV", other.mime_type),
                });
            }
            info!("No CSV file '{}' in folder {}", name, folder);
            return Ok(None);
        };

        debug!("Reading '{}' ({}, {})", file.name, file.id, file.mime_type);
        let bytes = self.backend.download(&file.file_id()).await?;
        Table::from_csv(name, &bytes).map(Some)
    }

    /// Write `table` as the CSV file `name` in `folder`, retrying on conflicts.
    ///
    /// An existing file is updated in place so its identity survives. When
    /// the backend reports a conflict on attempt `k`, waits
    /// `2^k × policy.backoff_unit`, refreshes the file's metadata and tries
    /// again. After `policy.max_attempts` conflicts returns
    /// [`StoreError::MaxRetriesExceeded`]; any other error is returned at once.
    pub async fn write_tabular_with_retry(
        &self,
        folder: &FolderId,
        name: &str,
        table: &Table,
        policy: &RetryPolicy,
    ) -> Result<FileHandle, StoreError> {
        let content = table.to_csv()?;
        let existing = self.backend.list(folder, &EntryFilter::files_named(name)).await?;

        let Some((first, duplicates)) = existing.split_first() else {
            let created = self
                .backend
                .create_file(folder, name, CSV_MIME, content)
                .await?;
            info!("Created '{}' ({}) in folder {}", name, created.id, folder);
            return Ok(FileHandle::from_entry(&created, folder));
        };

        info!("Updating existing file '{}' ({})", first.name, first.id);
        let mut target = first.clone();
        let mut attempt = 0;
        let updated = loop {
            match self
                .backend
                .update_file(&target, CSV_MIME, content.clone())
                .await
            {
                Ok(entry) => break entry,
                Err(e) if e.is_conflict() => {
                    attempt += 1;
                    let wait = policy.backoff_unit * 2u32.pow(attempt);
                    warn!(
                        "Conflict writing '{}'; retrying in {:?} (attempt {}/{})",
                        name, wait, attempt, policy.max_attempts
                    );
                    sleep(wait).await;
                    if attempt >= policy.max_attempts {
                        return Err(StoreError::MaxRetriesExceeded {
                            name: name.to_string(),
                            attempts: attempt,
                        });
                    }
                    target = self.backend.fetch_metadata(&target.file_id()).await?;
                }
                Err(e) => return Err(e),
            }
        };

        for duplicate in duplicates {
            info!("Deleting duplicate file '{}' ({})", duplicate.name, duplicate.id);
            self.backend.delete(&duplicate.id).await?;
        }

        info!("Wrote '{}' ({}) in folder {}", name, updated.id, folder);
        Ok(FileHandle::from_entry(&updated, folder))
    }

    /// Delete the folder `name` under `parent` if there is one.
    ///
    /// Returns whether anything was deleted.
    pub async fn delete_folder_if_exists(&self, parent: &FolderId, name: &str) -> Result<bool, StoreError> {
        let folders = self
            .backend
            .list(parent, &EntryFilter::folders_named(name))
            .await?;
        if folders.is_empty() {
            debug!("No folder '{}' under {} to delete", name, parent);
            return Ok(false);
        }

        for folder in &folders {
            info!("Deleting folder '{}' ({})", folder.name, folder.id);
            self.backend.delete(&folder.id).await?;
        }
        Ok(true)
    }
}
