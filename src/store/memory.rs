//! In-process [`StoreBackend`] with the same version semantics as a real store.
//!
//! Files carry a version that every write bumps; `update_file` with a stale
//! version reports a conflict, exactly like a remote store would when another
//! writer got there first. Tests can also inject conflicts and authentication
//! failures, and inspect the log of mutating operations.

use super::backend::{Entry, EntryFilter, EntryKind, FileId, FolderId, StoreBackend};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// A mutating call recorded by [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    CreateFolder { parent: String, name: String },
    CreateFile { parent: String, name: String },
    UpdateFile { id: String, name: String },
    Delete { id: String, name: String },
}

#[derive(Debug, Clone)]
struct Node {
    entry: Entry,
    parent: String,
    content: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    roots: HashSet<String>,
    nodes: BTreeMap<String, Node>,
    next_id: u64,
    pending_conflicts: u32,
    pending_auth_failures: u32,
    ops: Vec<StoreOp>,
}

impl State {
    fn is_folder(&self, id: &str) -> bool {
        self.roots.contains(id)
            || self
                .nodes
                .get(id)
                .is_some_and(|n| n.entry.kind == EntryKind::Folder)
    }

    fn insert(&mut self, parent: &str, name: &str, kind: EntryKind, mime_type: &str, content: Vec<u8>) -> Entry {
        self.next_id += 1;
        let entry = Entry {
            id: format!("mem-{}", self.next_id),
            name: name.to_string(),
            kind,
            mime_type: mime_type.to_string(),
            version: 1,
        };
        self.nodes.insert(
            entry.id.clone(),
            Node {
                entry: entry.clone(),
                parent: parent.to_string(),
                content,
            },
        );
        entry
    }

    fn remove_tree(&mut self, id: &str) {
        let children: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == id)
            .map(|(child, _)| child.clone())
            .collect();
        for child in children {
            self.remove_tree(&child);
        }
        self.nodes.remove(id);
    }
}

/// In-memory file store rooted at a set of well-known folder ids.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    /// A store whose top-level folders have the given ids.
    pub fn with_roots<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = State {
            roots: roots.into_iter().map(Into::into).collect(),
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked mid-call.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Put a file in place without recording an operation.
    pub fn seed_file(&self, parent: &FolderId, name: &str, mime_type: &str, content: impl Into<Vec<u8>>) -> FileId {
        let mut state = self.lock();
        state.insert(parent.as_str(), name, EntryKind::File, mime_type, content.into()).file_id()
    }

    /// Put a folder in place without recording an operation.
    pub fn seed_folder(&self, parent: &FolderId, name: &str) -> FolderId {
        let mut state = self.lock();
        state.insert(parent.as_str(), name, EntryKind::Folder, FOLDER_MIME, Vec::new()).folder_id()
    }

    /// Make the next `n` calls to `update_file` fail with a conflict.
    pub fn inject_conflicts(&self, n: u32) {
        self.lock().pending_conflicts = n;
    }

    /// Make the next `n` calls to `authenticate` fail.
    pub fn inject_auth_failures(&self, n: u32) {
        self.lock().pending_auth_failures = n;
    }

    /// Simulate another writer touching a file: bumps its version.
    pub fn touch(&self, id: &FileId) {
        if let Some(node) = self.lock().nodes.get_mut(id.as_str()) {
            node.entry.version += 1;
        }
    }

    /// Mutating operations performed so far, in order.
    pub fn ops(&self) -> Vec<StoreOp> {
        self.lock().ops.clone()
    }

    /// Direct children of `parent` as `(entry, content)`, in creation order.
    pub fn children(&self, parent: &FolderId) -> Vec<(Entry, Vec<u8>)> {
        let state = self.lock();
        let mut children: Vec<(u64, Entry, Vec<u8>)> = state
            .nodes
            .values()
            .filter(|n| n.parent == parent.as_str())
            .map(|n| (id_seq(&n.entry.id), n.entry.clone(), n.content.clone()))
            .collect();
        children.sort_by_key(|(seq, _, _)| *seq);
        children.into_iter().map(|(_, e, c)| (e, c)).collect()
    }

    /// Content of the single file `name` in `parent`, if exactly one exists.
    pub fn file_content(&self, parent: &FolderId, name: &str) -> Option<Vec<u8>> {
        let matches: Vec<Vec<u8>> = self
            .children(parent)
            .into_iter()
            .filter(|(e, _)| e.kind == EntryKind::File && e.name == name)
            .map(|(_, c)| c)
            .collect();
        match <[Vec<u8>; 1]>::try_from(matches) {
            Ok([content]) => Some(content),
            Err(_) => None,
        }
    }
}

fn id_seq(id: &str) -> u64 {
    id.trim_start_matches("mem-").parse().unwrap_or(0)
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn authenticate(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.pending_auth_failures > 0 {
            state.pending_auth_failures -= 1;
            return Err(StoreError::Unauthorized {
                detail: "injected authentication failure".into(),
            });
        }
        Ok(())
    }

    async fn list(&self, parent: &FolderId, filter: &EntryFilter) -> Result<Vec<Entry>, StoreError> {
        let state = self.lock();
        let mut entries: Vec<Entry> = state
            .nodes
            .values()
            .filter(|n| n.parent == parent.as_str() && filter.matches(&n.entry))
            .map(|n| n.entry.clone())
            .collect();
        entries.sort_by_key(|e| id_seq(&e.id));
        Ok(entries)
    }

    async fn create_folder(&self, parent: &FolderId, name: &str) -> Result<Entry, StoreError> {
        let mut state = self.lock();
        if !state.is_folder(parent.as_str()) {
            return Err(StoreError::NotFound {
                what: format!("folder {parent}"),
            });
        }
        state.ops.push(StoreOp::CreateFolder {
            parent: parent.0.clone(),
            name: name.to_string(),
        });
        Ok(state.insert(parent.as_str(), name, EntryKind::Folder, FOLDER_MIME, Vec::new()))
    }

    async fn create_file(
        &self,
        parent: &FolderId,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<Entry, StoreError> {
        let mut state = self.lock();
        if !state.is_folder(parent.as_str()) {
            return Err(StoreError::NotFound {
                what: format!("folder {parent}"),
            });
        }
        state.ops.push(StoreOp::CreateFile {
            parent: parent.0.clone(),
            name: name.to_string(),
        });
        Ok(state.insert(parent.as_str(), name, EntryKind::File, mime_type, content))
    }

    async fn update_file(&self, entry: &Entry, mime_type: &str, content: Vec<u8>) -> Result<Entry, StoreError> {
        let mut state = self.lock();
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            // The competing writer that caused the conflict bumped the version.
            if let Some(node) = state.nodes.get_mut(&entry.id) {
                node.entry.version += 1;
            }
            return Err(StoreError::Conflict {
                name: entry.name.clone(),
            });
        }

        let node = state.nodes.get_mut(&entry.id).ok_or_else(|| StoreError::NotFound {
            what: format!("file {}", entry.id),
        })?;
        if node.entry.version != entry.version {
            return Err(StoreError::Conflict {
                name: entry.name.clone(),
            });
        }

        node.entry.version += 1;
        node.entry.mime_type = mime_type.to_string();
        node.content = content;
        let updated = node.entry.clone();
        state.ops.push(StoreOp::UpdateFile {
            id: updated.id.clone(),
            name: updated.name.clone(),
        });
        Ok(updated)
    }

    async fn fetch_metadata(&self, id: &FileId) -> Result<Entry, StoreError> {
        self.lock()
            .nodes
            .get(id.as_str())
            .map(|n| n.entry.clone())
            .ok_or_else(|| StoreError::NotFound {
                what: format!("file {id}"),
            })
    }

    async fn download(&self, id: &FileId) -> Result<Vec<u8>, StoreError> {
        self.lock()
            .nodes
            .get(id.as_str())
            .map(|n| n.content.clone())
            .ok_or_else(|| StoreError::NotFound {
                what: format!("file {id}"),
            })
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let name = state
            .nodes
            .get(id)
            .map(|n| n.entry.name.clone())
            .ok_or_else(|| StoreError::NotFound {
                what: id.to_string(),
            })?;
        state.remove_tree(id);
        state.ops.push(StoreOp::Delete {
            id: id.to_string(),
            name,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> FolderId {
        FolderId::new("root")
    }

    #[tokio::test]
    async fn create_under_unknown_parent_fails() {
        let store = MemoryBackend::with_roots(["root"]);
        let err = store
            .create_folder(&FolderId::new("nope"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = MemoryBackend::with_roots(["root"]);
        let id = store.seed_file(&root(), "a.csv", "text/csv", "x");
        let entry = store.fetch_metadata(&id).await.unwrap();
        store.touch(&id);
        let err = store
            .update_file(&entry, "text/csv", b"y".to_vec())
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let fresh = store.fetch_metadata(&id).await.unwrap();
        let updated = store.update_file(&fresh, "text/csv", b"y".to_vec()).await.unwrap();
        assert_eq!(updated.version, fresh.version + 1);
        assert_eq!(store.download(&id).await.unwrap(), b"y");
    }

    #[tokio::test]
    async fn deleting_a_folder_removes_its_subtree() {
        let store = MemoryBackend::with_roots(["root"]);
        let folder = store.seed_folder(&root(), "user");
        let file = store.seed_file(&folder, "f.txt", "text/plain", "hi");
        store.delete(folder.as_str()).await.unwrap();
        assert!(store.fetch_metadata(&file).await.is_err());
        assert!(store.children(&root()).is_empty());
    }

    #[tokio::test]
    async fn injected_auth_failures_are_consumed() {
        let store = MemoryBackend::with_roots(["root"]);
        store.inject_auth_failures(1);
        assert!(store.authenticate().await.is_err());
        assert!(store.authenticate().await.is_ok());
    }

    #[tokio::test]
    async fn list_filters_by_kind() {
        let store = MemoryBackend::with_roots(["root"]);
        store.seed_folder(&root(), "same");
        store.seed_file(&root(), "same", "text/plain", "");
        let folders = store
            .list(&root(), &EntryFilter::folders_named("same"))
            .await
            .unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].kind, EntryKind::Folder);
    }
}
