//! In-memory implementations of the remote session, metadata store and
//! extended attribute ports. They back the demo binary and the tests.

use anyhow::Result;
use docsync_core::domain::{
    ChangeLogBatch, ChangeLogEntry, MappedObject, RemoteChangeKind, RemoteObject, RepositoryCapabilities,
    RepositoryInfo,
};
use docsync_core::error::SyncError;
use docsync_core::ports::{ExtendedAttributes, MetaDataStorage, RemoteSession};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SessionState {
    info: RepositoryInfo,
    objects: HashMap<String, RemoteObject>,
    change_log: Vec<ChangeLogEntry>,
}

/// Remote repository held in memory. Change log tokens are the number of
/// entries recorded so far.
pub struct MemorySession {
    state: Mutex<SessionState>,
}

impl MemorySession {
    pub fn new(repository_id: impl Into<String>, capabilities: RepositoryCapabilities) -> Self {
        Self {
            state: Mutex::new(SessionState {
                info: RepositoryInfo {
                    id: repository_id.into(),
                    capabilities,
                    latest_change_log_token: Some("0".to_string()),
                },
                objects: HashMap::new(),
                change_log: Vec::new(),
            }),
        }
    }

    pub fn insert(&self, object: RemoteObject) {
        lock(&self.state).objects.insert(object.id.clone(), object);
    }

    pub fn remove(&self, id: &str) -> Option<RemoteObject> {
        lock(&self.state).objects.remove(id)
    }

    /// Append a change log entry and return the new latest token
    pub fn record_change(&self, kind: RemoteChangeKind, object_id: impl Into<String>) -> String {
        let mut state = lock(&self.state);
        state.change_log.push(ChangeLogEntry {
            kind,
            object_id: object_id.into(),
        });
        let token = state.change_log.len().to_string();
        state.info.latest_change_log_token = Some(token.clone());
        token
    }
}

impl RemoteSession for MemorySession {
    fn repository_info(&self) -> Result<RepositoryInfo> {
        Ok(lock(&self.state).info.clone())
    }

    fn get_object_by_path(&self, path: &str) -> Result<Option<RemoteObject>> {
        Ok(lock(&self.state)
            .objects
            .values()
            .find(|o| o.path.as_deref() == Some(path))
            .cloned())
    }

    fn get_object_by_id(&self, id: &str) -> Result<Option<RemoteObject>> {
        Ok(lock(&self.state).objects.get(id).cloned())
    }

    fn get_content_changes(&self, token: Option<&str>, max_items: usize) -> Result<ChangeLogBatch> {
        let state = lock(&self.state);
        let start = match token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|e| anyhow::anyhow!("invalid change log token {:?}: {}", token, e))?,
            None => 0,
        };
        let start = start.min(state.change_log.len());
        let end = (start + max_items.max(1)).min(state.change_log.len());
        Ok(ChangeLogBatch {
            entries: state.change_log[start..end].to_vec(),
            has_more: end < state.change_log.len(),
            latest_token: Some(end.to_string()),
        })
    }
}

#[derive(Default)]
struct StorageState {
    objects: HashMap<String, MappedObject>,
    change_log_token: Option<String>,
}

/// Metadata store held in memory, keyed by remote id. Paths are derived from
/// the parent chain below the root record.
pub struct MemoryStorage {
    local_root: PathBuf,
    remote_root: String,
    state: Mutex<StorageState>,
}

impl MemoryStorage {
    pub fn new(local_root: impl Into<PathBuf>, remote_root: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            state: Mutex::new(StorageState::default()),
        }
    }

    /// Names from the root (exclusive) down to `object`, or `None` when the
    /// chain is broken
    fn names(state: &StorageState, object: &MappedObject) -> Option<Vec<String>> {
        let mut names = Vec::new();
        let mut current = object.clone();
        while !current.is_root() {
            names.push(current.name.clone());
            let parent_id = current.parent_id.as_ref()?;
            current = state.objects.get(parent_id)?.clone();
            if names.len() > state.objects.len() {
                return None;
            }
        }
        names.reverse();
        Some(names)
    }
}

impl MetaDataStorage for MemoryStorage {
    fn save_mapped_object(&self, object: &MappedObject) -> Result<()> {
        lock(&self.state)
            .objects
            .insert(object.remote_id.clone(), object.clone());
        Ok(())
    }

    fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<MappedObject>> {
        Ok(lock(&self.state).objects.get(remote_id).cloned())
    }

    fn get_by_local_path(&self, path: &Path) -> Result<Option<MappedObject>> {
        let Ok(relative) = path.strip_prefix(&self.local_root) else {
            return Ok(None);
        };
        let state = lock(&self.state);
        let Some(mut current) = state.objects.values().find(|o| o.is_root()).cloned() else {
            return Ok(None);
        };
        for component in relative.components() {
            let name = component.as_os_str().to_string_lossy();
            let child = state
                .objects
                .values()
                .find(|o| o.parent_id.as_deref() == Some(current.remote_id.as_str()) && o.name == name);
            match child {
                Some(child) => current = child.clone(),
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn get_local_path(&self, object: &MappedObject) -> Result<Option<PathBuf>> {
        let state = lock(&self.state);
        Ok(Self::names(&state, object).map(|names| {
            names
                .iter()
                .fold(self.local_root.clone(), |path, name| path.join(name))
        }))
    }

    fn get_remote_path(&self, object: &MappedObject) -> Result<Option<String>> {
        let state = lock(&self.state);
        Ok(Self::names(&state, object).map(|names| {
            if names.is_empty() {
                self.remote_root.clone()
            } else {
                format!("{}/{}", self.remote_root.trim_end_matches('/'), names.join("/"))
            }
        }))
    }

    fn mapped_objects(&self) -> Result<Vec<MappedObject>> {
        Ok(lock(&self.state).objects.values().cloned().collect())
    }

    fn change_log_token(&self) -> Result<Option<String>> {
        Ok(lock(&self.state).change_log_token.clone())
    }

    fn set_change_log_token(&self, token: &str) -> Result<()> {
        lock(&self.state).change_log_token = Some(token.to_string());
        Ok(())
    }
}

/// Extended attributes held in memory. Built with
/// [`unsupported`](Self::unsupported) it behaves like a filesystem that
/// cannot store them; [`write_protected`](Self::write_protected) reads
/// nothing back and rejects writes.
pub struct MemoryExtendedAttributes {
    readable: bool,
    writable: bool,
    attributes: Mutex<HashMap<(PathBuf, String), String>>,
}

impl MemoryExtendedAttributes {
    pub fn new() -> Self {
        Self {
            readable: true,
            writable: true,
            attributes: Mutex::new(HashMap::new()),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            readable: false,
            writable: false,
            ..Self::new()
        }
    }

    pub fn write_protected() -> Self {
        Self {
            writable: false,
            ..Self::new()
        }
    }

    fn check(&self, path: &Path, allowed: bool) -> docsync_core::Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(SyncError::ExtendedAttributesNotSupported {
                path: path.to_path_buf(),
            })
        }
    }
}

impl Default for MemoryExtendedAttributes {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtendedAttributes for MemoryExtendedAttributes {
    fn get_attribute(&self, path: &Path, name: &str) -> docsync_core::Result<Option<String>> {
        self.check(path, self.readable)?;
        Ok(lock(&self.attributes)
            .get(&(path.to_path_buf(), name.to_string()))
            .cloned())
    }

    fn set_attribute(&self, path: &Path, name: &str, value: &str) -> docsync_core::Result<()> {
        self.check(path, self.writable)?;
        lock(&self.attributes).insert((path.to_path_buf(), name.to_string()), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_core::domain::{ObjectKind, ROOT_NAME};

    fn storage_with_tree() -> Result<MemoryStorage> {
        let storage = MemoryStorage::new("/home/me/Sync", "/Sites/docs");
        storage.save_mapped_object(&MappedObject::new(ROOT_NAME, "root", ObjectKind::Folder))?;
        storage.save_mapped_object(&MappedObject::new("a", "1", ObjectKind::Folder).with_parent("root"))?;
        storage.save_mapped_object(&MappedObject::new("b.txt", "2", ObjectKind::File).with_parent("1"))?;
        Ok(storage)
    }

    #[test]
    fn test_storage_paths() -> Result<()> {
        let storage = storage_with_tree()?;
        let file = storage.get_by_remote_id("2")?.expect("stored");
        assert_eq!(storage.get_local_path(&file)?, Some(PathBuf::from("/home/me/Sync/a/b.txt")));
        assert_eq!(storage.get_remote_path(&file)?.as_deref(), Some("/Sites/docs/a/b.txt"));

        let root = storage.get_by_remote_id("root")?.expect("stored");
        assert_eq!(storage.get_local_path(&root)?, Some(PathBuf::from("/home/me/Sync")));
        assert_eq!(storage.get_remote_path(&root)?.as_deref(), Some("/Sites/docs"));
        Ok(())
    }

    #[test]
    fn test_storage_lookup_by_local_path() -> Result<()> {
        let storage = storage_with_tree()?;
        let found = storage.get_by_local_path(Path::new("/home/me/Sync/a/b.txt"))?;
        assert_eq!(found.map(|o| o.remote_id), Some("2".to_string()));
        assert!(storage.get_by_local_path(Path::new("/home/me/Sync/missing"))?.is_none());
        assert!(storage.get_by_local_path(Path::new("/elsewhere"))?.is_none());
        Ok(())
    }

    #[test]
    fn test_broken_chain_has_no_path() -> Result<()> {
        let storage = storage_with_tree()?;
        let orphan = MappedObject::new("lost", "9", ObjectKind::File).with_parent("nope");
        assert_eq!(storage.get_local_path(&orphan)?, None);
        Ok(())
    }

    #[test]
    fn test_session_change_log_paging() -> Result<()> {
        let session = MemorySession::new("repo", RepositoryCapabilities::default());
        for id in ["a", "b", "c"] {
            session.record_change(RemoteChangeKind::Created, id);
        }

        let first = session.get_content_changes(Some("0"), 2)?;
        assert_eq!(first.entries.len(), 2);
        assert!(first.has_more);

        let second = session.get_content_changes(first.latest_token.as_deref(), 2)?;
        assert_eq!(second.entries.len(), 1);
        assert_eq!(second.entries[0].object_id, "c");
        assert!(!second.has_more);
        assert_eq!(second.latest_token.as_deref(), Some("3"));
        Ok(())
    }

    #[test]
    fn test_unsupported_attributes() {
        let attributes = MemoryExtendedAttributes::unsupported();
        let result = attributes.set_attribute(Path::new("/x"), "user.id", "1");
        assert!(matches!(result, Err(SyncError::ExtendedAttributesNotSupported { .. })));
    }

    #[test]
    fn test_write_protected_attributes() -> Result<()> {
        let attributes = MemoryExtendedAttributes::write_protected();
        assert_eq!(attributes.get_attribute(Path::new("/x"), "user.id")?, None);
        let result = attributes.set_attribute(Path::new("/x"), "user.id", "1");
        assert!(matches!(result, Err(SyncError::ExtendedAttributesNotSupported { .. })));
        Ok(())
    }
}
