use crate::bus::handler::SyncEventHandler;
use crate::bus::priority::HandlerRole;
use anyhow::{Context, Result};
use docsync_core::domain::{ContentChangeEvent, RemoteChangeKind, SyncEvent};
use docsync_core::ports::{MetaDataStorage, RemoteSession};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Wildcard name lists (`*` and `?`) for files and folders that never sync
#[derive(Debug, Clone)]
pub struct IgnoredNames {
    root: PathBuf,
    folders: Vec<Regex>,
    files: Vec<Regex>,
}

impl IgnoredNames {
    pub fn new(root: impl Into<PathBuf>, folders: &[String], files: &[String]) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            folders: compile(folders)?,
            files: compile(files)?,
        })
    }

    /// Nothing is ignored
    pub fn none(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            folders: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn is_ignored_folder_name(&self, name: &str) -> bool {
        self.folders.iter().any(|re| re.is_match(name))
    }

    pub fn is_ignored_file_name(&self, name: &str) -> bool {
        self.files.iter().any(|re| re.is_match(name))
    }

    /// Whether `path` or any folder between the sync root and it is ignored.
    /// Paths outside the root are never ignored.
    pub fn is_ignored(&self, path: &Path, is_directory: bool) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        let names: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let Some((last, parents)) = names.split_last() else {
            return false;
        };

        if parents.iter().any(|name| self.is_ignored_folder_name(name)) {
            return true;
        }
        if is_directory {
            self.is_ignored_folder_name(last)
        } else {
            self.is_ignored_file_name(last)
        }
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            let escaped = regex::escape(pattern).replace(r"\*", ".*").replace(r"\?", ".");
            Regex::new(&format!("^{}$", escaped)).with_context(|| format!("Invalid ignore pattern: {}", pattern))
        })
        .collect()
}

/// Drops filesystem and object events for ignored names
pub struct IgnoredNamesFilter {
    names: Arc<IgnoredNames>,
}

impl IgnoredNamesFilter {
    pub fn new(names: Arc<IgnoredNames>) -> Self {
        Self { names }
    }
}

impl SyncEventHandler for IgnoredNamesFilter {
    fn priority(&self) -> i32 {
        HandlerRole::IgnoredNamesFilter.priority()
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        let ignored = match event {
            SyncEvent::Fs(fs) => {
                self.names.is_ignored(fs.path(), fs.is_directory())
                    || fs
                        .old_path()
                        .is_some_and(|old| self.names.is_ignored(old, fs.is_directory()))
            }
            SyncEvent::Object(object) => {
                let by_path = object
                    .local_path()
                    .is_some_and(|path| self.names.is_ignored(path, !object.is_file()));
                let by_name = object.remote_object().is_some_and(|remote| {
                    if remote.is_file() {
                        self.names.is_ignored_file_name(&remote.name)
                    } else {
                        self.names.is_ignored_folder_name(&remote.name)
                    }
                });
                by_path || by_name
            }
            _ => false,
        };

        if ignored {
            debug!("Ignoring {}", event);
        }
        Ok(ignored)
    }

    fn name(&self) -> &str {
        "IgnoredNamesFilter"
    }
}

/// Drops remote change log entries the metadata store already reflects
pub struct IgnoreAlreadyHandledContentChangeEventsFilter {
    session: Arc<dyn RemoteSession>,
    storage: Arc<dyn MetaDataStorage>,
}

impl IgnoreAlreadyHandledContentChangeEventsFilter {
    pub fn new(session: Arc<dyn RemoteSession>, storage: Arc<dyn MetaDataStorage>) -> Self {
        Self { session, storage }
    }

    fn already_handled(&self, event: &ContentChangeEvent) -> Result<bool> {
        let stored = self.storage.get_by_remote_id(event.object_id())?;
        match event.kind() {
            // Nothing to delete for an object we never synced
            RemoteChangeKind::Deleted => Ok(stored.is_none()),
            RemoteChangeKind::Created | RemoteChangeKind::Updated => {
                let Some(stored) = stored else {
                    return Ok(false);
                };
                let Some(remote) = event.resolve(self.session.as_ref())? else {
                    return Ok(false);
                };
                Ok(stored.last_change_token.is_some() && stored.last_change_token == remote.change_token)
            }
            RemoteChangeKind::Security => Ok(false),
        }
    }
}

impl SyncEventHandler for IgnoreAlreadyHandledContentChangeEventsFilter {
    fn priority(&self) -> i32 {
        HandlerRole::IgnoreAlreadyHandledFilter.priority()
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        let SyncEvent::ContentChange(change) = event else {
            return Ok(false);
        };
        let handled = self.already_handled(change)?;
        if handled {
            debug!("Already handled: {}", change);
        }
        Ok(handled)
    }

    fn name(&self) -> &str {
        "IgnoreAlreadyHandledContentChangeEventsFilter"
    }
}
