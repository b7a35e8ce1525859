//! Local filesystem watcher feeding raw [`FsEvent`]s into the bus.

use crate::bus::queue::EventQueue;
use anyhow::{Context, Result};
use docsync_core::domain::{FsChangeKind, FsEvent};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Watches a folder recursively until dropped
pub struct LocalWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl LocalWatcher {
    pub fn new(root: impl Into<PathBuf>, queue: Arc<dyn EventQueue>) -> Result<Self> {
        let root = root.into();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for fs_event in translate(event) {
                        if let Err(e) = queue.add_event(fs_event.into()) {
                            debug!("Dropping filesystem event: {}", e);
                        }
                    }
                }
                Err(e) => warn!("File watcher error: {}", e),
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;
        info!("Watching {}", root.display());

        Ok(Self {
            root,
            _watcher: watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Map a notify event onto zero or more bus events
pub fn translate(event: Event) -> Vec<FsEvent> {
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Create(create) => {
            let hint = match create {
                CreateKind::File => Some(false),
                CreateKind::Folder => Some(true),
                _ => None,
            };
            with_hint(paths, FsChangeKind::Created, hint)
        }
        EventKind::Remove(remove) => {
            let hint = match remove {
                RemoveKind::File => Some(false),
                RemoveKind::Folder => Some(true),
                _ => None,
            };
            with_hint(paths, FsChangeKind::Deleted, hint)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            vec![FsEvent::moved(paths[0].clone(), paths[1].clone())]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => with_hint(paths, FsChangeKind::Deleted, None),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => with_hint(paths, FsChangeKind::Created, None),
        // Direction unknown: whatever still exists was created
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|path| {
                let kind = if path.exists() {
                    FsChangeKind::Created
                } else {
                    FsChangeKind::Deleted
                };
                FsEvent::new(kind, path)
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => with_hint(paths, FsChangeKind::Changed, None),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn with_hint(paths: Vec<PathBuf>, kind: FsChangeKind, hint: Option<bool>) -> Vec<FsEvent> {
    paths
        .into_iter()
        .map(|path| {
            let event = FsEvent::new(kind, path);
            match hint {
                Some(is_directory) => event.with_directory_hint(is_directory),
                None => event,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::DataChange;

    #[test]
    fn test_create_and_remove_carry_hints() {
        let created = translate(Event::new(EventKind::Create(CreateKind::Folder)).add_path("/sync/dir".into()));
        assert_eq!(created, vec![FsEvent::new(FsChangeKind::Created, "/sync/dir").with_directory_hint(true)]);

        let removed = translate(Event::new(EventKind::Remove(RemoveKind::File)).add_path("/sync/a.txt".into()));
        assert_eq!(removed, vec![FsEvent::new(FsChangeKind::Deleted, "/sync/a.txt").with_directory_hint(false)]);
    }

    #[test]
    fn test_rename_both_becomes_move() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/sync/old".into())
            .add_path("/sync/new".into());
        assert_eq!(translate(event), vec![FsEvent::moved("/sync/old", "/sync/new")]);
    }

    #[test]
    fn test_content_modification() {
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path("/sync/a".into());
        assert_eq!(translate(event), vec![FsEvent::new(FsChangeKind::Changed, "/sync/a")]);
    }

    #[test]
    fn test_access_ignored() {
        let event = Event::new(EventKind::Access(notify::event::AccessKind::Any)).add_path("/sync/a".into());
        assert!(translate(event).is_empty());
    }
}
