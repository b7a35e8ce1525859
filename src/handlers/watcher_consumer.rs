use crate::bus::handler::SyncEventHandler;
use crate::bus::priority::HandlerRole;
use crate::bus::queue::EventQueue;
use anyhow::Result;
use docsync_core::domain::{
    ChangeType, ContentChangeType, FsChangeKind, FsEvent, MovedFrom, ObjectEvent, ObjectKind, SyncEvent,
};
use docsync_core::ports::MetaDataStorage;
use std::sync::Arc;
use tracing::trace;

/// Turns raw filesystem notifications into local object events
pub struct WatcherConsumer {
    storage: Arc<dyn MetaDataStorage>,
    queue: Arc<dyn EventQueue>,
}

impl WatcherConsumer {
    pub fn new(storage: Arc<dyn MetaDataStorage>, queue: Arc<dyn EventQueue>) -> Self {
        Self { storage, queue }
    }

    fn translate(&self, fs: &FsEvent) -> Result<Option<ObjectEvent>> {
        let path = Some(fs.path().to_path_buf());
        let event = match fs.kind() {
            FsChangeKind::Created if fs.is_directory() => {
                ObjectEvent::folder(path, None, ChangeType::Created, ChangeType::None)?
            }
            FsChangeKind::Created => ObjectEvent::file(path, None, ChangeType::Created, ChangeType::None)?
                .with_content(ContentChangeType::Created),
            // Folder timestamps change with their children
            FsChangeKind::Changed if fs.is_directory() => return Ok(None),
            FsChangeKind::Changed => ObjectEvent::file(path, None, ChangeType::Changed, ChangeType::None)?
                .with_content(ContentChangeType::Changed),
            FsChangeKind::Deleted => {
                let kind = match self.storage.get_by_local_path(fs.path())? {
                    Some(stored) => stored.kind,
                    None => ObjectKind::from_is_file(!fs.is_directory()),
                };
                match kind {
                    ObjectKind::File => ObjectEvent::file(path, None, ChangeType::Deleted, ChangeType::None)?
                        .with_content(ContentChangeType::Deleted),
                    ObjectKind::Folder => ObjectEvent::folder(path, None, ChangeType::Deleted, ChangeType::None)?,
                }
            }
            FsChangeKind::Renamed => {
                let moved_from = MovedFrom {
                    old_local_path: fs.old_path().map(|p| p.to_path_buf()),
                    old_remote_path: None,
                };
                let event = if fs.is_directory() {
                    ObjectEvent::folder(path, None, ChangeType::Moved, ChangeType::None)?
                } else {
                    ObjectEvent::file(path, None, ChangeType::Moved, ChangeType::None)?
                };
                event.with_moved_from(moved_from)
            }
        };
        Ok(Some(event))
    }
}

impl SyncEventHandler for WatcherConsumer {
    fn priority(&self) -> i32 {
        HandlerRole::WatcherConsumer.priority()
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        let SyncEvent::Fs(fs) = event else {
            return Ok(false);
        };
        match self.translate(fs)? {
            Some(object) => self.queue.add_event(object.into())?,
            None => trace!("Dropping {}", fs),
        }
        Ok(true)
    }

    fn name(&self) -> &str {
        "WatcherConsumer"
    }
}
