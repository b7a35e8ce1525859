use crate::bus::handler::SyncEventHandler;
use crate::bus::priority::HandlerRole;
use crate::bus::queue::EventQueue;
use anyhow::Result;
use docsync_core::domain::{create_event, ChangeType, ObjectEvent, SyncEvent};
use docsync_core::ports::MetaDataStorage;
use std::sync::Arc;
use tracing::debug;

/// Recognizes remote changes that are really moves or renames: the remote
/// object now has another parent or name than the store remembers. The
/// change is replaced by a moved event carrying the old remote path.
pub struct RemoteObjectMovedOrRenamedAccumulator {
    storage: Arc<dyn MetaDataStorage>,
    queue: Arc<dyn EventQueue>,
}

impl RemoteObjectMovedOrRenamedAccumulator {
    pub fn new(storage: Arc<dyn MetaDataStorage>, queue: Arc<dyn EventQueue>) -> Self {
        Self { storage, queue }
    }

    fn accumulate(&self, event: &ObjectEvent) -> Result<bool> {
        if event.remote() != ChangeType::Changed || event.is_moved() {
            return Ok(false);
        }
        let Some(remote) = event.remote_object() else {
            return Ok(false);
        };
        let Some(stored) = self.storage.get_by_remote_id(&remote.id)? else {
            return Ok(false);
        };
        if stored.is_root() || (stored.parent_id == remote.parent_id && stored.name == remote.name) {
            return Ok(false);
        }

        let old_remote_path = self.storage.get_remote_path(&stored)?;
        let local = match event.local_path() {
            Some(path) => Some(path.to_path_buf()),
            None => self.storage.get_local_path(&stored)?,
        };
        debug!(
            "{} moved or renamed remotely from {}",
            remote,
            old_remote_path.as_deref().unwrap_or("<unknown>")
        );
        let moved = create_event(
            event.is_file(),
            Some(remote.clone()),
            local,
            ChangeType::Moved,
            event.local(),
            old_remote_path,
            None,
        )?;
        self.queue.add_event(moved)?;
        Ok(true)
    }
}

impl SyncEventHandler for RemoteObjectMovedOrRenamedAccumulator {
    fn priority(&self) -> i32 {
        HandlerRole::MovedOrRenamedAccumulator.priority()
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        match event {
            SyncEvent::Object(object) => self.accumulate(object),
            _ => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "RemoteObjectMovedOrRenamedAccumulator"
    }
}
