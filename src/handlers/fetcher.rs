use crate::bus::handler::SyncEventHandler;
use crate::bus::priority::HandlerRole;
use anyhow::Result;
use docsync_core::domain::{ChangeType, ObjectEvent, SyncEvent};
use docsync_core::ports::{MetaDataStorage, RemoteSession};
use std::sync::Arc;
use tracing::{debug, trace};

/// Fills in the remote object of local object events, so later handlers
/// can compare both sides. Never consumes.
pub struct RemoteObjectFetcher {
    session: Arc<dyn RemoteSession>,
    storage: Arc<dyn MetaDataStorage>,
}

impl RemoteObjectFetcher {
    pub fn new(session: Arc<dyn RemoteSession>, storage: Arc<dyn MetaDataStorage>) -> Self {
        Self { session, storage }
    }

    fn fetch(&self, event: &ObjectEvent) -> Result<()> {
        if event.remote_object().is_some() || event.remote() == ChangeType::Deleted {
            return Ok(());
        }

        let mut stored = match event.local_path() {
            Some(path) => self.storage.get_by_local_path(path)?,
            None => None,
        };
        // The store still knows a moved object by its old path
        if stored.is_none() {
            if let Some(old) = event.moved_from().and_then(|m| m.old_local_path.as_deref()) {
                stored = self.storage.get_by_local_path(old)?;
            }
        }
        let Some(stored) = stored else {
            trace!("No mapping for {}", event);
            return Ok(());
        };

        match self.session.get_object_by_id(&stored.remote_id)? {
            Some(remote) => {
                event.resolve_remote_object(remote);
            }
            None => debug!("Remote object {} of {} no longer exists", stored.remote_id, event),
        }
        Ok(())
    }
}

impl SyncEventHandler for RemoteObjectFetcher {
    fn priority(&self) -> i32 {
        HandlerRole::RemoteObjectFetcher.priority()
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        if let SyncEvent::Object(object) = event {
            self.fetch(object)?;
        }
        Ok(false)
    }

    fn name(&self) -> &str {
        "RemoteObjectFetcher"
    }
}
