use crate::bus::handler::SyncEventHandler;
use crate::bus::priority::HandlerRole;
use crate::bus::queue::EventQueue;
use anyhow::{Context, Result};
use docsync_core::domain::{
    create_event, ChangeType, ContentChangeEvent, ContentChangeType, ObjectEvent, ObjectKind, RemoteChangeKind,
    SyncEvent,
};
use docsync_core::ports::{MetaDataStorage, RemoteSession};
use std::sync::Arc;
use tracing::{debug, info};

/// Reads the remote change log on every periodic sync and turns its entries
/// into [`ContentChangeEvent`]s.
///
/// Without a stored token the periodic sync is left to the crawler, whose
/// completion then records the latest remote token.
pub struct ContentChanges {
    session: Arc<dyn RemoteSession>,
    storage: Arc<dyn MetaDataStorage>,
    queue: Arc<dyn EventQueue>,
    max_items: usize,
}

impl ContentChanges {
    pub fn new(
        session: Arc<dyn RemoteSession>,
        storage: Arc<dyn MetaDataStorage>,
        queue: Arc<dyn EventQueue>,
        max_items: usize,
    ) -> Self {
        Self {
            session,
            storage,
            queue,
            max_items: max_items.max(1),
        }
    }

    fn sync(&self) -> Result<bool> {
        let Some(stored) = self.storage.change_log_token()? else {
            debug!("No change log token stored, leaving sync to the crawler");
            return Ok(false);
        };

        let latest = self
            .session
            .repository_info()
            .context("Failed to read repository info")?
            .latest_change_log_token;
        if latest.as_deref() == Some(stored.as_str()) {
            debug!("Change log is up to date at token {}", stored);
            return Ok(true);
        }

        let mut token = stored;
        let mut count = 0usize;
        loop {
            let batch = self
                .session
                .get_content_changes(Some(&token), self.max_items)
                .with_context(|| format!("Failed to read change log from token {}", token))?;
            let empty = batch.entries.is_empty();
            for entry in batch.entries {
                self.queue
                    .add_event(ContentChangeEvent::new(entry.kind, entry.object_id).into())?;
                count += 1;
            }
            if let Some(next) = batch.latest_token {
                token = next;
            }
            if !batch.has_more || empty {
                break;
            }
        }

        info!("Read {} change log entries, now at token {}", count, token);
        self.storage.set_change_log_token(&token)?;
        Ok(true)
    }

    fn remember_latest_token(&self) -> Result<()> {
        let info = self.session.repository_info().context("Failed to read repository info")?;
        if let Some(token) = info.latest_change_log_token {
            debug!("Full sync completed, storing change log token {}", token);
            self.storage.set_change_log_token(&token)?;
        }
        Ok(())
    }
}

impl SyncEventHandler for ContentChanges {
    fn priority(&self) -> i32 {
        HandlerRole::ContentChanges.priority()
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        match event {
            SyncEvent::StartNextSync(start) if !start.full_sync_requested => self.sync(),
            SyncEvent::FullSyncCompleted(_) => {
                self.remember_latest_token()?;
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "ContentChanges"
    }
}

/// Turns change log entries into object events, resolving the remote object
/// and the local path along the way
pub struct ContentChangeEventAccumulator {
    session: Arc<dyn RemoteSession>,
    storage: Arc<dyn MetaDataStorage>,
    queue: Arc<dyn EventQueue>,
}

impl ContentChangeEventAccumulator {
    pub fn new(session: Arc<dyn RemoteSession>, storage: Arc<dyn MetaDataStorage>, queue: Arc<dyn EventQueue>) -> Self {
        Self { session, storage, queue }
    }

    fn accumulate(&self, change: &ContentChangeEvent) -> Result<()> {
        match change.kind() {
            // Permission changes carry nothing to transfer
            RemoteChangeKind::Security => Ok(()),
            RemoteChangeKind::Deleted => {
                let Some(stored) = self.storage.get_by_remote_id(change.object_id())? else {
                    return Ok(());
                };
                let Some(local) = self.storage.get_local_path(&stored)? else {
                    debug!("Deleted object {} has no local path", change.object_id());
                    return Ok(());
                };
                let event = if stored.kind == ObjectKind::File {
                    ObjectEvent::file(Some(local), None, ChangeType::None, ChangeType::Deleted)?
                        .with_content(ContentChangeType::Deleted)
                } else {
                    ObjectEvent::folder(Some(local), None, ChangeType::None, ChangeType::Deleted)?
                };
                self.queue.add_event(event.into())?;
                Ok(())
            }
            RemoteChangeKind::Created | RemoteChangeKind::Updated => {
                let Some(remote) = change.resolve(self.session.as_ref())? else {
                    debug!("Object {} vanished before it could be fetched", change.object_id());
                    return Ok(());
                };
                let local = match self.storage.get_by_remote_id(&remote.id)? {
                    Some(stored) => self.storage.get_local_path(&stored)?,
                    None => None,
                };
                let remote_change = if change.kind() == RemoteChangeKind::Created {
                    ChangeType::Created
                } else {
                    ChangeType::Changed
                };
                let event = create_event(
                    remote.is_file(),
                    Some(remote.clone()),
                    local,
                    remote_change,
                    ChangeType::None,
                    None,
                    None,
                )?;
                self.queue.add_event(event)?;
                Ok(())
            }
        }
    }
}

impl SyncEventHandler for ContentChangeEventAccumulator {
    fn priority(&self) -> i32 {
        HandlerRole::ContentChangeAccumulator.priority()
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        let SyncEvent::ContentChange(change) = event else {
            return Ok(false);
        };
        self.accumulate(change)?;
        Ok(true)
    }

    fn name(&self) -> &str {
        "ContentChangeEventAccumulator"
    }
}
