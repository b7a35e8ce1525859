use super::filters::IgnoredNames;
use crate::activity::aggregator::{ActivityGuard, ActivityListener};
use crate::bus::handler::SyncEventHandler;
use crate::bus::priority::HandlerRole;
use crate::bus::queue::EventQueue;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use docsync_core::domain::{
    ChangeType, ContentChangeType, EventCategory, FullSyncCompletedEvent, MappedObject, ObjectEvent, ObjectKind,
    StartNextSyncEvent, SyncEvent,
};
use docsync_core::ports::MetaDataStorage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Compares the local tree against the metadata store and reports every
/// difference as an object event, followed by a [`FullSyncCompletedEvent`].
///
/// Runs on every [`StartNextSyncEvent`] that reaches it: explicit full sync
/// requests, and periodic syncs the change log reader left alone.
pub struct DescendantsCrawler {
    storage: Arc<dyn MetaDataStorage>,
    queue: Arc<dyn EventQueue>,
    activity: Arc<dyn ActivityListener>,
    local_root: PathBuf,
    ignored: Arc<IgnoredNames>,
}

impl DescendantsCrawler {
    pub fn new(
        storage: Arc<dyn MetaDataStorage>,
        queue: Arc<dyn EventQueue>,
        activity: Arc<dyn ActivityListener>,
        local_root: impl Into<PathBuf>,
        ignored: Arc<IgnoredNames>,
    ) -> Self {
        Self {
            storage,
            queue,
            activity,
            local_root: local_root.into(),
            ignored,
        }
    }

    fn crawl(&self, start: &StartNextSyncEvent) -> Result<()> {
        let _activity = ActivityGuard::new(Arc::clone(&self.activity));
        info!("Crawling {}", self.local_root.display());

        let category = if start.full_sync_requested {
            EventCategory::SyncRequested
        } else {
            EventCategory::PeriodicSync
        };

        let mut known = self.known_objects()?;
        let mut emitted = 0usize;
        let mut unreadable: Vec<PathBuf> = Vec::new();

        let walker = WalkDir::new(&self.local_root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !self.ignored.is_ignored(entry.path(), entry.file_type().is_dir()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(e).with_context(|| format!("Failed to read {}", self.local_root.display()));
                }
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    // Without a path nothing below the root can be trusted
                    unreadable.push(e.path().unwrap_or(self.local_root.as_path()).to_path_buf());
                    continue;
                }
            };
            let path = entry.path();
            let is_file = entry.file_type().is_file();

            let event = match known.remove(path) {
                None => Some(local_event(is_file, path, ChangeType::Created, ContentChangeType::Created)?),
                Some(stored) if is_file && modified_since(&entry, &stored) => {
                    Some(local_event(true, path, ChangeType::Changed, ContentChangeType::Changed)?)
                }
                Some(_) => None,
            };
            if let Some(event) = event {
                self.queue.add_event(event.with_category(category).into())?;
                emitted += 1;
            }
        }

        prune_unreadable(&mut known, &unreadable);
        for (path, stored) in known {
            let is_file = stored.kind == ObjectKind::File;
            let event = local_event(is_file, &path, ChangeType::Deleted, ContentChangeType::Deleted)?;
            self.queue.add_event(event.with_category(category).into())?;
            emitted += 1;
        }

        debug!("Crawl found {} differences", emitted);
        self.queue.add_event(
            FullSyncCompletedEvent {
                start_event: start.clone(),
            }
            .into(),
        )?;
        Ok(())
    }

    /// Stored objects below the root, keyed by their local path
    fn known_objects(&self) -> Result<HashMap<PathBuf, MappedObject>> {
        let mut known = HashMap::new();
        for object in self.storage.mapped_objects()? {
            if object.is_root() {
                continue;
            }
            if let Some(path) = self.storage.get_local_path(&object)? {
                known.insert(path, object);
            }
        }
        Ok(known)
    }
}

fn local_event(is_file: bool, path: &Path, change: ChangeType, content: ContentChangeType) -> Result<ObjectEvent> {
    let event = if is_file {
        ObjectEvent::file(Some(path.to_path_buf()), None, change, ChangeType::None)?.with_content(content)
    } else {
        ObjectEvent::folder(Some(path.to_path_buf()), None, change, ChangeType::None)?
    };
    Ok(event)
}

/// Forget stored objects at or below a path the walk could not read, so they
/// are not mistaken for local deletions
fn prune_unreadable(known: &mut HashMap<PathBuf, MappedObject>, unreadable: &[PathBuf]) {
    if unreadable.is_empty() {
        return;
    }
    let before = known.len();
    known.retain(|path, _| !unreadable.iter().any(|skipped| path.starts_with(skipped)));
    debug!("Kept {} stored objects below unreadable entries", before - known.len());
}

fn modified_since(entry: &walkdir::DirEntry, stored: &MappedObject) -> bool {
    let Some(last) = stored.last_local_write else {
        return false;
    };
    match entry.metadata().ok().and_then(|m| m.modified().ok()) {
        Some(modified) => DateTime::<Utc>::from(modified) > last,
        None => false,
    }
}

impl SyncEventHandler for DescendantsCrawler {
    fn priority(&self) -> i32 {
        HandlerRole::Crawler.priority()
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        let SyncEvent::StartNextSync(start) = event else {
            return Ok(false);
        };
        self.crawl(start)?;
        Ok(true)
    }

    fn name(&self) -> &str {
        "DescendantsCrawler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStorage;
    use docsync_core::domain::ROOT_NAME;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingQueue {
        events: Mutex<Vec<SyncEvent>>,
    }

    impl EventQueue for RecordingQueue {
        fn add_event(&self, event: SyncEvent) -> docsync_core::Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }

        fn is_stopped(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct CountingActivity {
        started: AtomicUsize,
        stopped: AtomicUsize,
    }

    impl ActivityListener for CountingActivity {
        fn activity_started(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn activity_stopped(&self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn summary(events: &[SyncEvent]) -> Vec<String> {
        let mut lines: Vec<String> = events
            .iter()
            .filter_map(|e| e.as_object())
            .map(|o| {
                let name = o.local_path().and_then(|p| p.file_name()).map(|n| n.to_string_lossy().into_owned());
                format!("{} {} {}", o.kind(), o.local(), name.unwrap_or_default())
            })
            .collect();
        lines.sort();
        lines
    }

    #[test]
    fn test_crawl_reports_differences() -> Result<()> {
        let dir = TempDir::new()?;
        let root = dir.path().to_path_buf();
        fs::create_dir(root.join("docs"))?;
        fs::write(root.join("docs").join("new.txt"), "hello")?;
        fs::write(root.join("kept.txt"), "same")?;
        fs::create_dir(root.join(".hidden"))?;
        fs::write(root.join(".hidden").join("secret"), "x")?;

        let storage = Arc::new(MemoryStorage::new(&root, "/"));
        storage.save_mapped_object(&MappedObject::new(ROOT_NAME, "root", ObjectKind::Folder))?;
        storage.save_mapped_object(&MappedObject::new("kept.txt", "1", ObjectKind::File).with_parent("root"))?;
        storage.save_mapped_object(&MappedObject::new("gone", "2", ObjectKind::Folder).with_parent("root"))?;

        let queue = Arc::new(RecordingQueue::default());
        let activity = Arc::new(CountingActivity::default());
        let ignored = Arc::new(IgnoredNames::new(&root, &[".*".to_string()], &[])?);
        let crawler = DescendantsCrawler::new(storage, queue.clone(), activity.clone(), &root, ignored);

        assert!(crawler.handle(&StartNextSyncEvent::new(true).into())?);

        let events = queue.events.lock().unwrap();
        assert_eq!(
            summary(&events),
            vec![
                "File CREATED new.txt".to_string(),
                "Folder CREATED docs".to_string(),
                "Folder DELETED gone".to_string(),
            ]
        );
        assert!(events
            .iter()
            .filter_map(|e| e.as_object())
            .all(|o| o.category() == EventCategory::SyncRequested));
        assert!(matches!(events.last(), Some(SyncEvent::FullSyncCompleted(_))));
        assert_eq!(activity.started.load(Ordering::SeqCst), 1);
        assert_eq!(activity.stopped.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_unreadable_subtree_is_not_deleted() {
        let mut known = HashMap::new();
        known.insert(
            PathBuf::from("/sync/sub/a.txt"),
            MappedObject::new("a.txt", "1", ObjectKind::File).with_parent("2"),
        );
        known.insert(
            PathBuf::from("/sync/sub/deep/b.txt"),
            MappedObject::new("b.txt", "3", ObjectKind::File).with_parent("4"),
        );
        known.insert(
            PathBuf::from("/sync/subway.txt"),
            MappedObject::new("subway.txt", "5", ObjectKind::File).with_parent("root"),
        );

        prune_unreadable(&mut known, &[PathBuf::from("/sync/sub")]);

        let left: Vec<&PathBuf> = known.keys().collect();
        assert_eq!(left, vec![&PathBuf::from("/sync/subway.txt")]);
    }

    #[test]
    fn test_prune_only_when_something_was_skipped() {
        let mut known = HashMap::new();
        known.insert(
            PathBuf::from("/sync/a.txt"),
            MappedObject::new("a.txt", "1", ObjectKind::File).with_parent("root"),
        );
        prune_unreadable(&mut known, &[]);
        assert_eq!(known.len(), 1);

        prune_unreadable(&mut known, &[PathBuf::from("/sync")]);
        assert!(known.is_empty());
    }

    #[test]
    fn test_missing_root_fails_and_releases_activity() -> Result<()> {
        let dir = TempDir::new()?;
        let root = dir.path().join("missing");
        let storage = Arc::new(MemoryStorage::new(&root, "/"));
        let queue = Arc::new(RecordingQueue::default());
        let activity = Arc::new(CountingActivity::default());
        let crawler = DescendantsCrawler::new(
            storage,
            queue.clone(),
            activity.clone(),
            &root,
            Arc::new(IgnoredNames::none(&root)),
        );

        assert!(crawler.handle(&StartNextSyncEvent::new(false).into()).is_err());
        assert!(queue.events.lock().unwrap().is_empty());
        assert_eq!(activity.stopped.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
