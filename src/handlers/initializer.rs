//! Re-wires the sync handlers every time a session is established.
//!
//! Each login may reach a different repository with different capabilities,
//! so the handler set installed for the previous session is removed first
//! and rebuilt against the new session.

use super::content_changes::{ContentChangeEventAccumulator, ContentChanges};
use super::crawler::DescendantsCrawler;
use super::fetcher::RemoteObjectFetcher;
use super::filters::{IgnoreAlreadyHandledContentChangeEventsFilter, IgnoredNames};
use super::mechanism::{
    LocalSituationDetection, RemoteSituationDetection, SituationDetection, SolverTable, SyncMechanism,
};
use super::moved::RemoteObjectMovedOrRenamedAccumulator;
use crate::activity::aggregator::ActivityListener;
use crate::bus::handler::SyncEventHandler;
use crate::bus::manager::EventManager;
use crate::bus::priority::HandlerRole;
use crate::bus::queue::EventQueue;
use crate::config::RepositoryConfig;
use anyhow::{anyhow, Context, Result};
use docsync_core::domain::{MappedObject, ObjectKind, RemoteObject, SuccessfulLoginEvent, SyncEvent, ROOT_NAME};
use docsync_core::error::SyncError;
use docsync_core::ports::{ExtendedAttributes, MetaDataStorage, RemoteSession};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WiringState {
    #[default]
    Uninitialized,
    WiredWithoutChangeTracking,
    WiredWithChangeTracking,
}

/// Repository settings the initializer needs
#[derive(Debug, Clone)]
pub struct InitializerSettings {
    pub local_path: PathBuf,
    pub remote_path: String,
    /// `Some(false)` disables change log use even when the server offers it
    pub change_log_enabled: Option<bool>,
    pub uuid_attribute: String,
    pub max_retries: u32,
    pub max_change_items: usize,
}

impl From<&RepositoryConfig> for InitializerSettings {
    fn from(config: &RepositoryConfig) -> Self {
        Self {
            local_path: config.local_path.clone(),
            remote_path: config.remote_path.clone(),
            change_log_enabled: config.change_log_enabled,
            uuid_attribute: config.uuid_attribute.clone(),
            max_retries: config.max_retries,
            max_change_items: config.max_change_items,
        }
    }
}

#[derive(Default)]
struct Installed {
    state: WiringState,
    handlers: Vec<Arc<dyn SyncEventHandler>>,
}

pub struct SyncStrategyInitializer {
    queue: Arc<dyn EventQueue>,
    manager: Arc<dyn EventManager>,
    storage: Arc<dyn MetaDataStorage>,
    attributes: Arc<dyn ExtendedAttributes>,
    activity: Arc<dyn ActivityListener>,
    settings: InitializerSettings,
    ignored: Arc<IgnoredNames>,
    solvers: SolverTable,
    local_detection: Arc<dyn SituationDetection>,
    remote_detection: Arc<dyn SituationDetection>,
    installed: Mutex<Installed>,
}

impl SyncStrategyInitializer {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        manager: Arc<dyn EventManager>,
        storage: Arc<dyn MetaDataStorage>,
        attributes: Arc<dyn ExtendedAttributes>,
        activity: Arc<dyn ActivityListener>,
        settings: InitializerSettings,
    ) -> Self {
        let ignored = Arc::new(IgnoredNames::none(&settings.local_path));
        Self {
            queue,
            manager,
            storage,
            attributes,
            activity,
            settings,
            ignored,
            solvers: SolverTable::new(),
            local_detection: Arc::new(LocalSituationDetection),
            remote_detection: Arc::new(RemoteSituationDetection),
            installed: Mutex::new(Installed::default()),
        }
    }

    pub fn with_ignored(mut self, ignored: Arc<IgnoredNames>) -> Self {
        self.ignored = ignored;
        self
    }

    pub fn with_solvers(mut self, solvers: SolverTable) -> Self {
        self.solvers = solvers;
        self
    }

    pub fn with_detection(
        mut self,
        local: Arc<dyn SituationDetection>,
        remote: Arc<dyn SituationDetection>,
    ) -> Self {
        self.local_detection = local;
        self.remote_detection = remote;
        self
    }

    pub fn state(&self) -> WiringState {
        self.installed.lock().unwrap_or_else(PoisonError::into_inner).state
    }

    /// Names of the handlers installed for the current session
    pub fn installed_handlers(&self) -> Vec<String> {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    }

    fn rewire(&self, login: &SuccessfulLoginEvent) -> Result<()> {
        let session = Arc::clone(&login.session);
        let info = session
            .repository_info()
            .with_context(|| format!("Failed to read repository info from {}", login.url))?;
        let remote_root = session
            .get_object_by_path(&self.settings.remote_path)
            .with_context(|| format!("Failed to fetch remote root {}", self.settings.remote_path))?
            .ok_or_else(|| anyhow!("Remote root folder {} does not exist", self.settings.remote_path))?;
        let guid = self.root_guid()?;

        let change_tracking = match (info.capabilities.supports_change_log(), self.settings.change_log_enabled) {
            (true, Some(false)) => {
                info!("Change log disabled by configuration");
                false
            }
            (true, _) => true,
            (false, _) => {
                warn!(
                    "Repository {} has no usable change log, falling back to crawling",
                    info.id
                );
                false
            }
        };

        self.seed_root(&remote_root, guid)?;

        let handlers = self.build_handlers(&session, change_tracking);
        let state = if change_tracking {
            WiringState::WiredWithChangeTracking
        } else {
            WiringState::WiredWithoutChangeTracking
        };

        {
            let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
            for old in installed.handlers.drain(..) {
                if !self.manager.remove_event_handler(&old) {
                    debug!("Handler {} was already removed", old.name());
                }
            }
            for handler in &handlers {
                self.manager.add_event_handler(Arc::clone(handler));
            }
            installed.handlers = handlers;
            installed.state = state;
        }

        info!("Sync handlers wired for {} ({:?})", login.url, state);
        Ok(())
    }

    /// Handlers sharing a band run in the order they are listed here
    fn build_handlers(&self, session: &Arc<dyn RemoteSession>, change_tracking: bool) -> Vec<Arc<dyn SyncEventHandler>> {
        let mut handlers: Vec<Arc<dyn SyncEventHandler>> = Vec::new();
        if change_tracking {
            handlers.push(Arc::new(ContentChangeEventAccumulator::new(
                Arc::clone(session),
                Arc::clone(&self.storage),
                Arc::clone(&self.queue),
            )));
            handlers.push(Arc::new(ContentChanges::new(
                Arc::clone(session),
                Arc::clone(&self.storage),
                Arc::clone(&self.queue),
                self.settings.max_change_items,
            )));
            handlers.push(Arc::new(IgnoreAlreadyHandledContentChangeEventsFilter::new(
                Arc::clone(session),
                Arc::clone(&self.storage),
            )));
        }
        handlers.push(Arc::new(RemoteObjectFetcher::new(
            Arc::clone(session),
            Arc::clone(&self.storage),
        )));
        handlers.push(Arc::new(DescendantsCrawler::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.queue),
            Arc::clone(&self.activity),
            self.settings.local_path.clone(),
            Arc::clone(&self.ignored),
        )));
        handlers.push(Arc::new(RemoteObjectMovedOrRenamedAccumulator::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.queue),
        )));
        handlers.push(Arc::new(SyncMechanism::new(
            Arc::clone(&self.local_detection),
            Arc::clone(&self.remote_detection),
            self.solvers.clone(),
            Arc::clone(&self.storage),
            Arc::clone(&self.queue),
            Arc::clone(&self.activity),
            self.settings.max_retries,
        )));
        handlers
    }

    /// Identity of the local root, kept in an extended attribute
    fn root_guid(&self) -> Result<Uuid> {
        let path = &self.settings.local_path;
        let name = &self.settings.uuid_attribute;

        match self.attributes.get_attribute(path, name) {
            Ok(Some(value)) => match Uuid::parse_str(value.trim()) {
                Ok(guid) => return Ok(guid),
                Err(e) => warn!("Replacing unparsable root id {:?} on {}: {}", value, path.display(), e),
            },
            Ok(None) => {}
            Err(SyncError::ExtendedAttributesNotSupported { .. }) => {
                warn!(
                    "Extended attributes are not supported on {}, the root has no stable id",
                    path.display()
                );
                return Ok(Uuid::nil());
            }
            Err(e) => return Err(e).context("Failed to read root id"),
        }

        let guid = Uuid::new_v4();
        match self.attributes.set_attribute(path, name, &guid.to_string()) {
            Ok(()) => {
                debug!("Assigned id {} to {}", guid, path.display());
                Ok(guid)
            }
            Err(SyncError::ExtendedAttributesNotSupported { .. }) => {
                warn!(
                    "Extended attributes are not supported on {}, the root has no stable id",
                    path.display()
                );
                Ok(Uuid::nil())
            }
            Err(e) => Err(e).context("Failed to store root id"),
        }
    }

    fn seed_root(&self, remote_root: &RemoteObject, guid: Uuid) -> Result<()> {
        let root = MappedObject {
            name: ROOT_NAME.to_string(),
            remote_id: remote_root.id.clone(),
            kind: ObjectKind::Folder,
            parent_id: None,
            last_change_token: remote_root.change_token.clone(),
            guid,
            last_remote_write: remote_root.last_modified,
            last_local_write: None,
        };
        self.storage
            .save_mapped_object(&root)
            .context("Failed to save root folder mapping")
    }
}

impl SyncEventHandler for SyncStrategyInitializer {
    fn priority(&self) -> i32 {
        HandlerRole::Initializer.priority()
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        let SyncEvent::SuccessfulLogin(login) = event else {
            return Ok(false);
        };
        self.rewire(login)?;
        Ok(true)
    }

    fn name(&self) -> &str {
        "SyncStrategyInitializer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryExtendedAttributes, MemorySession, MemoryStorage};
    use crate::bus::manager::SyncEventManager;
    use docsync_core::domain::{CapabilityChanges, RepositoryCapabilities, StartNextSyncEvent};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NullQueue;

    impl EventQueue for NullQueue {
        fn add_event(&self, _event: SyncEvent) -> docsync_core::Result<()> {
            Ok(())
        }

        fn is_stopped(&self) -> bool {
            false
        }
    }

    struct NoActivity;

    impl ActivityListener for NoActivity {
        fn activity_started(&self) {}
        fn activity_stopped(&self) {}
    }

    fn settings() -> InitializerSettings {
        InitializerSettings {
            local_path: PathBuf::from("/sync"),
            remote_path: "/Sites/docs".to_string(),
            change_log_enabled: None,
            uuid_attribute: "user.docsync.id".to_string(),
            max_retries: 3,
            max_change_items: 100,
        }
    }

    fn session(changes: Option<CapabilityChanges>) -> Arc<MemorySession> {
        let session = Arc::new(MemorySession::new("repo", RepositoryCapabilities { changes }));
        session.insert(RemoteObject::folder("root-id", "docs", "/Sites/docs").with_change_token("c1"));
        session
    }

    struct Fixture {
        manager: Arc<SyncEventManager>,
        storage: Arc<MemoryStorage>,
        attributes: Arc<MemoryExtendedAttributes>,
        initializer: SyncStrategyInitializer,
    }

    fn fixture(attributes: MemoryExtendedAttributes, settings: InitializerSettings) -> Fixture {
        let manager = Arc::new(SyncEventManager::new());
        let storage = Arc::new(MemoryStorage::new("/sync", "/Sites/docs"));
        let attributes = Arc::new(attributes);
        let initializer = SyncStrategyInitializer::new(
            Arc::new(NullQueue),
            manager.clone(),
            storage.clone(),
            attributes.clone(),
            Arc::new(NoActivity),
            settings,
        );
        Fixture {
            manager,
            storage,
            attributes,
            initializer,
        }
    }

    fn login(session: Arc<MemorySession>) -> SyncEvent {
        SuccessfulLoginEvent::new("http://localhost/cmis", session).into()
    }

    #[test]
    fn test_full_wiring_with_change_log() -> Result<()> {
        let f = fixture(MemoryExtendedAttributes::new(), settings());
        assert_eq!(f.initializer.state(), WiringState::Uninitialized);

        assert!(f.initializer.handle(&login(session(Some(CapabilityChanges::All))))?);
        assert_eq!(f.initializer.state(), WiringState::WiredWithChangeTracking);
        assert_eq!(f.manager.handler_count(), 7);
        assert_eq!(
            f.manager.handler_names(),
            vec![
                "IgnoreAlreadyHandledContentChangeEventsFilter",
                "ContentChangeEventAccumulator",
                "RemoteObjectFetcher",
                "RemoteObjectMovedOrRenamedAccumulator",
                "ContentChanges",
                "DescendantsCrawler",
                "SyncMechanism",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_reduced_wiring_without_change_log() -> Result<()> {
        let f = fixture(MemoryExtendedAttributes::new(), settings());
        f.initializer.handle(&login(session(Some(CapabilityChanges::None))))?;
        assert_eq!(f.initializer.state(), WiringState::WiredWithoutChangeTracking);
        assert_eq!(f.manager.handler_count(), 4);
        Ok(())
    }

    #[test]
    fn test_configuration_disables_change_log() -> Result<()> {
        let mut settings = settings();
        settings.change_log_enabled = Some(false);
        let f = fixture(MemoryExtendedAttributes::new(), settings);
        f.initializer.handle(&login(session(Some(CapabilityChanges::All))))?;
        assert_eq!(f.initializer.state(), WiringState::WiredWithoutChangeTracking);
        assert_eq!(f.manager.handler_count(), 4);
        Ok(())
    }

    #[test]
    fn test_repeated_login_replaces_handlers() -> Result<()> {
        let f = fixture(MemoryExtendedAttributes::new(), settings());
        f.initializer.handle(&login(session(Some(CapabilityChanges::All))))?;
        f.initializer.handle(&login(session(Some(CapabilityChanges::All))))?;
        assert_eq!(f.manager.handler_count(), 7);

        f.initializer.handle(&login(session(None)))?;
        assert_eq!(f.manager.handler_count(), 4);
        assert_eq!(f.initializer.installed_handlers().len(), 4);
        Ok(())
    }

    #[test]
    fn test_root_seeded_with_persistent_guid() -> Result<()> {
        let f = fixture(MemoryExtendedAttributes::new(), settings());
        f.initializer.handle(&login(session(None)))?;
        let root = f.storage.get_by_remote_id("root-id")?.expect("root stored");
        assert!(root.is_root());
        assert_ne!(root.guid, Uuid::nil());
        assert_eq!(root.last_change_token.as_deref(), Some("c1"));

        let stored = f.attributes.get_attribute(Path::new("/sync"), "user.docsync.id")?;
        assert_eq!(stored, Some(root.guid.to_string()));

        // Second login keeps the id
        f.initializer.handle(&login(session(None)))?;
        let again = f.storage.get_by_remote_id("root-id")?.expect("root stored");
        assert_eq!(again.guid, root.guid);
        Ok(())
    }

    #[test]
    fn test_unparsable_guid_replaced() -> Result<()> {
        let f = fixture(MemoryExtendedAttributes::new(), settings());
        f.attributes.set_attribute(Path::new("/sync"), "user.docsync.id", "garbage")?;
        f.initializer.handle(&login(session(None)))?;
        let root = f.storage.get_by_remote_id("root-id")?.expect("root stored");
        assert_ne!(root.guid, Uuid::nil());
        Ok(())
    }

    #[test]
    fn test_unsupported_attributes_give_nil_guid() -> Result<()> {
        let f = fixture(MemoryExtendedAttributes::unsupported(), settings());
        assert!(f.initializer.handle(&login(session(None)))?);
        let root = f.storage.get_by_remote_id("root-id")?.expect("root stored");
        assert_eq!(root.guid, Uuid::nil());
        Ok(())
    }

    #[test]
    fn test_rejected_guid_write_gives_nil_guid() -> Result<()> {
        let f = fixture(MemoryExtendedAttributes::write_protected(), settings());
        assert!(f.initializer.handle(&login(session(None)))?);
        assert_eq!(f.initializer.state(), WiringState::WiredWithoutChangeTracking);
        let root = f.storage.get_by_remote_id("root-id")?.expect("root stored");
        assert_eq!(root.guid, Uuid::nil());
        Ok(())
    }

    #[test]
    fn test_missing_remote_root_leaves_wiring_untouched() -> Result<()> {
        let f = fixture(MemoryExtendedAttributes::new(), settings());
        let empty = Arc::new(MemorySession::new("repo", RepositoryCapabilities::default()));
        assert!(f.initializer.handle(&login(empty)).is_err());
        assert_eq!(f.initializer.state(), WiringState::Uninitialized);
        assert_eq!(f.manager.handler_count(), 0);
        Ok(())
    }

    /// Memory storage whose saves can be switched off
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_saves: AtomicBool,
    }

    impl MetaDataStorage for FlakyStorage {
        fn save_mapped_object(&self, object: &MappedObject) -> Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(anyhow!("database is locked"));
            }
            self.inner.save_mapped_object(object)
        }

        fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<MappedObject>> {
            self.inner.get_by_remote_id(remote_id)
        }

        fn get_by_local_path(&self, path: &Path) -> Result<Option<MappedObject>> {
            self.inner.get_by_local_path(path)
        }

        fn get_local_path(&self, object: &MappedObject) -> Result<Option<PathBuf>> {
            self.inner.get_local_path(object)
        }

        fn get_remote_path(&self, object: &MappedObject) -> Result<Option<String>> {
            self.inner.get_remote_path(object)
        }

        fn mapped_objects(&self) -> Result<Vec<MappedObject>> {
            self.inner.mapped_objects()
        }

        fn change_log_token(&self) -> Result<Option<String>> {
            self.inner.change_log_token()
        }

        fn set_change_log_token(&self, token: &str) -> Result<()> {
            self.inner.set_change_log_token(token)
        }
    }

    #[test]
    fn test_failed_root_save_keeps_previous_wiring() -> Result<()> {
        let manager = Arc::new(SyncEventManager::new());
        let storage = Arc::new(FlakyStorage {
            inner: MemoryStorage::new("/sync", "/Sites/docs"),
            fail_saves: AtomicBool::new(false),
        });
        let initializer = SyncStrategyInitializer::new(
            Arc::new(NullQueue),
            manager.clone(),
            storage.clone(),
            Arc::new(MemoryExtendedAttributes::new()),
            Arc::new(NoActivity),
            settings(),
        );

        initializer.handle(&login(session(None)))?;
        let wired = manager.handler_names();
        assert_eq!(wired.len(), 4);

        storage.fail_saves.store(true, Ordering::SeqCst);
        assert!(initializer.handle(&login(session(Some(CapabilityChanges::All)))).is_err());
        assert_eq!(initializer.state(), WiringState::WiredWithoutChangeTracking);
        assert_eq!(manager.handler_names(), wired);
        assert_eq!(initializer.installed_handlers().len(), 4);
        Ok(())
    }

    #[test]
    fn test_other_events_pass() -> Result<()> {
        let f = fixture(MemoryExtendedAttributes::new(), settings());
        assert!(!f.initializer.handle(&StartNextSyncEvent::new(false).into())?);
        Ok(())
    }
}
