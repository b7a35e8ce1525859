//! One synchronized folder: the bus plus every long-lived handler around it.

use crate::activity::aggregator::{ActivityListener, ActivityListenerAggregator};
use crate::activity::transmissions::ActiveActivitiesManager;
use crate::bus::handler::{DebugLoggingHandler, GenericSyncEventHandler};
use crate::bus::manager::{EventManager, SyncEventManager};
use crate::bus::priority;
use crate::bus::queue::{EventQueue, SyncEventQueue};
use crate::config::Config;
use crate::handlers::filters::{IgnoredNames, IgnoredNamesFilter};
use crate::handlers::initializer::{InitializerSettings, SyncStrategyInitializer};
use crate::handlers::mechanism::SolverTable;
use crate::handlers::scheduler::SyncScheduler;
use crate::handlers::watcher_consumer::WatcherConsumer;
use crate::watcher::LocalWatcher;
use anyhow::Result;
use docsync_core::domain::{
    ConfigChangedEvent, FileTransmissionEvent, StartNextSyncEvent, SuccessfulLoginEvent,
};
use docsync_core::ports::{ExtendedAttributes, MetaDataStorage, RemoteSession};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

/// Ports a repository runs against
pub struct RepositoryPorts {
    pub storage: Arc<dyn MetaDataStorage>,
    pub attributes: Arc<dyn ExtendedAttributes>,
    /// Receives the overall busy/idle signal
    pub activity: Arc<dyn ActivityListener>,
    pub solvers: SolverTable,
}

pub struct SyncRepository {
    url: String,
    local_path: PathBuf,
    shutdown_timeout: Duration,
    manager: Arc<SyncEventManager>,
    queue: Arc<SyncEventQueue>,
    activity: Arc<ActivityListenerAggregator>,
    scheduler: Arc<SyncScheduler>,
    initializer: Arc<SyncStrategyInitializer>,
    watcher: Mutex<Option<LocalWatcher>>,
}

impl SyncRepository {
    pub fn new(config: &Config, ports: RepositoryPorts) -> Result<Self> {
        let repository = &config.repository;
        let manager = Arc::new(SyncEventManager::new());
        let queue = Arc::new(SyncEventQueue::new(Arc::clone(&manager))?);
        let queue_port: Arc<dyn EventQueue> = queue.clone();

        let transmissions = Arc::new(ActiveActivitiesManager::new());
        let activity = Arc::new(ActivityListenerAggregator::new(ports.activity, Arc::clone(&transmissions)));
        let ignored = Arc::new(IgnoredNames::new(
            &repository.local_path,
            &repository.ignored_folder_names,
            &repository.ignored_file_names,
        )?);

        manager.add_event_handler(Arc::new(DebugLoggingHandler));
        manager.add_event_handler(Arc::new(GenericSyncEventHandler::for_variant::<Arc<FileTransmissionEvent>, _>(
            "TransmissionTracker",
            priority::DEBUG,
            move |transmission| {
                transmissions.add_transmission(Arc::clone(transmission));
                Ok(false)
            },
        )));
        manager.add_event_handler(Arc::new(IgnoredNamesFilter::new(Arc::clone(&ignored))));
        manager.add_event_handler(Arc::new(WatcherConsumer::new(
            Arc::clone(&ports.storage),
            Arc::clone(&queue_port),
        )));

        let scheduler = Arc::new(SyncScheduler::new(Arc::clone(&queue_port), config.poll_interval())?);
        manager.add_event_handler(scheduler.clone());

        let initializer = Arc::new(
            SyncStrategyInitializer::new(
                Arc::clone(&queue_port),
                manager.clone(),
                ports.storage,
                ports.attributes,
                activity.clone(),
                InitializerSettings::from(repository),
            )
            .with_ignored(ignored)
            .with_solvers(ports.solvers),
        );
        manager.add_event_handler(initializer.clone());

        Ok(Self {
            url: repository.url.clone(),
            local_path: repository.local_path.clone(),
            shutdown_timeout: config.shutdown_timeout(),
            manager,
            queue,
            activity,
            scheduler,
            initializer,
            watcher: Mutex::new(None),
        })
    }

    /// Start periodic syncs and, if asked, watching the local folder
    pub fn start(&self, watch: bool) -> Result<()> {
        self.scheduler.start()?;
        if watch {
            let watcher = LocalWatcher::new(&self.local_path, self.queue.clone())?;
            *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);
        }
        Ok(())
    }

    /// Hand a fresh session to the bus. Handlers are rewired once the login
    /// event is dispatched.
    pub fn connect(&self, session: Arc<dyn RemoteSession>) -> Result<()> {
        self.queue
            .add_event(SuccessfulLoginEvent::new(self.url.clone(), session).into())?;
        Ok(())
    }

    pub fn request_full_sync(&self) -> Result<()> {
        self.queue.add_event(StartNextSyncEvent::new(true).into())?;
        Ok(())
    }

    pub fn set_poll_interval(&self, interval: Duration) -> Result<()> {
        self.queue.add_event(
            ConfigChangedEvent {
                poll_interval: Some(interval),
            }
            .into(),
        )?;
        Ok(())
    }

    pub fn queue(&self) -> &Arc<SyncEventQueue> {
        &self.queue
    }

    pub fn manager(&self) -> &Arc<SyncEventManager> {
        &self.manager
    }

    pub fn activity(&self) -> &Arc<ActivityListenerAggregator> {
        &self.activity
    }

    pub fn initializer(&self) -> &Arc<SyncStrategyInitializer> {
        &self.initializer
    }

    /// Stop producers, drain the queue and wait for the consumer. Returns
    /// whether it finished within the configured timeout.
    pub fn shutdown(&self) -> bool {
        self.scheduler.stop();
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.queue.stop_listener();
        let stopped = self.queue.wait_for_stopped(self.shutdown_timeout);
        if stopped {
            // Handlers hold the queue, the queue holds the manager
            self.manager.clear();
            info!("Repository {} shut down", self.local_path.display());
        } else {
            warn!(
                "Repository {} did not shut down within {:?}",
                self.local_path.display(),
                self.shutdown_timeout
            );
        }
        stopped
    }
}

impl Drop for SyncRepository {
    fn drop(&mut self) {
        if !self.queue.is_stopped() {
            self.shutdown();
        }
    }
}
