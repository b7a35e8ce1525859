use crate::activity::aggregator::{ActivityGuard, ActivityListener};
use crate::bus::handler::SyncEventHandler;
use crate::bus::priority::HandlerRole;
use crate::bus::queue::EventQueue;
use anyhow::Result;
use docsync_core::domain::{ChangeType, ObjectEvent, SyncEvent};
use docsync_core::ports::MetaDataStorage;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to an object on one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Situation {
    NoChange,
    Added,
    Changed,
    Moved,
    Renamed,
    Removed,
}

impl fmt::Display for Situation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Classifies one side of an object event
pub trait SituationDetection: Send + Sync {
    fn analyse(&self, storage: &dyn MetaDataStorage, event: &ObjectEvent) -> Result<Situation>;
}

/// Carries out the work for one combination of local and remote situations
pub trait SituationSolver: Send + Sync {
    fn solve(&self, event: &ObjectEvent, local: Situation, remote: Situation) -> Result<()>;
}

/// Local side, judged from the local change axis
#[derive(Debug, Default)]
pub struct LocalSituationDetection;

impl SituationDetection for LocalSituationDetection {
    fn analyse(&self, storage: &dyn MetaDataStorage, event: &ObjectEvent) -> Result<Situation> {
        let situation = match event.local() {
            ChangeType::None => Situation::NoChange,
            ChangeType::Created => Situation::Added,
            ChangeType::Deleted => Situation::Removed,
            ChangeType::Changed => match event.local_path() {
                // A change to something never synced is an addition
                Some(path) if storage.get_by_local_path(path)?.is_none() => Situation::Added,
                _ => Situation::Changed,
            },
            ChangeType::Moved => {
                let old = event.moved_from().and_then(|m| m.old_local_path.as_deref());
                match (old, event.local_path()) {
                    (Some(old), Some(new)) if old.parent() == new.parent() => Situation::Renamed,
                    _ => Situation::Moved,
                }
            }
        };
        Ok(situation)
    }
}

/// Remote side, judged from the remote change axis
#[derive(Debug, Default)]
pub struct RemoteSituationDetection;

impl SituationDetection for RemoteSituationDetection {
    fn analyse(&self, storage: &dyn MetaDataStorage, event: &ObjectEvent) -> Result<Situation> {
        let situation = match event.remote() {
            ChangeType::None => Situation::NoChange,
            ChangeType::Created => Situation::Added,
            ChangeType::Deleted => Situation::Removed,
            ChangeType::Changed => match event.remote_object() {
                Some(remote) if storage.get_by_remote_id(&remote.id)?.is_none() => Situation::Added,
                _ => Situation::Changed,
            },
            ChangeType::Moved => {
                let old = event.moved_from().and_then(|m| m.old_remote_path.as_deref());
                let new = event.remote_object().and_then(|o| o.path.as_deref());
                match (old, new) {
                    (Some(old), Some(new)) if Path::new(old).parent() == Path::new(new).parent() => {
                        Situation::Renamed
                    }
                    _ => Situation::Moved,
                }
            }
        };
        Ok(situation)
    }
}

/// Solvers by `(local, remote)` situation pair, with an optional fallback
#[derive(Clone, Default)]
pub struct SolverTable {
    solvers: HashMap<(Situation, Situation), Arc<dyn SituationSolver>>,
    fallback: Option<Arc<dyn SituationSolver>>,
}

impl SolverTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_solver(mut self, local: Situation, remote: Situation, solver: Arc<dyn SituationSolver>) -> Self {
        self.solvers.insert((local, remote), solver);
        self
    }

    /// Used for every pair without a dedicated solver
    pub fn with_fallback(mut self, solver: Arc<dyn SituationSolver>) -> Self {
        self.fallback = Some(solver);
        self
    }

    pub fn get(&self, local: Situation, remote: Situation) -> Option<&Arc<dyn SituationSolver>> {
        self.solvers.get(&(local, remote)).or(self.fallback.as_ref())
    }
}

impl fmt::Debug for SolverTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverTable")
            .field("solvers", &self.solvers.len())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// The main mechanism: detects the situation on both sides and hands the
/// event to the matching solver. Failed events are re-queued until they
/// reach the retry limit.
pub struct SyncMechanism {
    local: Arc<dyn SituationDetection>,
    remote: Arc<dyn SituationDetection>,
    solvers: SolverTable,
    storage: Arc<dyn MetaDataStorage>,
    queue: Arc<dyn EventQueue>,
    activity: Arc<dyn ActivityListener>,
    max_retries: u32,
}

impl SyncMechanism {
    pub fn new(
        local: Arc<dyn SituationDetection>,
        remote: Arc<dyn SituationDetection>,
        solvers: SolverTable,
        storage: Arc<dyn MetaDataStorage>,
        queue: Arc<dyn EventQueue>,
        activity: Arc<dyn ActivityListener>,
        max_retries: u32,
    ) -> Self {
        Self {
            local,
            remote,
            solvers,
            storage,
            queue,
            activity,
            max_retries,
        }
    }

    fn process(&self, event: &ObjectEvent) -> Result<bool> {
        let local = self.local.analyse(self.storage.as_ref(), event)?;
        let remote = self.remote.analyse(self.storage.as_ref(), event)?;
        if local == Situation::NoChange && remote == Situation::NoChange {
            debug!("Nothing to do for {}", event);
            return Ok(true);
        }

        let Some(solver) = self.solvers.get(local, remote) else {
            warn!("No solver for local {} and remote {}: {}", local, remote, event);
            return Ok(true);
        };

        let _activity = ActivityGuard::new(Arc::clone(&self.activity));
        match solver.solve(event, local, remote) {
            Ok(()) => Ok(true),
            Err(e) => {
                let attempt = event.increment_retry_count();
                if attempt > self.max_retries {
                    return Err(e.context(format!("Giving up on {} after {} retries", event, self.max_retries)));
                }
                warn!("Solving {} failed (attempt {}/{}): {:#}", event, attempt, self.max_retries, e);
                self.queue.add_event(SyncEvent::Object(event.clone()))?;
                Ok(true)
            }
        }
    }
}

impl SyncEventHandler for SyncMechanism {
    fn priority(&self) -> i32 {
        HandlerRole::SyncMechanism.priority()
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        match event {
            SyncEvent::Object(object) => self.process(object),
            _ => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "SyncMechanism"
    }
}
