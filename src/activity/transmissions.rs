use docsync_core::domain::{FileTransmissionEvent, SubscriptionId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::debug;
use uuid::Uuid;

/// Change of the active transmission list
#[derive(Debug, Clone)]
pub enum TransmissionListChange {
    Added(Arc<FileTransmissionEvent>),
    Removed(Arc<FileTransmissionEvent>),
}

pub type TransmissionListObserver = Arc<dyn Fn(&TransmissionListChange) + Send + Sync>;

#[derive(Default)]
struct State {
    subscriptions: HashMap<Uuid, SubscriptionId>,
    ordered: Vec<Arc<FileTransmissionEvent>>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    observers: Mutex<Vec<TransmissionListObserver>>,
}

impl Inner {
    fn notify(&self, change: TransmissionListChange) {
        let observers: Vec<TransmissionListObserver> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Arc::clone)
            .collect();
        for observer in observers {
            observer(&change);
        }
    }

    fn remove(&self, transmission: &FileTransmissionEvent) {
        let removed = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(subscription) = state.subscriptions.remove(&transmission.id()) else {
                return;
            };
            transmission.unsubscribe(subscription);
            let index = state.ordered.iter().position(|t| t.id() == transmission.id());
            index.map(|index| state.ordered.remove(index))
        };

        if let Some(removed) = removed {
            debug!("Transmission finished: {}", removed);
            self.notify(TransmissionListChange::Removed(removed));
        }
    }
}

/// Registry of transfers in flight, in the order they were added.
///
/// A transmission leaves the registry on its own once a progress report marks
/// it aborted, completed or failed; there is no other way to remove one.
#[derive(Default)]
pub struct ActiveActivitiesManager {
    inner: Arc<Inner>,
}

impl ActiveActivitiesManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `transmission`. Returns `false` if it is tracked
    /// already.
    pub fn add_transmission(&self, transmission: Arc<FileTransmissionEvent>) -> bool {
        {
            let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.subscriptions.contains_key(&transmission.id()) {
                return false;
            }

            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let subscription = transmission.subscribe(Arc::new(move |event, progress| {
                if progress.is_finished() {
                    if let Some(inner) = weak.upgrade() {
                        inner.remove(event);
                    }
                }
            }));
            state.subscriptions.insert(transmission.id(), subscription);
            state.ordered.push(Arc::clone(&transmission));
        }

        debug!("Transmission started: {}", transmission);
        self.inner.notify(TransmissionListChange::Added(transmission));
        true
    }

    /// Snapshot of the active transmissions, oldest first
    pub fn active_transmissions(&self) -> Vec<Arc<FileTransmissionEvent>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ordered
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner).ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observe additions and removals, e.g. to drive a status list
    pub fn subscribe(&self, observer: TransmissionListObserver) {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }
}

impl fmt::Debug for ActiveActivitiesManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveActivitiesManager")
            .field("active", &self.len())
            .finish_non_exhaustive()
    }
}
