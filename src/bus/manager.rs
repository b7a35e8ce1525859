use super::handler::SyncEventHandler;
use anyhow::{Context, Result};
use docsync_core::domain::SyncEvent;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Registration side of the handler chain
pub trait EventManager: Send + Sync {
    fn add_event_handler(&self, handler: Arc<dyn SyncEventHandler>);

    /// Remove by identity. Returns whether the handler was registered.
    fn remove_event_handler(&self, handler: &Arc<dyn SyncEventHandler>) -> bool;
}

/// Priority-ordered chain of responsibility.
///
/// Handlers are kept sorted ascending by priority and walked from the end,
/// so the highest priority sees an event first. A new handler is inserted in
/// front of existing handlers of the same priority, which makes the earliest
/// registered handler win among equals.
///
/// Dispatch copies the list under the same mutex that guards registration and
/// walks the copy, so handlers may register or remove handlers (including
/// themselves) while handling an event. Such changes apply from the next event
/// on.
#[derive(Default)]
pub struct SyncEventManager {
    handlers: Mutex<Vec<Arc<dyn SyncEventHandler>>>,
}

impl SyncEventManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn SyncEventHandler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer `event` to the handlers, highest priority first, until one
    /// consumes it. Returns whether any handler did.
    pub fn handle(&self, event: &SyncEvent) -> Result<bool> {
        let snapshot: Vec<Arc<dyn SyncEventHandler>> = self.lock().clone();

        for handler in snapshot.iter().rev() {
            let consumed = handler
                .handle(event)
                .with_context(|| format!("{} failed to handle {}", handler.name(), event))?;
            if consumed {
                trace!(handler = handler.name(), "{} consumed", event);
                return Ok(true);
            }
        }

        trace!("{} was not consumed by any handler", event);
        Ok(false)
    }

    pub fn handler_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every handler, returning how many there were
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.lock());
        removed.len()
    }

    /// Handler names in dispatch order
    pub fn handler_names(&self) -> Vec<String> {
        self.lock().iter().rev().map(|h| h.name().to_string()).collect()
    }
}

impl EventManager for SyncEventManager {
    fn add_event_handler(&self, handler: Arc<dyn SyncEventHandler>) {
        let mut handlers = self.lock();
        let priority = handler.priority();
        let position = handlers.partition_point(|h| h.priority() < priority);
        trace!(handler = handler.name(), priority, position, "adding event handler");
        handlers.insert(position, handler);
    }

    fn remove_event_handler(&self, handler: &Arc<dyn SyncEventHandler>) -> bool {
        let mut handlers = self.lock();
        match handlers.iter().position(|h| same_handler(h, handler)) {
            Some(index) => {
                handlers.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Pointer identity, ignoring vtables
pub fn same_handler(a: &Arc<dyn SyncEventHandler>, b: &Arc<dyn SyncEventHandler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
