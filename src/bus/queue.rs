use super::manager::SyncEventManager;
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use docsync_core::domain::SyncEvent;
use docsync_core::error::SyncError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// Producer-facing side of the bus
pub trait EventQueue: Send + Sync {
    /// Enqueue for later dispatch. Fails with [`SyncError::IllegalState`]
    /// once the queue stopped accepting events.
    fn add_event(&self, event: SyncEvent) -> docsync_core::Result<()>;

    /// Whether the consumer has exited
    fn is_stopped(&self) -> bool;
}

/// Unbounded FIFO drained by one background consumer thread.
///
/// Events are dispatched through the [`SyncEventManager`] one at a time, in
/// the order they were added. A failing or panicking handler is logged and the
/// consumer moves on to the next event.
///
/// Lifecycle: running -> [`stop_listener`](Self::stop_listener) (no new
/// events, queued events still drain) -> stopped. A stopped queue cannot be
/// restarted.
pub struct SyncEventQueue {
    manager: Arc<SyncEventManager>,
    sender: Mutex<Option<Sender<SyncEvent>>>,
    stopped: Arc<AtomicBool>,
    consumer_done: Receiver<()>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEventQueue {
    pub fn new(manager: Arc<SyncEventManager>) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded::<SyncEvent>();
        let (done_tx, consumer_done) = crossbeam_channel::bounded::<()>(0);
        let stopped = Arc::new(AtomicBool::new(false));

        let consumer = {
            let manager = Arc::clone(&manager);
            let stopped = Arc::clone(&stopped);
            thread::Builder::new()
                .name("sync-event-queue".to_string())
                .spawn(move || {
                    // Dropped after `stopped` is set, which wakes waiters
                    let _done = done_tx;
                    consume(&receiver, &manager);
                    stopped.store(true, Ordering::SeqCst);
                    info!("Sync event queue consumer stopped");
                })
                .context("Failed to spawn sync event queue consumer")?
        };

        Ok(Self {
            manager,
            sender: Mutex::new(Some(sender)),
            stopped,
            consumer_done,
            consumer: Mutex::new(Some(consumer)),
        })
    }

    pub fn manager(&self) -> &Arc<SyncEventManager> {
        &self.manager
    }

    /// Stop accepting events. Already queued events are still dispatched.
    pub fn stop_listener(&self) {
        if self.sender.lock().unwrap_or_else(PoisonError::into_inner).take().is_some() {
            debug!("Sync event queue stops accepting events");
        }
    }

    /// Block until the consumer exited or `timeout` elapsed. Returns whether
    /// the consumer exited in time.
    pub fn wait_for_stopped(&self, timeout: Duration) -> bool {
        let exited = match self.consumer_done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };
        if exited {
            self.join_consumer();
        }
        exited
    }

    fn join_consumer(&self) {
        let handle = self.consumer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Sync event queue consumer terminated abnormally");
            }
        }
    }
}

impl EventQueue for SyncEventQueue {
    fn add_event(&self, event: SyncEvent) -> docsync_core::Result<()> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender
                .send(event)
                .map_err(|e| SyncError::illegal_state(format!("sync event queue consumer is gone, dropped {}", e.0))),
            None => Err(SyncError::illegal_state(format!(
                "sync event queue is stopped, rejected {}",
                event
            ))),
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for SyncEventQueue {
    fn drop(&mut self) {
        if self.is_stopped() {
            self.join_consumer();
        } else {
            error!("Sync event queue dropped while its consumer is still running");
            self.stop_listener();
        }
    }
}

fn consume(receiver: &Receiver<SyncEvent>, manager: &SyncEventManager) {
    for event in receiver.iter() {
        match panic::catch_unwind(AssertUnwindSafe(|| manager.handle(&event))) {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Exception on handling event {}: {:?}", event, e),
            Err(payload) => error!("Handler panicked on event {}: {}", event, panic_message(payload.as_ref())),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::handler::GenericSyncEventHandler;
    use crate::bus::manager::EventManager;
    use docsync_core::domain::StartNextSyncEvent;

    #[test]
    fn test_stop_on_empty_queue() -> Result<()> {
        let queue = SyncEventQueue::new(Arc::new(SyncEventManager::new()))?;
        assert!(!queue.is_stopped());
        queue.stop_listener();
        assert!(queue.wait_for_stopped(Duration::from_secs(5)));
        assert!(queue.is_stopped());
        Ok(())
    }

    #[test]
    fn test_add_after_stop_is_illegal() -> Result<()> {
        let queue = SyncEventQueue::new(Arc::new(SyncEventManager::new()))?;
        queue.stop_listener();
        let result = queue.add_event(StartNextSyncEvent::new(false).into());
        assert!(matches!(result, Err(SyncError::IllegalState { .. })));
        Ok(())
    }

    #[test]
    fn test_wait_times_out_while_handler_blocks() -> Result<()> {
        let manager = Arc::new(SyncEventManager::new());
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        manager.add_event_handler(Arc::new(GenericSyncEventHandler::new("blocker", 1, move |_| {
            let _ = release_rx.recv();
            Ok(true)
        })));

        let queue = SyncEventQueue::new(manager)?;
        queue.add_event(StartNextSyncEvent::new(false).into())?;
        queue.stop_listener();
        assert!(!queue.wait_for_stopped(Duration::from_millis(50)));
        assert!(!queue.is_stopped());

        release_tx.send(())?;
        assert!(queue.wait_for_stopped(Duration::from_secs(5)));
        assert!(queue.is_stopped());
        Ok(())
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
