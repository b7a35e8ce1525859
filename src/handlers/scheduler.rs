use crate::bus::handler::SyncEventHandler;
use crate::bus::priority::HandlerRole;
use crate::bus::queue::EventQueue;
use anyhow::{Context, Result};
use crossbeam_channel::{RecvTimeoutError, Sender};
use docsync_core::domain::{StartNextSyncEvent, SyncEvent};
use docsync_core::error::SyncError;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

enum Control {
    Reset,
    SetInterval(Duration),
}

/// Enqueues a periodic [`StartNextSyncEvent`].
///
/// As a handler it follows interval changes and restarts the timer whenever
/// a full sync was requested by someone else. It never consumes.
pub struct SyncScheduler {
    queue: Arc<dyn EventQueue>,
    interval: Mutex<Duration>,
    control: Mutex<Option<Sender<Control>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(queue: Arc<dyn EventQueue>, interval: Duration) -> docsync_core::Result<Self> {
        if interval.is_zero() {
            return Err(SyncError::invalid_argument("poll interval must be positive"));
        }
        Ok(Self {
            queue,
            interval: Mutex::new(interval),
            control: Mutex::new(None),
            timer: Mutex::new(None),
        })
    }

    pub fn interval(&self) -> Duration {
        *self.interval.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request a sync right away and start the timer. Starting twice is a
    /// no-op.
    pub fn start(&self) -> Result<()> {
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        if control.is_some() {
            return Ok(());
        }

        self.queue.add_event(StartNextSyncEvent::new(false).into())?;

        let (sender, receiver) = crossbeam_channel::unbounded::<Control>();
        let queue = Arc::clone(&self.queue);
        let mut interval = self.interval();
        let handle = thread::Builder::new()
            .name("sync-scheduler".to_string())
            .spawn(move || {
                loop {
                    match receiver.recv_timeout(interval) {
                        Ok(Control::Reset) => debug!("Sync timer reset"),
                        Ok(Control::SetInterval(next)) => interval = next,
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(e) = queue.add_event(StartNextSyncEvent::new(false).into()) {
                                debug!("Sync timer stops: {}", e);
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .context("Failed to spawn sync scheduler")?;

        *control = Some(sender);
        *self.timer.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        info!("Sync scheduler started with interval {:?}", self.interval());
        Ok(())
    }

    /// Stop the timer and wait for its thread
    pub fn stop(&self) {
        let sender = self.control.lock().unwrap_or_else(PoisonError::into_inner).take();
        drop(sender);
        let handle = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Sync scheduler thread terminated abnormally");
            }
        }
    }

    fn send(&self, message: Control) {
        if let Some(sender) = self.control.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            let _ = sender.send(message);
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SyncEventHandler for SyncScheduler {
    fn priority(&self) -> i32 {
        HandlerRole::Scheduler.priority()
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        match event {
            SyncEvent::ConfigChanged(config) => match config.poll_interval {
                Some(interval) if interval.is_zero() => warn!("Ignoring zero poll interval"),
                Some(interval) if interval != self.interval() => {
                    *self.interval.lock().unwrap_or_else(PoisonError::into_inner) = interval;
                    info!("Poll interval changed to {:?}", interval);
                    self.send(Control::SetInterval(interval));
                }
                _ => {}
            },
            SyncEvent::StartNextSync(start) if start.full_sync_requested => self.send(Control::Reset),
            _ => {}
        }
        Ok(false)
    }

    fn name(&self) -> &str {
        "SyncScheduler"
    }
}
