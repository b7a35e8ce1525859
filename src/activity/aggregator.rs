use super::transmissions::ActiveActivitiesManager;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{trace, warn};

/// Sink for "something is in progress" signals
pub trait ActivityListener: Send + Sync {
    fn activity_started(&self);
    fn activity_stopped(&self);
}

/// Collapses many concurrent activities into one overall busy/idle signal.
///
/// Every start is forwarded. A stop is forwarded only when it ends the last
/// running activity, so the overall sink stays busy from the first start to
/// the last matching stop. Both forwards happen under the counter mutex, which
/// keeps the sink from seeing a stop overtake a later start. The sink must not
/// call back into the aggregator.
pub struct ActivityListenerAggregator {
    overall: Arc<dyn ActivityListener>,
    transmissions: Arc<ActiveActivitiesManager>,
    active: Mutex<usize>,
}

impl ActivityListenerAggregator {
    pub fn new(overall: Arc<dyn ActivityListener>, transmissions: Arc<ActiveActivitiesManager>) -> Self {
        Self {
            overall,
            transmissions,
            active: Mutex::new(0),
        }
    }

    pub fn transmission_manager(&self) -> &Arc<ActiveActivitiesManager> {
        &self.transmissions
    }

    /// Number of activities currently running
    pub fn active_count(&self) -> usize {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start_activity(self: &Arc<Self>) -> ActivityGuard {
        ActivityGuard::new(Arc::clone(self) as Arc<dyn ActivityListener>)
    }
}

impl ActivityListener for ActivityListenerAggregator {
    fn activity_started(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        *active += 1;
        trace!(active = *active, "activity started");
        self.overall.activity_started();
    }

    fn activity_stopped(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match *active {
            0 => warn!("activity stopped without a matching start, ignoring"),
            1 => {
                *active = 0;
                trace!("last activity stopped");
                self.overall.activity_stopped();
            }
            _ => {
                *active -= 1;
                trace!(active = *active, "activity stopped");
            }
        }
    }
}

impl fmt::Debug for ActivityListenerAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityListenerAggregator")
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

/// Marks one activity as running for as long as the guard lives
#[must_use = "the activity stops as soon as the guard is dropped"]
pub struct ActivityGuard {
    listener: Arc<dyn ActivityListener>,
}

impl ActivityGuard {
    pub fn new(listener: Arc<dyn ActivityListener>) -> Self {
        listener.activity_started();
        Self { listener }
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.listener.activity_stopped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Default)]
    struct CountingListener {
        started: AtomicUsize,
        stopped: AtomicUsize,
    }

    impl ActivityListener for CountingListener {
        fn activity_started(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn activity_stopped(&self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn aggregator() -> (Arc<CountingListener>, Arc<ActivityListenerAggregator>) {
        let sink = Arc::new(CountingListener::default());
        let aggregator = Arc::new(ActivityListenerAggregator::new(
            Arc::clone(&sink) as Arc<dyn ActivityListener>,
            Arc::new(ActiveActivitiesManager::new()),
        ));
        (sink, aggregator)
    }

    #[test]
    fn test_single_start_stop() {
        let (sink, aggregator) = aggregator();
        aggregator.activity_started();
        assert_eq!(sink.started.load(Ordering::SeqCst), 1);
        aggregator.activity_stopped();
        assert_eq!(sink.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(aggregator.active_count(), 0);
    }

    #[test]
    fn test_stop_forwarded_only_after_last() {
        let (sink, aggregator) = aggregator();
        for _ in 0..3 {
            aggregator.activity_started();
        }
        assert_eq!(sink.started.load(Ordering::SeqCst), 3);

        aggregator.activity_stopped();
        aggregator.activity_stopped();
        assert_eq!(sink.stopped.load(Ordering::SeqCst), 0);

        aggregator.activity_stopped();
        assert_eq!(sink.stopped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unmatched_stop_is_ignored() {
        let (sink, aggregator) = aggregator();
        aggregator.activity_stopped();
        assert_eq!(sink.stopped.load(Ordering::SeqCst), 0);
        assert_eq!(aggregator.active_count(), 0);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let (sink, aggregator) = aggregator();
        {
            let _outer = aggregator.start_activity();
            {
                let _inner = aggregator.start_activity();
                assert_eq!(aggregator.active_count(), 2);
            }
            assert_eq!(sink.stopped.load(Ordering::SeqCst), 0);
        }
        assert_eq!(sink.stopped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_producers() {
        let (sink, aggregator) = aggregator();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let aggregator = Arc::clone(&aggregator);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let _guard = ActivityGuard::new(Arc::clone(&aggregator) as Arc<dyn ActivityListener>);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(aggregator.active_count(), 0);
        assert_eq!(sink.started.load(Ordering::SeqCst), 8000);
        let stops = sink.stopped.load(Ordering::SeqCst);
        assert!(stops >= 1 && stops <= 8000);
    }
}
