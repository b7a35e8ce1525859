//! Priority bands for handlers. Higher values see events first.

/// Observers that log every event and never consume
pub const DEBUG: i32 = 100_000;

/// Handlers that drop events nobody should see
pub const FILTER: i32 = 10_000;

/// Accumulators that enrich or rewrite events before the main mechanism
pub const HIGH: i32 = 2_000;

/// The main mechanism, crawler and watcher consumers
pub const NORMAL: i32 = 1_000;

/// Logical role of a built-in handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerRole {
    DebugLogging,
    IgnoredNamesFilter,
    IgnoreAlreadyHandledFilter,
    ContentChangeAccumulator,
    RemoteObjectFetcher,
    MovedOrRenamedAccumulator,
    ContentChanges,
    Crawler,
    WatcherConsumer,
    SyncMechanism,
    Scheduler,
    Initializer,
}

impl HandlerRole {
    pub const fn priority(self) -> i32 {
        match self {
            HandlerRole::DebugLogging => DEBUG,
            HandlerRole::IgnoredNamesFilter | HandlerRole::IgnoreAlreadyHandledFilter => FILTER,
            HandlerRole::ContentChangeAccumulator
            | HandlerRole::RemoteObjectFetcher
            | HandlerRole::MovedOrRenamedAccumulator => HIGH,
            HandlerRole::ContentChanges
            | HandlerRole::Crawler
            | HandlerRole::WatcherConsumer
            | HandlerRole::SyncMechanism
            | HandlerRole::Scheduler
            | HandlerRole::Initializer => NORMAL,
        }
    }
}
