//! Handlers plugged into the sync event bus

pub mod content_changes;
pub mod crawler;
pub mod fetcher;
pub mod filters;
pub mod initializer;
pub mod mechanism;
pub mod moved;
pub mod scheduler;
pub mod watcher_consumer;

// Re-exports
pub use content_changes::{ContentChangeEventAccumulator, ContentChanges};
pub use crawler::DescendantsCrawler;
pub use fetcher::RemoteObjectFetcher;
pub use filters::{IgnoreAlreadyHandledContentChangeEventsFilter, IgnoredNames, IgnoredNamesFilter};
pub use initializer::{InitializerSettings, SyncStrategyInitializer, WiringState};
pub use mechanism::{
    LocalSituationDetection, RemoteSituationDetection, Situation, SituationDetection, SituationSolver, SolverTable,
    SyncMechanism,
};
pub use moved::RemoteObjectMovedOrRenamedAccumulator;
pub use scheduler::SyncScheduler;
pub use watcher_consumer::WatcherConsumer;
