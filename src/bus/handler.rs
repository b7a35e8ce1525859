use super::priority;
use anyhow::Result;
use docsync_core::domain::{
    ConfigChangedEvent, ConfigurationNeededEvent, ContentChangeEvent, FileTransmissionEvent, FsEvent,
    FullSyncCompletedEvent, InteractionNeededEvent, ObjectEvent, PermissionDeniedEvent, StartNextSyncEvent,
    SuccessfulLoginEvent, SyncEvent,
};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A link in the dispatch chain.
///
/// The bus calls `handle` from its single consumer thread, so two handlers
/// never run at the same time. Handlers that also expose methods to other
/// threads must still synchronize those themselves.
pub trait SyncEventHandler: Send + Sync {
    /// Higher priorities see events first
    fn priority(&self) -> i32;

    /// Return `Ok(true)` to consume the event and stop the walk
    fn handle(&self, event: &SyncEvent) -> Result<bool>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Selects one variant out of a [`SyncEvent`]
pub trait EventVariant: Send + Sync + 'static {
    fn from_event(event: &SyncEvent) -> Option<&Self>;
}

macro_rules! impl_event_variant {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl EventVariant for $ty {
                fn from_event(event: &SyncEvent) -> Option<&Self> {
                    match event {
                        SyncEvent::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_event_variant!(
    Object(ObjectEvent),
    ContentChange(ContentChangeEvent),
    Fs(FsEvent),
    Transmission(Arc<FileTransmissionEvent>),
    StartNextSync(StartNextSyncEvent),
    FullSyncCompleted(FullSyncCompletedEvent),
    ConfigChanged(ConfigChangedEvent),
    SuccessfulLogin(SuccessfulLoginEvent),
    PermissionDenied(PermissionDeniedEvent),
    InteractionNeeded(InteractionNeededEvent),
    ConfigurationNeeded(ConfigurationNeededEvent),
);

type Callback = Box<dyn Fn(&SyncEvent) -> Result<bool> + Send + Sync>;

/// Handler built from a closure, optionally restricted to one event variant
pub struct GenericSyncEventHandler {
    name: String,
    priority: i32,
    callback: Callback,
}

impl GenericSyncEventHandler {
    /// Handler that sees every event
    pub fn new<F>(name: impl Into<String>, priority: i32, callback: F) -> Self
    where
        F: Fn(&SyncEvent) -> Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            callback: Box::new(callback),
        }
    }

    /// Handler that only sees events of variant `T`; every other event is
    /// passed on untouched
    pub fn for_variant<T, F>(name: impl Into<String>, priority: i32, callback: F) -> Self
    where
        T: EventVariant,
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        Self::new(name, priority, move |event| match T::from_event(event) {
            Some(inner) => callback(inner),
            None => Ok(false),
        })
    }
}

impl SyncEventHandler for GenericSyncEventHandler {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        (self.callback)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for GenericSyncEventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericSyncEventHandler")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Logs every event passing through the bus
#[derive(Debug, Default)]
pub struct DebugLoggingHandler;

impl SyncEventHandler for DebugLoggingHandler {
    fn priority(&self) -> i32 {
        priority::DEBUG
    }

    fn handle(&self, event: &SyncEvent) -> Result<bool> {
        debug!(category = ?event.category(), "{}", event);
        Ok(false)
    }

    fn name(&self) -> &str {
        "DebugLoggingHandler"
    }
}
