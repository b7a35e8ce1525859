//! Events carried by the sync bus.
//!
//! Every event is immutable once built, except for three declared mutation
//! points: the retry counter of an [`ObjectEvent`], the progress of a
//! [`FileTransmissionEvent`], and the write-once remote object slots that
//! cache a lazily resolved [`RemoteObject`].

use super::change::{ChangeType, ContentChangeType, EventCategory, FsChangeKind, ObjectKind, RemoteChangeKind};
use super::remote::RemoteObject;
use super::transmission::FileTransmissionEvent;
use crate::error::{Result, SyncError};
use crate::ports::session::RemoteSession;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Everything that can travel through the bus
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A file or folder changed locally and/or remotely
    Object(ObjectEvent),

    /// The remote change log reported a change
    ContentChange(ContentChangeEvent),

    /// A raw filesystem watcher notification
    Fs(FsEvent),

    /// A file transfer was started or progressed
    Transmission(Arc<FileTransmissionEvent>),

    /// Time to look for changes again
    StartNextSync(StartNextSyncEvent),

    /// A full crawl finished
    FullSyncCompleted(FullSyncCompletedEvent),

    /// Repository settings changed at runtime
    ConfigChanged(ConfigChangedEvent),

    /// A session against the remote repository was established
    SuccessfulLogin(SuccessfulLoginEvent),

    PermissionDenied(PermissionDeniedEvent),

    InteractionNeeded(InteractionNeededEvent),

    ConfigurationNeeded(ConfigurationNeededEvent),
}

impl SyncEvent {
    /// Metrics category. Stable for the lifetime of the event.
    pub fn category(&self) -> EventCategory {
        match self {
            SyncEvent::Object(event) => event.category(),
            SyncEvent::ContentChange(_) | SyncEvent::Fs(_) => EventCategory::DetectedChange,
            SyncEvent::Transmission(_) => EventCategory::Transmission,
            SyncEvent::StartNextSync(event) if event.full_sync_requested => EventCategory::SyncRequested,
            SyncEvent::StartNextSync(_) => EventCategory::PeriodicSync,
            SyncEvent::FullSyncCompleted(_) | SyncEvent::ConfigChanged(_) | SyncEvent::SuccessfulLogin(_) => {
                EventCategory::Lifecycle
            }
            SyncEvent::PermissionDenied(_) | SyncEvent::InteractionNeeded(_) | SyncEvent::ConfigurationNeeded(_) => {
                EventCategory::Failure
            }
        }
    }

    pub fn as_object(&self) -> Option<&ObjectEvent> {
        match self {
            SyncEvent::Object(event) => Some(event),
            _ => None,
        }
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Object(event) => fmt::Display::fmt(event, f),
            SyncEvent::ContentChange(event) => fmt::Display::fmt(event, f),
            SyncEvent::Fs(event) => fmt::Display::fmt(event, f),
            SyncEvent::Transmission(event) => fmt::Display::fmt(event, f),
            SyncEvent::StartNextSync(event) => fmt::Display::fmt(event, f),
            SyncEvent::FullSyncCompleted(event) => fmt::Display::fmt(event, f),
            SyncEvent::ConfigChanged(event) => fmt::Display::fmt(event, f),
            SyncEvent::SuccessfulLogin(event) => fmt::Display::fmt(event, f),
            SyncEvent::PermissionDenied(event) => fmt::Display::fmt(event, f),
            SyncEvent::InteractionNeeded(event) => fmt::Display::fmt(event, f),
            SyncEvent::ConfigurationNeeded(event) => fmt::Display::fmt(event, f),
        }
    }
}

macro_rules! impl_from_event {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for SyncEvent {
                fn from(event: $ty) -> Self {
                    SyncEvent::$variant(event)
                }
            }
        )*
    };
}

impl_from_event!(
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

/// Retry count of an event. Cloning snapshots the current value.
#[derive(Debug, Default)]
pub struct RetryCounter(AtomicU32);

impl RetryCounter {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    /// Increment and return the new count
    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Clone for RetryCounter {
    fn clone(&self) -> Self {
        Self(AtomicU32::new(self.get()))
    }
}

/// Identity an object had before it was moved or renamed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovedFrom {
    pub old_local_path: Option<PathBuf>,
    pub old_remote_path: Option<String>,
}

/// A change of a file or folder on either side
#[derive(Debug, Clone)]
pub struct ObjectEvent {
    kind: ObjectKind,
    local_path: Option<PathBuf>,
    remote_object: OnceLock<RemoteObject>,
    local: ChangeType,
    remote: ChangeType,
    content: ContentChangeType,
    moved_from: Option<MovedFrom>,
    retry: RetryCounter,
    category: EventCategory,
}

impl ObjectEvent {
    pub fn folder(
        local_path: Option<PathBuf>,
        remote_object: Option<RemoteObject>,
        local: ChangeType,
        remote: ChangeType,
    ) -> Result<Self> {
        Self::build(ObjectKind::Folder, local_path, remote_object, local, remote)
    }

    pub fn file(
        local_path: Option<PathBuf>,
        remote_object: Option<RemoteObject>,
        local: ChangeType,
        remote: ChangeType,
    ) -> Result<Self> {
        Self::build(ObjectKind::File, local_path, remote_object, local, remote)
    }

    fn build(
        kind: ObjectKind,
        local_path: Option<PathBuf>,
        remote_object: Option<RemoteObject>,
        local: ChangeType,
        remote: ChangeType,
    ) -> Result<Self> {
        if local_path.is_none() && remote_object.is_none() {
            return Err(SyncError::invalid_argument(format!(
                "{} event needs a local path or a remote object, both are missing",
                kind
            )));
        }
        let slot = OnceLock::new();
        if let Some(object) = remote_object {
            let _ = slot.set(object);
        }
        Ok(Self {
            kind,
            local_path,
            remote_object: slot,
            local,
            remote,
            content: ContentChangeType::None,
            moved_from: None,
            retry: RetryCounter::default(),
            category: EventCategory::DetectedChange,
        })
    }

    /// Set the content axis. Ignored for folders, which have no content.
    pub fn with_content(mut self, content: ContentChangeType) -> Self {
        if self.kind == ObjectKind::File {
            self.content = content;
        }
        self
    }

    pub fn with_moved_from(mut self, moved_from: MovedFrom) -> Self {
        self.moved_from = Some(moved_from);
        self
    }

    pub fn with_category(mut self, category: EventCategory) -> Self {
        self.category = category;
        self
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == ObjectKind::File
    }

    pub fn local(&self) -> ChangeType {
        self.local
    }

    pub fn remote(&self) -> ChangeType {
        self.remote
    }

    pub fn content(&self) -> ContentChangeType {
        self.content
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    pub fn remote_object(&self) -> Option<&RemoteObject> {
        self.remote_object.get()
    }

    /// Fill the remote object slot if it is still empty. Returns whatever the
    /// slot holds afterwards.
    pub fn resolve_remote_object(&self, object: RemoteObject) -> &RemoteObject {
        self.remote_object.get_or_init(|| object)
    }

    pub fn moved_from(&self) -> Option<&MovedFrom> {
        self.moved_from.as_ref()
    }

    pub fn is_moved(&self) -> bool {
        self.moved_from.is_some()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry.get()
    }

    /// Only the handler owning retry semantics calls this
    pub fn increment_retry_count(&self) -> u32 {
        self.retry.increment()
    }

    pub fn category(&self) -> EventCategory {
        self.category
    }
}

impl fmt::Display for ObjectEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match (self.kind, self.is_moved()) {
            (ObjectKind::File, false) => "FileEvent",
            (ObjectKind::File, true) => "FileMovedEvent",
            (ObjectKind::Folder, false) => "FolderEvent",
            (ObjectKind::Folder, true) => "FolderMovedEvent",
        };
        write!(f, "{} [Local: {}, Remote: {}", name, self.local, self.remote)?;
        if self.is_file() {
            write!(f, ", Content: {}", self.content)?;
        }
        if let Some(path) = &self.local_path {
            write!(f, ", LocalPath: {}", path.display())?;
        }
        if let Some(object) = self.remote_object() {
            write!(f, ", Remote: {}", object)?;
        }
        if let Some(moved) = &self.moved_from {
            if let Some(old) = &moved.old_local_path {
                write!(f, ", OldLocalPath: {}", old.display())?;
            }
            if let Some(old) = &moved.old_remote_path {
                write!(f, ", OldRemotePath: {}", old)?;
            }
        }
        write!(f, ", Retry: {}]", self.retry_count())
    }
}

/// A remote change log entry, resolved to its object on demand
#[derive(Debug, Clone)]
pub struct ContentChangeEvent {
    kind: RemoteChangeKind,
    object_id: String,
    object: OnceLock<RemoteObject>,
}

impl ContentChangeEvent {
    pub fn new(kind: RemoteChangeKind, object_id: impl Into<String>) -> Self {
        Self {
            kind,
            object_id: object_id.into(),
            object: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> RemoteChangeKind {
        self.kind
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// The remote object, if it was resolved already
    pub fn remote_object(&self) -> Option<&RemoteObject> {
        self.object.get()
    }

    /// Fetch the remote object once. `Ok(None)` when the object no longer
    /// exists remotely.
    pub fn resolve(&self, session: &dyn RemoteSession) -> anyhow::Result<Option<&RemoteObject>> {
        if let Some(object) = self.object.get() {
            return Ok(Some(object));
        }
        match session.get_object_by_id(&self.object_id)? {
            Some(object) => Ok(Some(self.object.get_or_init(|| object))),
            None => Ok(None),
        }
    }
}

impl fmt::Display for ContentChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentChangeEvent [{:?} {}]", self.kind, self.object_id)
    }
}

/// A raw filesystem notification
#[derive(Debug, Clone, PartialEq)]
pub struct FsEvent {
    kind: FsChangeKind,
    path: PathBuf,
    old_path: Option<PathBuf>,
    directory_hint: Option<bool>,
}

impl FsEvent {
    pub fn new(kind: FsChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            old_path: None,
            directory_hint: None,
        }
    }

    /// A rename from `old_path` to `path`
    pub fn moved(old_path: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FsChangeKind::Renamed,
            path: path.into(),
            old_path: Some(old_path.into()),
            directory_hint: None,
        }
    }

    /// Record what the watcher knew about the entry. Needed for deletions,
    /// where the path can no longer be inspected.
    pub fn with_directory_hint(mut self, is_directory: bool) -> Self {
        self.directory_hint = Some(is_directory);
        self
    }

    pub fn kind(&self) -> FsChangeKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn old_path(&self) -> Option<&Path> {
        self.old_path.as_deref()
    }

    pub fn is_directory(&self) -> bool {
        self.directory_hint.unwrap_or_else(|| self.path.is_dir())
    }
}

impl fmt::Display for FsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.old_path {
            Some(old) => write!(f, "FSMovedEvent [{} -> {}]", old.display(), self.path.display()),
            None => write!(f, "FSEvent [{:?} {}]", self.kind, self.path.display()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartNextSyncEvent {
    pub full_sync_requested: bool,
}

impl StartNextSyncEvent {
    pub fn new(full_sync_requested: bool) -> Self {
        Self { full_sync_requested }
    }
}

impl fmt::Display for StartNextSyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StartNextSyncEvent [FullSyncRequested: {}]", self.full_sync_requested)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullSyncCompletedEvent {
    pub start_event: StartNextSyncEvent,
}

impl fmt::Display for FullSyncCompletedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FullSyncCompletedEvent [{}]", self.start_event)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigChangedEvent {
    pub poll_interval: Option<Duration>,
}

impl fmt::Display for ConfigChangedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.poll_interval {
            Some(interval) => write!(f, "ConfigChangedEvent [PollInterval: {:?}]", interval),
            None => f.write_str("ConfigChangedEvent"),
        }
    }
}

#[derive(Clone)]
pub struct SuccessfulLoginEvent {
    pub url: String,
    pub session: Arc<dyn RemoteSession>,
}

impl SuccessfulLoginEvent {
    pub fn new(url: impl Into<String>, session: Arc<dyn RemoteSession>) -> Self {
        Self {
            url: url.into(),
            session,
        }
    }
}

impl fmt::Debug for SuccessfulLoginEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuccessfulLoginEvent")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for SuccessfulLoginEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SuccessfulLoginEvent [{}]", self.url)
    }
}

#[derive(Debug, Clone)]
pub struct PermissionDeniedEvent {
    pub error: Arc<anyhow::Error>,
}

impl PermissionDeniedEvent {
    pub fn new(error: anyhow::Error) -> Self {
        Self { error: Arc::new(error) }
    }
}

impl fmt::Display for PermissionDeniedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PermissionDeniedEvent [{}]", self.error)
    }
}

/// A failure a human has to look at before sync can proceed
#[derive(Debug, Clone)]
pub struct InteractionNeededEvent {
    pub title: String,
    pub description: String,
    pub details: String,
    pub actions: Vec<String>,
    pub error: Arc<anyhow::Error>,
}

impl InteractionNeededEvent {
    /// Title and description default to the error message, details to its
    /// full cause chain
    pub fn new(error: anyhow::Error) -> Self {
        let title = error.to_string();
        let details = format!("{:#}", error);
        Self {
            description: title.clone(),
            title,
            details,
            actions: Vec::new(),
            error: Arc::new(error),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }
}

impl fmt::Display for InteractionNeededEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InteractionNeededEvent [{}: {}]", self.title, self.description)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigurationNeededEvent {
    pub error: Arc<anyhow::Error>,
}

impl ConfigurationNeededEvent {
    pub fn new(error: anyhow::Error) -> Self {
        Self { error: Arc::new(error) }
    }
}

impl fmt::Display for ConfigurationNeededEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigurationNeededEvent [{}]", self.error)
    }
}
