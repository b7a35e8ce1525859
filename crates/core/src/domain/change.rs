use serde::{Deserialize, Serialize};
use std::fmt;

/// Change observed on one side (local or remote) of a synchronized object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChangeType {
    #[default]
    None,
    Created,
    Changed,
    Deleted,
    Moved,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::None => "NONE",
            ChangeType::Created => "CREATED",
            ChangeType::Changed => "CHANGED",
            ChangeType::Deleted => "DELETED",
            ChangeType::Moved => "MOVED",
        };
        f.write_str(name)
    }
}

/// Change of a file's bytes, independent of its metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContentChangeType {
    #[default]
    None,
    Created,
    Changed,
    Deleted,
    Appended,
}

impl fmt::Display for ContentChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentChangeType::None => "NONE",
            ContentChangeType::Created => "CREATED",
            ContentChangeType::Changed => "CHANGED",
            ContentChangeType::Deleted => "DELETED",
            ContentChangeType::Appended => "APPENDED",
        };
        f.write_str(name)
    }
}

/// Whether a synchronized object is a file or a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    File,
    Folder,
}

impl ObjectKind {
    pub fn from_is_file(is_file: bool) -> Self {
        if is_file { ObjectKind::File } else { ObjectKind::Folder }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::File => f.write_str("File"),
            ObjectKind::Folder => f.write_str("Folder"),
        }
    }
}

/// Metrics category of a countable event. Fixed when the event is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventCategory {
    #[default]
    DetectedChange,
    PeriodicSync,
    SyncRequested,
    Transmission,
    Lifecycle,
    Failure,
}

/// Kind of change reported by the remote change log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteChangeKind {
    Created,
    Updated,
    Deleted,
    Security,
}

/// Kind of raw notification reported by a filesystem watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FsChangeKind {
    Created,
    Changed,
    Deleted,
    Renamed,
}
