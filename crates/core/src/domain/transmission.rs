use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Direction and reason of a file transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransmissionType {
    UploadNewFile,
    UploadModifiedFile,
    DownloadNewFile,
    DownloadModifiedFile,
}

impl fmt::Display for TransmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransmissionType::UploadNewFile => "upload (new)",
            TransmissionType::UploadModifiedFile => "upload (modified)",
            TransmissionType::DownloadNewFile => "download (new)",
            TransmissionType::DownloadModifiedFile => "download (modified)",
        };
        f.write_str(name)
    }
}

/// Progress of a transfer.
///
/// The same shape serves as the retained state of a transmission and as a
/// partial update: `None` in an update means "unchanged".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransmissionProgress {
    pub length: Option<u64>,
    pub actual_position: Option<u64>,
    pub bits_per_second: Option<u64>,
    pub paused: Option<bool>,
    pub aborting: Option<bool>,
    pub aborted: Option<bool>,
    pub completed: Option<bool>,
    pub failure: Option<String>,
}

impl TransmissionProgress {
    /// Overwrite every field that is set in `update`
    pub fn merge(&mut self, update: &TransmissionProgress) {
        fn take<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
            if let Some(value) = source {
                *target = Some(value.clone());
            }
        }

        take(&mut self.length, &update.length);
        take(&mut self.actual_position, &update.actual_position);
        take(&mut self.bits_per_second, &update.bits_per_second);
        take(&mut self.paused, &update.paused);
        take(&mut self.aborting, &update.aborting);
        take(&mut self.aborted, &update.aborted);
        take(&mut self.completed, &update.completed);
        take(&mut self.failure, &update.failure);
    }

    /// Percentage transferred, `None` while the length is unknown
    pub fn percent(&self) -> Option<f64> {
        let length = self.length?;
        if length == 0 {
            return Some(100.0);
        }
        let position = self.actual_position.unwrap_or(0);
        Some(position as f64 * 100.0 / length as f64)
    }

    /// Aborted, completed or failed
    pub fn is_finished(&self) -> bool {
        self.aborted == Some(true) || self.completed == Some(true) || self.failure.is_some()
    }
}

/// Bits per second for `bytes` transferred between `start` and `end`.
///
/// Returns `Ok(None)` for a zero-length interval.
pub fn calc_bits_per_second(start: DateTime<Utc>, end: DateTime<Utc>, bytes: u64) -> Result<Option<u64>> {
    if end < start {
        return Err(SyncError::invalid_argument(format!(
            "transmission end {} lies before its start {}",
            end, start
        )));
    }
    let elapsed = (end - start)
        .to_std()
        .map_err(|e| SyncError::invalid_argument(e.to_string()))?;
    if elapsed.is_zero() {
        return Ok(None);
    }
    let bits = bytes as f64 * 8.0;
    Ok(Some((bits / elapsed.as_secs_f64()) as u64))
}

/// Handle returned by [`FileTransmissionEvent::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type ProgressCallback = Arc<dyn Fn(&FileTransmissionEvent, &TransmissionProgress) + Send + Sync>;

/// One file transfer and its live progress.
///
/// Transfer workers call [`report_progress`](Self::report_progress) from their
/// own threads, so the progress sits behind its own mutex rather than relying
/// on the bus for serialization. Subscribers are called after that mutex is
/// released and may unsubscribe from inside their callback.
pub struct FileTransmissionEvent {
    id: Uuid,
    kind: TransmissionType,
    path: PathBuf,
    cache_path: Option<PathBuf>,
    progress: Mutex<TransmissionProgress>,
    subscribers: Mutex<Vec<(SubscriptionId, ProgressCallback)>>,
    next_subscription: AtomicU64,
}

impl FileTransmissionEvent {
    pub fn new(kind: TransmissionType, path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            path: path.into(),
            cache_path: None,
            progress: Mutex::new(TransmissionProgress::default()),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    pub fn with_cache_path(mut self, cache_path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(cache_path.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TransmissionType {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    /// Snapshot of the merged progress
    pub fn status(&self) -> TransmissionProgress {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn percent(&self) -> Option<f64> {
        self.status().percent()
    }

    pub fn subscribe(&self, callback: ProgressCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Merge a partial update and notify subscribers with the merged state
    pub fn report_progress(&self, update: TransmissionProgress) {
        let merged = {
            let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
            progress.merge(&update);
            progress.clone()
        };

        let callbacks: Vec<ProgressCallback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(self, &merged);
        }
    }
}

impl fmt::Debug for FileTransmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTransmissionEvent")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("progress", &self.status())
            .finish()
    }
}

impl fmt::Display for FileTransmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status();
        write!(f, "FileTransmissionEvent {} {}", self.kind, self.path.display())?;
        match status.percent() {
            Some(percent) => write!(f, " {:.1}%", percent),
            None => Ok(()),
        }
    }
}
