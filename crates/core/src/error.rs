use std::path::PathBuf;
use thiserror::Error;

/// Core sync errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Illegal state: {reason}")]
    IllegalState { reason: String },

    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Extended attributes are not supported at {}", path.display())]
    ExtendedAttributesNotSupported { path: PathBuf },
}

impl SyncError {
    pub fn illegal_state(reason: impl Into<String>) -> Self {
        Self::IllegalState { reason: reason.into() }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument { reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
