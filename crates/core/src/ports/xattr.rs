use crate::error::Result;
use std::path::Path;

/// Port for named extended attributes on files and directories.
///
/// Filesystems without extended attribute support must answer with
/// [`SyncError::ExtendedAttributesNotSupported`](crate::error::SyncError::ExtendedAttributesNotSupported)
/// so callers can degrade instead of failing.
pub trait ExtendedAttributes: Send + Sync {
    fn get_attribute(&self, path: &Path, name: &str) -> Result<Option<String>>;

    fn set_attribute(&self, path: &Path, name: &str, value: &str) -> Result<()>;
}
