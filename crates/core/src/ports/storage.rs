use crate::domain::mapped::MappedObject;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Port for the metadata store binding local and remote identities.
///
/// Implementations serialize their own writes; callers may use them from any
/// thread.
pub trait MetaDataStorage: Send + Sync {
    /// Insert or replace the record for `object.remote_id`
    fn save_mapped_object(&self, object: &MappedObject) -> Result<()>;

    fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<MappedObject>>;

    fn get_by_local_path(&self, path: &Path) -> Result<Option<MappedObject>>;

    /// Absolute local path of a stored object, if its ancestry is known
    fn get_local_path(&self, object: &MappedObject) -> Result<Option<PathBuf>>;

    /// Full remote path of a stored object, if its ancestry is known
    fn get_remote_path(&self, object: &MappedObject) -> Result<Option<String>>;

    fn mapped_objects(&self) -> Result<Vec<MappedObject>>;

    fn change_log_token(&self) -> Result<Option<String>>;

    fn set_change_log_token(&self, token: &str) -> Result<()>;
}
