use crate::domain::remote::{ChangeLogBatch, RemoteObject, RepositoryInfo};
use anyhow::Result;

/// Port for a logged-in session against the remote document repository
pub trait RemoteSession: Send + Sync {
    /// Repository identity, capabilities and latest change log token
    fn repository_info(&self) -> Result<RepositoryInfo>;

    /// Look up an object by its full remote path. `Ok(None)` when missing.
    fn get_object_by_path(&self, path: &str) -> Result<Option<RemoteObject>>;

    /// Look up an object by id. `Ok(None)` when missing.
    fn get_object_by_id(&self, id: &str) -> Result<Option<RemoteObject>>;

    /// Read one page of the change log, starting after `token`
    fn get_content_changes(&self, token: Option<&str>, max_items: usize) -> Result<ChangeLogBatch>;
}
