use super::change::ObjectKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name under which the synchronized root folder is stored
pub const ROOT_NAME: &str = "/";

/// Binding between a local object and its remote counterpart, as persisted
/// in the metadata store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedObject {
    pub name: String,
    pub remote_id: String,
    pub kind: ObjectKind,
    pub parent_id: Option<String>,
    pub last_change_token: Option<String>,
    pub guid: Uuid,
    pub last_remote_write: Option<DateTime<Utc>>,
    pub last_local_write: Option<DateTime<Utc>>,
}

impl MappedObject {
    pub fn new(name: impl Into<String>, remote_id: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            remote_id: remote_id.into(),
            kind,
            parent_id: None,
            last_change_token: None,
            guid: Uuid::nil(),
            last_remote_write: None,
            last_local_write: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_change_token(mut self, token: impl Into<String>) -> Self {
        self.last_change_token = Some(token.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none() && self.name == ROOT_NAME
    }
}
