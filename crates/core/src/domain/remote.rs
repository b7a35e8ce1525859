use super::change::{ObjectKind, RemoteChangeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A document or folder as seen by the remote repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    pub kind: ObjectKind,
    /// Full remote path. Documents may be unfiled and have none.
    pub path: Option<String>,
    pub parent_id: Option<String>,
    pub change_token: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_length: Option<u64>,
}

impl RemoteObject {
    pub fn folder(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ObjectKind::Folder,
            path: Some(path.into()),
            parent_id: None,
            change_token: None,
            last_modified: None,
            content_length: None,
        }
    }

    pub fn document(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::File,
            ..Self::folder(id, name, path)
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_change_token(mut self, token: impl Into<String>) -> Self {
        self.change_token = Some(token.into());
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == ObjectKind::File
    }
}

impl fmt::Display for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} {} ({})", self.kind, path, self.id),
            None => write!(f, "{} {} ({})", self.kind, self.name, self.id),
        }
    }
}

/// Level of change log support advertised by a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityChanges {
    None,
    ObjectIdsOnly,
    Properties,
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryCapabilities {
    /// `None` when the repository does not report the capability at all
    pub changes: Option<CapabilityChanges>,
}

impl RepositoryCapabilities {
    pub fn supports_change_log(&self) -> bool {
        matches!(
            self.changes,
            Some(CapabilityChanges::ObjectIdsOnly | CapabilityChanges::Properties | CapabilityChanges::All)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub id: String,
    pub capabilities: RepositoryCapabilities,
    pub latest_change_log_token: Option<String>,
}

/// One entry of the remote change log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub kind: RemoteChangeKind,
    pub object_id: String,
}

/// One page of the remote change log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogBatch {
    pub entries: Vec<ChangeLogEntry>,
    pub has_more: bool,
    pub latest_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_capability_means_unsupported() {
        let caps = RepositoryCapabilities::default();
        assert!(!caps.supports_change_log());

        let caps = RepositoryCapabilities { changes: Some(CapabilityChanges::None) };
        assert!(!caps.supports_change_log());

        let caps = RepositoryCapabilities { changes: Some(CapabilityChanges::ObjectIdsOnly) };
        assert!(caps.supports_change_log());
    }

    #[test]
    fn test_document_builder() {
        let doc = RemoteObject::document("42", "a.txt", "/docs/a.txt")
            .with_parent("7")
            .with_change_token("t1");
        assert!(doc.is_file());
        assert_eq!(doc.parent_id.as_deref(), Some("7"));
        assert_eq!(doc.change_token.as_deref(), Some("t1"));
        assert!(doc.to_string().contains("/docs/a.txt"));
    }
}
