use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::utils::logical_path;

/// `physical_path` of every directory node.
pub const DIRECTORY_SENTINEL: &str = "virtual";

/// One entry of the logical namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: Uuid,
    pub logical_path: String,
    pub parent_path: String,
    pub physical_path: String,
    pub file_name: String,
    pub is_directory: bool,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Parent the node had before its last delete or move.
    pub restore_path: Option<String>,
    pub mime_type: Option<String>,
}

impl Node {
    pub fn new_file(
        logical_path: impl Into<String>,
        physical_path: &Path,
        size: u64,
        mime_type: Option<String>,
    ) -> Self {
        let logical_path = logical_path.into();
        let now = Utc::now();
        Node {
            id: Uuid::new_v4(),
            parent_path: logical_path::parent_of(&logical_path),
            file_name: logical_path::file_name(&logical_path).to_string(),
            logical_path,
            physical_path: physical_path.to_string_lossy().into_owned(),
            is_directory: false,
            size,
            created_at: now,
            modified_at: now,
            restore_path: None,
            mime_type,
        }
    }

    pub fn new_directory(logical_path: impl Into<String>) -> Self {
        let logical_path = logical_path.into();
        let now = Utc::now();
        Node {
            id: Uuid::new_v4(),
            parent_path: logical_path::parent_of(&logical_path),
            file_name: logical_path::file_name(&logical_path).to_string(),
            logical_path,
            physical_path: DIRECTORY_SENTINEL.to_string(),
            is_directory: true,
            size: 0,
            created_at: now,
            modified_at: now,
            restore_path: None,
            mime_type: None,
        }
    }

    /// On-disk location of a file node; `None` for directories.
    pub fn physical(&self) -> Option<PathBuf> {
        (!self.is_directory && self.physical_path != DIRECTORY_SENTINEL)
            .then(|| PathBuf::from(&self.physical_path))
    }

    pub fn username(&self) -> &str {
        logical_path::username(&self.logical_path)
    }
}

// Timestamps are stored as unix milliseconds, sizes as INTEGER.
impl<'r> FromRow<'r, SqliteRow> for Node {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        let size: i64 = row.try_get("size")?;
        Ok(Node {
            id: row.try_get("id")?,
            logical_path: row.try_get("logical_path")?,
            parent_path: row.try_get("parent_path")?,
            physical_path: row.try_get("physical_path")?,
            file_name: row.try_get("file_name")?,
            is_directory: row.try_get("is_directory")?,
            size: u64::try_from(size).map_err(|err| sqlx::Error::Decode(Box::new(err)))?,
            created_at: from_millis(row.try_get("created_at")?)?,
            modified_at: from_millis(row.try_get("modified_at")?)?,
            restore_path: row.try_get("restore_path")?,
            mime_type: row.try_get("mime_type")?,
        })
    }
}

fn from_millis(millis: i64) -> sqlx::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| sqlx::Error::Decode(format!("timestamp {millis} out of range").into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_file_derives_path_fields() {
        let node = Node::new_file(
            "alice/docs/report.pdf",
            Path::new("/mnt/disk1/alice/x-report.pdf"),
            42,
            Some("application/pdf".into()),
        );
        assert_eq!(node.parent_path, "alice/docs");
        assert_eq!(node.file_name, "report.pdf");
        assert_eq!(node.username(), "alice");
        assert_eq!(
            node.physical(),
            Some(PathBuf::from("/mnt/disk1/alice/x-report.pdf"))
        );
        assert!(node.restore_path.is_none());
    }

    #[test]
    fn test_new_directory() {
        let node = Node::new_directory("alice");
        assert_eq!(node.parent_path, "/");
        assert_eq!(node.physical_path, DIRECTORY_SENTINEL);
        assert_eq!(node.size, 0);
        assert!(node.physical().is_none());
    }
}
