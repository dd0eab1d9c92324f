use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::node::Node;
use crate::error::Result;
use crate::utils::logical_path;

#[async_trait::async_trait]
pub trait NodeRepository: Send + Sync {
    async fn find_by_path(&self, logical_path: &str) -> Result<Option<Node>>;

    async fn exists(&self, logical_path: &str) -> Result<bool> {
        Ok(self.find_by_path(logical_path).await?.is_some())
    }

    /// Direct children, directories first then by name.
    async fn find_children(&self, parent_path: &str) -> Result<Vec<Node>>;

    /// The node at `root` and everything below it, shallowest first.
    async fn find_subtree(&self, root: &str) -> Result<Vec<Node>>;

    async fn insert(&self, node: &Node) -> Result<()>;

    /// Inserts directory nodes in one transaction, skipping paths that
    /// already exist.
    async fn insert_directories(&self, nodes: &[Node]) -> Result<()>;

    /// Rewrites the path fields, `modified_at` and `restore_path` of every
    /// node, matched by id, in one transaction.
    async fn update_batch(&self, nodes: &[Node]) -> Result<()>;

    async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64>;

    /// Top-level trash entries last modified before `cutoff`.
    async fn find_trash_roots_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Node>>;

    /// Every file node outside the trash.
    async fn find_active_files(&self) -> Result<Vec<Node>>;

    async fn find_recent_files(
        &self,
        username: &str,
        limit: u32,
        multimedia_only: bool,
    ) -> Result<Vec<Node>>;

    async fn count(&self) -> Result<u64>;
}

#[derive(Debug)]
pub struct SqliteNodeRepository {
    pub pool: Arc<SqlitePool>,
}

impl SqliteNodeRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

/// Length of `prefix` as SQLite's `substr` counts it.
fn prefix_len(prefix: &str) -> i64 {
    prefix.chars().count() as i64
}

#[async_trait::async_trait]
impl NodeRepository for SqliteNodeRepository {
    async fn find_by_path(&self, logical_path: &str) -> Result<Option<Node>> {
        let node = sqlx::query_as::<_, Node>("SELECT * FROM file_nodes WHERE logical_path = ?")
            .bind(logical_path)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(node)
    }

    async fn find_children(&self, parent_path: &str) -> Result<Vec<Node>> {
        let nodes = sqlx::query_as::<_, Node>(
            "SELECT * FROM file_nodes WHERE parent_path = ? ORDER BY is_directory DESC, file_name ASC",
        )
        .bind(parent_path)
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(nodes)
    }

    async fn find_subtree(&self, root: &str) -> Result<Vec<Node>> {
        let prefix = format!("{root}/");
        let nodes = sqlx::query_as::<_, Node>(
            "SELECT * FROM file_nodes \
             WHERE logical_path = ? OR substr(logical_path, 1, ?) = ? \
             ORDER BY length(logical_path) ASC, logical_path ASC",
        )
        .bind(root)
        .bind(prefix_len(&prefix))
        .bind(&prefix)
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(nodes)
    }

    async fn insert(&self, node: &Node) -> Result<()> {
        sqlx::query(
            "INSERT INTO file_nodes \
             (id, logical_path, parent_path, physical_path, file_name, is_directory, size, \
              created_at, modified_at, restore_path, mime_type) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(node.id)
        .bind(&node.logical_path)
        .bind(&node.parent_path)
        .bind(&node.physical_path)
        .bind(&node.file_name)
        .bind(node.is_directory)
        .bind(node.size as i64)
        .bind(node.created_at.timestamp_millis())
        .bind(node.modified_at.timestamp_millis())
        .bind(&node.restore_path)
        .bind(&node.mime_type)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn insert_directories(&self, nodes: &[Node]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for node in nodes {
            sqlx::query(
                "INSERT INTO file_nodes \
                 (id, logical_path, parent_path, physical_path, file_name, is_directory, size, \
                  created_at, modified_at) \
                 VALUES (?, ?, ?, ?, ?, 1, 0, ?, ?) \
                 ON CONFLICT(logical_path) DO NOTHING",
            )
            .bind(node.id)
            .bind(&node.logical_path)
            .bind(&node.parent_path)
            .bind(&node.physical_path)
            .bind(&node.file_name)
            .bind(node.created_at.timestamp_millis())
            .bind(node.modified_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_batch(&self, nodes: &[Node]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for node in nodes {
            sqlx::query(
                "UPDATE file_nodes \
                 SET logical_path = ?, parent_path = ?, file_name = ?, modified_at = ?, restore_path = ? \
                 WHERE id = ?",
            )
            .bind(&node.logical_path)
            .bind(&node.parent_path)
            .bind(&node.file_name)
            .bind(node.modified_at.timestamp_millis())
            .bind(&node.restore_path)
            .bind(node.id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for id in ids {
            deleted += sqlx::query("DELETE FROM file_nodes WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn find_trash_roots_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Node>> {
        let candidates = sqlx::query_as::<_, Node>(
            "SELECT * FROM file_nodes WHERE parent_path LIKE '%/trash' AND modified_at < ?",
        )
        .bind(cutoff.timestamp_millis())
        .fetch_all(self.pool.as_ref())
        .await?;
        // `LIKE` also matches deeper folders that happen to be called trash
        Ok(candidates
            .into_iter()
            .filter(|node| logical_path::is_trash_dir(&node.parent_path))
            .collect())
    }

    async fn find_active_files(&self) -> Result<Vec<Node>> {
        let files = sqlx::query_as::<_, Node>("SELECT * FROM file_nodes WHERE is_directory = 0")
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(files
            .into_iter()
            .filter(|node| !logical_path::is_in_trash(&node.logical_path))
            .collect())
    }

    async fn find_recent_files(
        &self,
        username: &str,
        limit: u32,
        multimedia_only: bool,
    ) -> Result<Vec<Node>> {
        let user_prefix = format!("{username}/");
        let trash_prefix = format!("{}/", logical_path::trash_dir(username));
        let mut sql = String::from(
            "SELECT * FROM file_nodes \
             WHERE is_directory = 0 \
             AND substr(logical_path, 1, ?) = ? \
             AND substr(logical_path, 1, ?) <> ?",
        );
        if multimedia_only {
            sql.push_str(" AND (mime_type LIKE 'image/%' OR mime_type LIKE 'video/%')");
        }
        sql.push_str(" ORDER BY modified_at DESC LIMIT ?");

        let files = sqlx::query_as::<_, Node>(&sql)
            .bind(prefix_len(&user_prefix))
            .bind(&user_prefix)
            .bind(prefix_len(&trash_prefix))
            .bind(&trash_prefix)
            .bind(i64::from(limit))
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(files)
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_nodes")
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count as u64)
    }
}
