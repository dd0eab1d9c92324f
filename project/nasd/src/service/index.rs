use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::node::{Node, NodeRepository};
use crate::error::Result;
use crate::service::backup::IndexBackup;

/// The persistent index as seen by the services. Reads go straight to the
/// repository; every write also requests a mirror pass.
pub struct IndexService {
    nodes: Arc<dyn NodeRepository>,
    backup: Arc<IndexBackup>,
}

impl IndexService {
    pub fn new(nodes: Arc<dyn NodeRepository>, backup: Arc<IndexBackup>) -> Self {
        IndexService { nodes, backup }
    }

    pub async fn find_by_path(&self, logical_path: &str) -> Result<Option<Node>> {
        self.nodes.find_by_path(logical_path).await
    }

    pub async fn exists(&self, logical_path: &str) -> Result<bool> {
        self.nodes.exists(logical_path).await
    }

    pub async fn find_children(&self, parent_path: &str) -> Result<Vec<Node>> {
        self.nodes.find_children(parent_path).await
    }

    pub async fn find_subtree(&self, root: &str) -> Result<Vec<Node>> {
        self.nodes.find_subtree(root).await
    }

    pub async fn find_trash_roots_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Node>> {
        self.nodes.find_trash_roots_before(cutoff).await
    }

    pub async fn find_active_files(&self) -> Result<Vec<Node>> {
        self.nodes.find_active_files().await
    }

    pub async fn find_recent_files(
        &self,
        username: &str,
        limit: u32,
        multimedia_only: bool,
    ) -> Result<Vec<Node>> {
        self.nodes
            .find_recent_files(username, limit, multimedia_only)
            .await
    }

    pub async fn count(&self) -> Result<u64> {
        self.nodes.count().await
    }

    pub async fn insert(&self, node: &Node) -> Result<()> {
        self.nodes.insert(node).await?;
        self.backup.request();
        Ok(())
    }

    pub async fn insert_directories(&self, nodes: &[Node]) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        self.nodes.insert_directories(nodes).await?;
        self.backup.request();
        Ok(())
    }

    pub async fn update_batch(&self, nodes: &[Node]) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        self.nodes.update_batch(nodes).await?;
        self.backup.request();
        Ok(())
    }

    pub async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = self.nodes.delete_batch(ids).await?;
        self.backup.request();
        Ok(deleted)
    }
}
