use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::node::Node;
use crate::error::{AppError, Result};
use crate::service::archive::DirectoryArchive;
use crate::service::index::IndexService;
use crate::storage::Storage;
use crate::storage::placement::PlacementPolicy;
use crate::utils::logical_path::{self, ROOT};
use crate::utils::validation::{validate_file_name, validate_logical_path};

const TRANSFER_TARGET: &str = "nasd::transfer";

#[derive(Debug, Clone, Serialize)]
pub struct OperationOutcome {
    pub message: String,
    pub node: Option<Node>,
}

impl OperationOutcome {
    fn new(message: impl Into<String>, node: Option<Node>) -> Self {
        OperationOutcome {
            message: message.into(),
            node,
        }
    }
}

/// Result of a download request.
pub enum Download {
    File { node: Node, file: File },
    Directory(DirectoryArchive),
}

/// What a relocation leaves in the root's `restore_path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestoreMark {
    PreviousParent,
    Clear,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeStats {
    pub nodes: u64,
    pub files_removed: u64,
    pub files_missing: u64,
}

/// Every operation on the logical namespace. Paths are username-prefixed
/// and already authorized by the caller.
pub struct FileService {
    index: Arc<IndexService>,
    storage: Arc<dyn Storage>,
    placement: Arc<PlacementPolicy>,
    config: Arc<Config>,
}

fn transfer_log(user: &str, action: &str, resource: &str) {
    info!(target: TRANSFER_TARGET, user, action, resource, "{action} {resource}");
}

impl FileService {
    pub fn new(
        index: Arc<IndexService>,
        storage: Arc<dyn Storage>,
        placement: Arc<PlacementPolicy>,
        config: Arc<Config>,
    ) -> Self {
        FileService {
            index,
            storage,
            placement,
            config,
        }
    }

    pub async fn upload(
        &self,
        parent_path: &str,
        file_name: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
        mime_type: Option<String>,
    ) -> Result<OperationOutcome> {
        validate_file_name(file_name)?;
        let parent = logical_path::normalize_dir(parent_path);
        if parent == ROOT {
            return Err(AppError::InvalidPath(
                "uploads must target a user directory".to_string(),
            ));
        }
        validate_logical_path(&parent)?;

        let limit = self.config.server.max_upload_bytes();
        if let Some(limit) = limit {
            if size > limit {
                return Err(AppError::SizeExceeded { size, limit });
            }
        }

        self.create_virtual_path(&parent).await?;
        let final_name = self.unique_name(&parent, file_name).await?;
        let volume = self.placement.select(size).await?;
        let username = logical_path::username(&parent);

        let (physical_path, written) = match limit {
            Some(limit) => {
                // one byte past the ceiling is enough to tell the size lied
                let mut limited = reader.take(limit.saturating_add(1));
                self.storage
                    .write_stream(&volume, username, file_name, &mut limited)
                    .await?
            }
            None => {
                self.storage
                    .write_stream(&volume, username, file_name, reader)
                    .await?
            }
        };

        if let Some(limit) = limit {
            if written > limit {
                self.storage.remove(&physical_path).await?;
                return Err(AppError::SizeExceeded {
                    size: written,
                    limit,
                });
            }
        }

        let node = Node::new_file(
            logical_path::join(&parent, &final_name),
            &physical_path,
            written,
            mime_type,
        );
        if let Err(err) = self.index.insert(&node).await {
            if let Err(cleanup_err) = self.storage.remove(&physical_path).await {
                warn!(
                    "Failed to remove {} after index error: {cleanup_err}",
                    physical_path.display()
                );
            }
            return Err(err);
        }

        transfer_log(username, "UPLOAD", &node.logical_path);
        let message = if final_name == file_name {
            "File uploaded successfully".to_string()
        } else {
            format!("File uploaded as {final_name} because {file_name} already exists")
        };
        Ok(OperationOutcome::new(message, Some(node)))
    }

    /// Opens a file, or prepares a tar stream for a directory. A file whose
    /// bytes vanished is dropped from the index.
    pub async fn download(&self, path: &str) -> Result<Download> {
        validate_logical_path(path)?;
        let node = self.require(path).await?;

        if node.is_directory {
            let subtree = self.index.find_subtree(&node.logical_path).await?;
            transfer_log(node.username(), "DOWNLOAD", &node.logical_path);
            return Ok(Download::Directory(DirectoryArchive::from_subtree(
                &node.logical_path,
                &subtree,
            )));
        }

        let physical = node
            .physical()
            .ok_or_else(|| AppError::Inconsistent(node.logical_path.clone()))?;
        if !self.storage.exists(&physical).await? {
            warn!(
                "{} points at missing file {}, removing it from the index",
                node.logical_path,
                physical.display()
            );
            self.index.delete_batch(&[node.id]).await?;
            return Err(AppError::Inconsistent(node.logical_path));
        }

        let file = self.storage.open(&physical).await?;
        transfer_log(node.username(), "DOWNLOAD", &node.logical_path);
        Ok(Download::File { node, file })
    }

    /// Moves a node into `<user>/trash`, or purges it when the trash is
    /// disabled or the node is already trashed.
    pub async fn delete(&self, path: &str) -> Result<OperationOutcome> {
        validate_logical_path(path)?;
        if !path.contains('/') {
            return Err(AppError::InvalidPath(format!(
                "`{path}`: a user root cannot be deleted"
            )));
        }
        let node = self.require(path).await?;
        let username = node.username().to_string();

        let permanent = !self.config.trash_can.enabled
            || logical_path::is_in_trash(path)
            || logical_path::is_trash_dir(path);
        if permanent {
            let stats = self.purge(path).await?;
            transfer_log(&username, "DELETE_PERMANENT", path);
            return Ok(OperationOutcome::new(
                format!("Permanently deleted {} item(s)", stats.nodes),
                None,
            ));
        }

        let trash = logical_path::trash_dir(&username);
        self.create_virtual_path(&trash).await?;
        let suffix = Uuid::new_v4().simple().to_string();
        let target = logical_path::join(
            &trash,
            &logical_path::trash_name(&node.file_name, &suffix[..8]),
        );
        let trashed = self
            .relocate(node, &target, RestoreMark::PreviousParent)
            .await?;

        transfer_log(&username, "TRASH", path);
        Ok(OperationOutcome::new("Moved to trash", Some(trashed)))
    }

    /// Puts a trashed (or moved) node back under the parent it came from.
    pub async fn restore(&self, trashed_path: &str) -> Result<OperationOutcome> {
        validate_logical_path(trashed_path)?;
        let node = self.require(trashed_path).await?;
        let Some(restore_path) = node.restore_path.clone() else {
            return Err(AppError::NotRestorable(trashed_path.to_string()));
        };

        let original_name = if logical_path::is_trash_dir(&node.parent_path) {
            logical_path::original_name_from_trash(&node.file_name).to_string()
        } else {
            node.file_name.clone()
        };
        let target = logical_path::join(&restore_path, &original_name);
        let username = node.username().to_string();
        let restored = self.relocate(node, &target, RestoreMark::Clear).await?;

        transfer_log(&username, "RESTORE", &restored.logical_path);
        let message = if restored.file_name == original_name {
            format!("Restored to {}", restored.logical_path)
        } else {
            format!(
                "Restored as {} because {original_name} already exists",
                restored.logical_path
            )
        };
        Ok(OperationOutcome::new(message, Some(restored)))
    }

    /// Renames or moves a node and its whole subtree. Bytes on disk are
    /// never touched.
    pub async fn move_node(&self, old_path: &str, new_path: &str) -> Result<OperationOutcome> {
        validate_logical_path(old_path)?;
        let new_path = new_path.trim_end_matches('/');
        validate_file_name(logical_path::file_name(new_path))?;
        validate_logical_path(new_path)?;

        if old_path == new_path {
            return Err(AppError::InvalidPath(format!(
                "`{old_path}`: source and destination are the same"
            )));
        }
        if logical_path::is_descendant_of(new_path, old_path) {
            return Err(AppError::InvalidPath(format!(
                "`{new_path}`: a folder cannot be moved into itself"
            )));
        }

        let node = self.require(old_path).await?;
        let username = node.username().to_string();
        let requested_name = logical_path::file_name(new_path).to_string();
        let moved = self
            .relocate(node, new_path, RestoreMark::PreviousParent)
            .await?;

        transfer_log(&username, "MOVE", &format!("{old_path} -> {}", moved.logical_path));
        let message = if moved.file_name == requested_name {
            format!("Moved to {}", moved.logical_path)
        } else {
            format!(
                "Moved to {} because {requested_name} already exists",
                moved.logical_path
            )
        };
        Ok(OperationOutcome::new(message, Some(moved)))
    }

    /// Creates `path` and every missing ancestor as directories. Succeeds
    /// without changes when the directory already exists.
    pub async fn create_virtual_path(&self, path: &str) -> Result<OperationOutcome> {
        let path = logical_path::normalize_dir(path.trim());
        if path == ROOT {
            return Err(AppError::InvalidPath(
                "folder path cannot be empty".to_string(),
            ));
        }
        validate_logical_path(&path)?;

        let mut missing = Vec::new();
        let mut current = String::new();
        for segment in path.split('/') {
            current = logical_path::join(&current, segment);
            // below a missing directory nothing can exist
            if missing.is_empty() {
                match self.index.find_by_path(&current).await? {
                    Some(existing) if !existing.is_directory => {
                        return Err(AppError::InvalidPath(format!(
                            "`{current}` is a file, not a folder"
                        )));
                    }
                    Some(_) => continue,
                    None => {}
                }
            }
            missing.push(Node::new_directory(current.clone()));
        }

        if missing.is_empty() {
            let node = self.index.find_by_path(&path).await?;
            return Ok(OperationOutcome::new("Folder already exists", node));
        }

        debug!("Creating {} folder(s) for {path}", missing.len());
        self.index.insert_directories(&missing).await?;
        transfer_log(logical_path::username(&path), "CREATE_FOLDER", &path);
        let node = self.index.find_by_path(&path).await?;
        Ok(OperationOutcome::new("Folder created", node))
    }

    /// Children of a directory, directories first then by name. Empty and
    /// `/` list the user roots.
    pub async fn list_children(&self, dir_path: &str) -> Result<Vec<Node>> {
        let dir = logical_path::normalize_dir(dir_path.trim());
        if dir != ROOT {
            validate_logical_path(&dir)?;
        }
        self.index.find_children(&dir).await
    }

    pub async fn recent_files(
        &self,
        username: &str,
        limit: u32,
        multimedia_only: bool,
    ) -> Result<Vec<Node>> {
        validate_file_name(username)?;
        self.index
            .find_recent_files(username, limit, multimedia_only)
            .await
    }

    /// Removes a subtree from disk and index. Missing files are logged and
    /// skipped.
    pub async fn purge(&self, root: &str) -> Result<PurgeStats> {
        let subtree = self.index.find_subtree(root).await?;
        let mut stats = PurgeStats::default();

        for node in &subtree {
            let Some(physical) = node.physical() else {
                continue;
            };
            match self.storage.remove(&physical).await {
                Ok(true) => stats.files_removed += 1,
                Ok(false) => {
                    warn!(
                        "{} was already missing from disk ({})",
                        node.logical_path,
                        physical.display()
                    );
                    stats.files_missing += 1;
                }
                Err(err) => {
                    warn!("Failed to remove {}: {err}", physical.display());
                    stats.files_missing += 1;
                }
            }
        }

        let ids: Vec<Uuid> = subtree.iter().map(|node| node.id).collect();
        stats.nodes = self.index.delete_batch(&ids).await?;
        Ok(stats)
    }

    async fn require(&self, path: &str) -> Result<Node> {
        self.index
            .find_by_path(path)
            .await?
            .ok_or_else(|| AppError::NotFound(path.to_string()))
    }

    /// First free name among `name`, `name(1)`, `name(2)`, ... in `parent`.
    async fn unique_name(&self, parent: &str, name: &str) -> Result<String> {
        if !self.index.exists(&logical_path::join(parent, name)).await? {
            return Ok(name.to_string());
        }
        let mut n = 1;
        loop {
            let candidate = logical_path::numbered_name(name, n);
            if !self
                .index
                .exists(&logical_path::join(parent, &candidate))
                .await?
            {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Rewrites the logical paths of `node` and its subtree so that it lives
    /// at `target`, creating the destination parent and renaming the root on
    /// conflict. Persisted as one batch.
    async fn relocate(&self, node: Node, target: &str, mark: RestoreMark) -> Result<Node> {
        let parent = logical_path::parent_of(target);
        if parent != ROOT {
            self.create_virtual_path(&parent).await?;
        }
        let name = self
            .unique_name(&parent, logical_path::file_name(target))
            .await?;
        let target = logical_path::join(&parent, &name);

        let old_root = node.logical_path.clone();
        let previous_parent = node.parent_path.clone();
        let now = Utc::now();

        let mut moved = self.index.find_subtree(&old_root).await?;
        for entry in &mut moved {
            if entry.id == node.id {
                entry.logical_path = target.clone();
                entry.parent_path = parent.clone();
                entry.file_name = name.clone();
                entry.restore_path = match mark {
                    RestoreMark::PreviousParent => Some(previous_parent.clone()),
                    RestoreMark::Clear => None,
                };
            } else {
                entry.logical_path = logical_path::rebase(&entry.logical_path, &old_root, &target);
                entry.parent_path = logical_path::rebase(&entry.parent_path, &old_root, &target);
            }
            entry.modified_at = now;
        }

        self.index.update_batch(&moved).await?;
        debug!("Relocated {} node(s) from {old_root} to {target}", moved.len());

        moved
            .into_iter()
            .find(|entry| entry.id == node.id)
            .ok_or(AppError::NotFound(old_root))
    }
}
