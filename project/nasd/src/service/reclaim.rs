use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::config::TrashCanConfig;
use crate::domain::session::SessionRepository;
use crate::error::Result;
use crate::service::file::FileService;
use crate::service::index::IndexService;
use crate::storage::Storage;

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: u64,
    pub failed: Vec<String>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Periodic cleanup of the index and the trash. Every sweep is idempotent and
/// isolates per-item failures.
pub struct Reclaimer {
    index: Arc<IndexService>,
    files: Arc<FileService>,
    storage: Arc<dyn Storage>,
    sessions: Arc<dyn SessionRepository>,
    trash_can: TrashCanConfig,
}

impl Reclaimer {
    pub fn new(
        index: Arc<IndexService>,
        files: Arc<FileService>,
        storage: Arc<dyn Storage>,
        sessions: Arc<dyn SessionRepository>,
        trash_can: TrashCanConfig,
    ) -> Self {
        Reclaimer {
            index,
            files,
            storage,
            sessions,
            trash_can,
        }
    }

    /// Purges trash entries whose retention window ended before `now`.
    pub async fn expire_trash(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        if !self.trash_can.enabled {
            return Ok(report);
        }

        let cutoff = now - Duration::days(i64::from(self.trash_can.retention_days));
        let expired = self.index.find_trash_roots_before(cutoff).await?;
        for root in expired {
            match self.files.purge(&root.logical_path).await {
                Ok(stats) => {
                    info!(
                        "Expired {} from the trash ({} node(s))",
                        root.logical_path, stats.nodes
                    );
                    report.removed += stats.nodes;
                }
                Err(err) => {
                    error!("Failed to expire {}: {err}", root.logical_path);
                    report.failed.push(format!("{}: {err}", root.logical_path));
                }
            }
        }
        Ok(report)
    }

    /// Drops file nodes outside the trash whose bytes are gone.
    pub async fn repair_orphans(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for node in self.index.find_active_files().await? {
            let Some(physical) = node.physical() else {
                continue;
            };
            let present = match self.storage.exists(&physical).await {
                Ok(present) => present,
                Err(err) => {
                    report.failed.push(format!("{}: {err}", node.logical_path));
                    continue;
                }
            };
            if present {
                continue;
            }

            warn!(
                "Orphaned index entry {} ({} is gone)",
                node.logical_path,
                physical.display()
            );
            match self.index.delete_batch(&[node.id]).await {
                Ok(deleted) => report.removed += deleted,
                Err(err) => report.failed.push(format!("{}: {err}", node.logical_path)),
            }
        }
        Ok(report)
    }

    pub async fn expire_sessions(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let removed = self.sessions.delete_expired(now).await?;
        if removed > 0 {
            info!("Removed {removed} expired session(s)");
        }
        Ok(SweepReport {
            removed,
            failed: Vec::new(),
        })
    }
}
