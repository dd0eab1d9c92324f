use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::storage::metrics::UsageProbe;

/// Reports the bytes still available to unprivileged writers on a volume.
#[async_trait::async_trait]
pub trait SpaceProbe: Send + Sync {
    async fn free_space(&self, volume: &Path) -> Result<u64>;
}

/// Free space as reported by `statvfs(2)`.
#[derive(Debug, Default, Clone)]
pub struct StatvfsProbe;

#[async_trait::async_trait]
impl SpaceProbe for StatvfsProbe {
    async fn free_space(&self, volume: &Path) -> Result<u64> {
        let volume = volume.to_path_buf();
        let free = tokio::task::spawn_blocking(move || {
            nix::sys::statvfs::statvfs(&volume)
                .map(|stat| {
                    (stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64)
                })
                .map_err(std::io::Error::from)
        })
        .await??;
        Ok(free)
    }
}

/// Picks the volume a new upload is written to.
pub struct PlacementPolicy {
    volumes: Vec<PathBuf>,
    quota_bytes: Option<u64>,
    space: Arc<dyn SpaceProbe>,
    usage: Arc<dyn UsageProbe>,
}

impl PlacementPolicy {
    pub fn new(
        volumes: Vec<PathBuf>,
        quota_bytes: Option<u64>,
        space: Arc<dyn SpaceProbe>,
        usage: Arc<dyn UsageProbe>,
    ) -> Self {
        PlacementPolicy {
            volumes,
            quota_bytes,
            space,
            usage,
        }
    }

    /// Returns the volume with the most free space that can hold `required`
    /// bytes. The quota, when set, is checked against the combined usage of
    /// every volume first. Ties go to the volume listed first.
    pub async fn select(&self, required: u64) -> Result<PathBuf> {
        if self.volumes.is_empty() {
            return Err(AppError::NoVolumes);
        }

        if let Some(quota) = self.quota_bytes {
            let used = self.usage.total_size(&self.volumes).await?;
            if used.saturating_add(required) > quota {
                warn!("Quota check failed: {used} bytes used, {required} requested, {quota} allowed");
                return Err(AppError::QuotaExceeded {
                    quota_gb: quota / (1024 * 1024 * 1024),
                });
            }
        }

        let mut best: Option<(&PathBuf, u64)> = None;
        for volume in &self.volumes {
            if !tokio::fs::try_exists(volume).await? {
                info!("Creating missing volume root {}", volume.display());
                tokio::fs::create_dir_all(volume).await?;
            }
            let free = self.space.free_space(volume).await?;
            debug!("Volume {} has {free} bytes free", volume.display());
            if best.is_none_or(|(_, best_free)| free > best_free) {
                best = Some((volume, free));
            }
        }

        match best {
            Some((volume, free)) if free >= required => Ok(volume.clone()),
            _ => Err(AppError::InsufficientSpace { required }),
        }
    }
}
