use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::storage::metrics::UsageProbe;
use crate::storage::paths::PathManager;
use crate::utils::notify::Notifier;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PairStats {
    pub copied: u64,
    pub unchanged: u64,
    pub deleted: u64,
}

#[derive(Debug, Default)]
pub struct MirrorReport {
    pub stats: PairStats,
    pub failed: Vec<(PathBuf, String)>,
}

/// Keeps `backup.paths[i]` an exact copy of `storage.paths[i]`.
pub struct VolumeMirror {
    enabled: bool,
    sources: Vec<PathBuf>,
    destinations: Vec<PathBuf>,
    quota_bytes: Option<u64>,
    paths: PathManager,
    usage: Arc<dyn UsageProbe>,
    notifier: Arc<dyn Notifier>,
}

impl VolumeMirror {
    pub fn new(
        config: &Config,
        paths: PathManager,
        usage: Arc<dyn UsageProbe>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        VolumeMirror {
            enabled: config.backup.enabled,
            sources: config.storage.paths.clone(),
            destinations: config.backup.paths.clone(),
            quota_bytes: config.backup.quota_bytes(),
            paths,
            usage,
            notifier,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn run(&self) -> Result<MirrorReport> {
        let mut report = MirrorReport::default();
        if !self.enabled {
            debug!("Volume mirror disabled");
            return Ok(report);
        }

        if self.sources.len() != self.destinations.len() {
            let message = format!(
                "{} storage volume(s) but {} backup destination(s)",
                self.sources.len(),
                self.destinations.len()
            );
            error!("Volume mirror aborted: {message}");
            self.notifier.system_error("Backup failed", &message);
            return Err(AppError::Config(message));
        }

        if let Some(quota) = self.quota_bytes {
            let used = self.usage.total_size(&self.sources).await?;
            if used > quota {
                let quota_gb = quota / (1024 * 1024 * 1024);
                let message =
                    format!("{used} bytes to back up exceed the backup quota of {quota_gb} GB");
                error!("Volume mirror aborted: {message}");
                self.notifier.system_error("Backup failed", &message);
                return Err(AppError::QuotaExceeded { quota_gb });
            }
        }

        for (source, destination) in self.sources.iter().zip(&self.destinations) {
            let src = source.clone();
            let dst = destination.clone();
            let skip = self.paths.index_backup_staging_path(source);
            let result =
                tokio::task::spawn_blocking(move || mirror_pair(&src, &dst, &skip)).await;

            match result {
                Ok(Ok(stats)) => {
                    info!(
                        "Mirrored {} to {}: {} copied, {} unchanged, {} deleted",
                        source.display(),
                        destination.display(),
                        stats.copied,
                        stats.unchanged,
                        stats.deleted
                    );
                    report.stats.copied += stats.copied;
                    report.stats.unchanged += stats.unchanged;
                    report.stats.deleted += stats.deleted;
                }
                Ok(Err(err)) => {
                    error!("Mirroring {} failed: {err}", source.display());
                    report.failed.push((source.clone(), err.to_string()));
                }
                Err(err) => {
                    error!("Mirroring {} panicked: {err}", source.display());
                    report.failed.push((source.clone(), err.to_string()));
                }
            }
        }

        if report.failed.is_empty() {
            self.notifier.system_success("Backup completed successfully");
        } else {
            let details = report
                .failed
                .iter()
                .map(|(volume, err)| format!("{}: {err}", volume.display()))
                .collect::<Vec<_>>()
                .join("\n");
            self.notifier.system_error("Backup failed", &details);
        }
        Ok(report)
    }
}

fn mirror_pair(source: &Path, destination: &Path, skip: &Path) -> io::Result<PairStats> {
    if !source.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source volume {} is missing", source.display()),
        ));
    }
    fs::create_dir_all(destination)?;
    let mut stats = PairStats::default();

    for entry in WalkDir::new(source).follow_links(false).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry: {err}");
                continue;
            }
        };
        if entry.path() == skip {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if copy_if_changed(entry.path(), &target)? {
                stats.copied += 1;
            } else {
                stats.unchanged += 1;
            }
        }
    }

    // children come before their parents, so directories are empty by then
    for entry in WalkDir::new(destination).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry: {err}");
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(destination) else {
            continue;
        };
        if fs::symlink_metadata(source.join(relative)).is_ok() {
            continue;
        }
        let removed = if entry.file_type().is_dir() {
            fs::remove_dir_all(entry.path())
        } else {
            fs::remove_file(entry.path())
        };
        match removed {
            Ok(()) => stats.deleted += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }

    Ok(stats)
}

/// Copies `source` over `target` unless both already agree on size and
/// modification time.
fn copy_if_changed(source: &Path, target: &Path) -> io::Result<bool> {
    let source_meta = fs::metadata(source)?;
    let source_mtime = source_meta.modified()?;

    if let Ok(target_meta) = fs::metadata(target) {
        if target_meta.len() == source_meta.len() && target_meta.modified()? == source_mtime {
            return Ok(false);
        }
    }

    fs::copy(source, target)?;
    fs::File::options()
        .write(true)
        .open(target)?
        .set_modified(source_mtime)?;
    Ok(true)
}
