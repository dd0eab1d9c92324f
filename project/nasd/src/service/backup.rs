use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Connection, SqlitePool};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::storage::paths::PathManager;
use crate::utils::notify::Notifier;

/// Where the index came from when the process started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOrigin {
    /// A non-empty `nas.db` was already present.
    Existing,
    /// `nas.db` was copied back from the given volume mirror.
    Restored(PathBuf),
    /// Neither the index nor any mirror existed.
    Empty,
}

/// Makes sure `<data_dir>/nas.db` holds the best index available before the
/// pool opens it. An unreadable index is moved aside and replaced by the
/// first mirror that passes an integrity check.
pub async fn prepare_index(
    paths: &PathManager,
    volumes: &[PathBuf],
    notifier: &dyn Notifier,
) -> Result<IndexOrigin> {
    tokio::fs::create_dir_all(paths.data_dir()).await?;
    let index_path = paths.index_path();

    match tokio::fs::metadata(&index_path).await {
        Ok(metadata) if metadata.len() > 0 => {
            if is_usable_index(&index_path).await {
                return Ok(IndexOrigin::Existing);
            }
            let quarantine = paths.index_quarantine_path();
            error!(
                "Index {} is corrupted, moving it to {}",
                index_path.display(),
                quarantine.display()
            );
            tokio::fs::rename(&index_path, &quarantine).await?;
        }
        Ok(_) => warn!("Index {} is empty, looking for a mirror", index_path.display()),
        Err(_) => warn!("Index {} is missing, looking for a mirror", index_path.display()),
    }

    for volume in volumes {
        let mirror = paths.index_backup_path(volume);
        if !tokio::fs::try_exists(&mirror).await.unwrap_or(false) {
            debug!("No index mirror on {}", volume.display());
            continue;
        }
        let copied = tokio::fs::copy(&mirror, &index_path).await;
        let usable = copied.is_ok() && is_usable_index(&index_path).await;
        match copied {
            Ok(bytes) if usable => {
                info!("Restored index from {} ({bytes} bytes)", mirror.display());
                notifier.system_success(&format!(
                    "The file index was missing or corrupted and has been restored from {}",
                    mirror.display()
                ));
                return Ok(IndexOrigin::Restored(mirror));
            }
            Ok(_) => warn!("Index mirror {} is corrupted, skipping it", mirror.display()),
            Err(err) => warn!("Cannot restore index from {}: {err}", mirror.display()),
        }
        // a bad copy must not pass for a valid index
        let _ = tokio::fs::remove_file(&index_path).await;
    }

    error!("No usable index and no usable index mirror found, starting with an empty namespace");
    notifier.system_error(
        "File index lost",
        "The file index and all of its mirrors are missing or corrupted. The system started with an empty index; files on disk are no longer listed.",
    );
    Ok(IndexOrigin::Empty)
}

/// Opens `path` read-only and runs `PRAGMA quick_check`.
async fn is_usable_index(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.len() > 0 => {}
        _ => return false,
    }

    let options = SqliteConnectOptions::new().filename(path).read_only(true);
    let mut conn = match SqliteConnection::connect_with(&options).await {
        Ok(conn) => conn,
        Err(err) => {
            warn!("Cannot open index {}: {err}", path.display());
            return false;
        }
    };
    let check = sqlx::query_scalar::<_, String>("PRAGMA quick_check")
        .fetch_one(&mut conn)
        .await;
    let _ = conn.close().await;

    match check {
        Ok(result) if result == "ok" => true,
        Ok(result) => {
            warn!("Integrity check of {} failed: {result}", path.display());
            false
        }
        Err(err) => {
            warn!("Integrity check of {} failed: {err}", path.display());
            false
        }
    }
}

/// Opens (creating if needed) the index database and applies migrations.
pub async fn open_pool(paths: &PathManager) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(paths.index_path())
        .create_if_missing(true)
        // recovery copies nas.db on its own, without a -wal file
        .journal_mode(SqliteJournalMode::Delete)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(12)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

#[derive(Debug, Default)]
pub struct BackupReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl BackupReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Mirrors the index onto every volume.
///
/// Mutations call [`IndexBackup::request`]; the worker started by
/// [`IndexBackup::spawn_worker`] folds every request that arrives while it
/// waits or writes into a single follow-up pass.
pub struct IndexBackup {
    pool: Arc<SqlitePool>,
    paths: PathManager,
    volumes: Vec<PathBuf>,
    delay: Duration,
    pending: Notify,
    running: Mutex<()>,
    notifier: Arc<dyn Notifier>,
}

impl IndexBackup {
    pub fn new(
        pool: Arc<SqlitePool>,
        paths: PathManager,
        volumes: Vec<PathBuf>,
        delay: Duration,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        IndexBackup {
            pool,
            paths,
            volumes,
            delay,
            pending: Notify::new(),
            running: Mutex::new(()),
            notifier,
        }
    }

    pub fn request(&self) {
        self.pending.notify_one();
    }

    pub fn spawn_worker(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let backup = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = backup.pending.notified() => {}
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backup.delay) => {}
                }
                backup.backup_all().await;
            }
            debug!("Index backup worker stopped");
        })
    }

    /// Writes a consistent snapshot to `<volume>/.nas.db.backup` on every
    /// volume. Failures are reported, never propagated.
    pub async fn backup_all(&self) -> BackupReport {
        let _guard = self.running.lock().await;
        let mut report = BackupReport::default();

        for volume in &self.volumes {
            match self.backup_to(volume).await {
                Ok(target) => {
                    debug!("Index mirrored to {}", target.display());
                    report.written.push(target);
                }
                Err(err) => {
                    error!("Index backup to {} failed: {err}", volume.display());
                    report.failed.push((volume.clone(), err.to_string()));
                }
            }
        }

        if !report.is_success() {
            let details = report
                .failed
                .iter()
                .map(|(volume, err)| format!("{}: {err}", volume.display()))
                .collect::<Vec<_>>()
                .join("\n");
            self.notifier.system_error("Index backup failed", &details);
        }
        report
    }

    async fn backup_to(&self, volume: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(volume).await?;
        let staging = self.paths.index_backup_staging_path(volume);
        let target = self.paths.index_backup_path(volume);

        // VACUUM INTO refuses to overwrite
        match tokio::fs::remove_file(&staging).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => return Err(err.into()),
            _ => {}
        }

        sqlx::query("VACUUM INTO ?")
            .bind(staging.to_string_lossy().into_owned())
            .execute(self.pool.as_ref())
            .await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::notify::LogNotifier;
    use tempfile::tempdir;

    /// Writes a migrated, empty index under `dir` and returns its path.
    async fn valid_index(dir: &Path) -> PathBuf {
        let paths = PathManager::new(dir);
        open_pool(&paths).await.unwrap().close().await;
        paths.index_path()
    }

    #[tokio::test]
    async fn test_existing_index_is_kept() {
        let data = tempdir().unwrap();
        let paths = PathManager::new(data.path());
        valid_index(data.path()).await;

        let origin = prepare_index(&paths, &[], &LogNotifier).await.unwrap();
        assert_eq!(origin, IndexOrigin::Existing);
    }

    #[tokio::test]
    async fn test_empty_index_falls_back_to_mirror() {
        let data = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        let paths = PathManager::new(data.path());
        std::fs::write(paths.index_path(), b"").unwrap();
        let good = valid_index(scratch.path()).await;
        std::fs::copy(&good, paths.index_backup_path(second.path())).unwrap();

        let volumes = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let origin = prepare_index(&paths, &volumes, &LogNotifier).await.unwrap();

        assert_eq!(
            origin,
            IndexOrigin::Restored(paths.index_backup_path(second.path()))
        );
        assert_eq!(
            std::fs::read(paths.index_path()).unwrap(),
            std::fs::read(&good).unwrap()
        );
    }

    #[tokio::test]
    async fn test_corrupt_index_and_mirror_are_skipped() {
        let data = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        let paths = PathManager::new(data.path());
        std::fs::write(paths.index_path(), b"garbage, not sqlite at all").unwrap();
        std::fs::write(paths.index_backup_path(first.path()), b"also garbage").unwrap();
        let good = valid_index(scratch.path()).await;
        std::fs::copy(&good, paths.index_backup_path(second.path())).unwrap();

        let volumes = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let origin = prepare_index(&paths, &volumes, &LogNotifier).await.unwrap();

        assert_eq!(
            origin,
            IndexOrigin::Restored(paths.index_backup_path(second.path()))
        );
        assert_eq!(
            std::fs::read(paths.index_quarantine_path()).unwrap(),
            b"garbage, not sqlite at all"
        );
        assert!(is_usable_index(&paths.index_path()).await);
    }

    #[tokio::test]
    async fn test_corrupt_index_without_mirror_starts_empty() {
        let data = tempdir().unwrap();
        let volume = tempdir().unwrap();
        let paths = PathManager::new(data.path());
        std::fs::write(paths.index_path(), b"garbage").unwrap();
        std::fs::write(paths.index_backup_path(volume.path()), b"garbage").unwrap();

        let volumes = vec![volume.path().to_path_buf()];
        let origin = prepare_index(&paths, &volumes, &LogNotifier).await.unwrap();

        assert_eq!(origin, IndexOrigin::Empty);
        assert!(!paths.index_path().exists());
        assert!(paths.index_quarantine_path().is_file());
    }

    #[tokio::test]
    async fn test_backup_all_writes_every_volume() {
        let data = tempdir().unwrap();
        let volumes = [tempdir().unwrap(), tempdir().unwrap()];
        let paths = PathManager::new(data.path());
        let pool = Arc::new(open_pool(&paths).await.unwrap());

        let backup = IndexBackup::new(
            pool,
            paths.clone(),
            volumes.iter().map(|v| v.path().to_path_buf()).collect(),
            Duration::from_millis(0),
            Arc::new(LogNotifier),
        );
        let report = backup.backup_all().await;

        assert!(report.is_success());
        assert_eq!(report.written.len(), 2);
        for volume in &volumes {
            assert!(paths.index_backup_path(volume.path()).is_file());
            assert!(!paths.index_backup_staging_path(volume.path()).exists());
        }
    }
}
