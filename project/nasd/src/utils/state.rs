use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::node::SqliteNodeRepository;
use crate::domain::session::{SessionRepository, SqliteSessionRepository};
use crate::error::Result;
use crate::service::backup::{IndexBackup, IndexOrigin, open_pool, prepare_index};
use crate::service::file::FileService;
use crate::service::index::IndexService;
use crate::service::lifecycle;
use crate::service::mirror::VolumeMirror;
use crate::service::reclaim::Reclaimer;
use crate::service::scheduler::spawn_scheduler;
use crate::storage::metrics::{DiskUsage, UsageProbe};
use crate::storage::paths::PathManager;
use crate::storage::placement::{PlacementPolicy, SpaceProbe, StatvfsProbe};
use crate::storage::{Storage, driver::filesystem::FilesystemStorage};
use crate::utils::notify::{LogNotifier, Notifier};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub paths: PathManager,
    pub pool: Arc<SqlitePool>,
    pub origin: IndexOrigin,
    pub index: Arc<IndexService>,
    pub backup: Arc<IndexBackup>,
    pub storage: Arc<dyn Storage>,
    pub files: Arc<FileService>,
    pub reclaimer: Arc<Reclaimer>,
    pub mirror: Arc<VolumeMirror>,
    pub sessions: Arc<dyn SessionRepository>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Production wiring: `statvfs` for free space, `du` or a directory walk
    /// for usage, alerts to the log.
    pub async fn new(config: Config) -> Result<Self> {
        AppStateBuilder::new(config).build().await
    }

    /// Starts the index backup worker and every periodic sweep.
    pub fn spawn_background(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = vec![self.backup.spawn_worker(cancel.clone())];
        handles.extend(spawn_scheduler(
            self.reclaimer.clone(),
            self.mirror.clone(),
            self.notifier.clone(),
            &self.config.schedule,
            cancel,
        ));
        handles
    }

    /// Final index mirror, clean shutdown marker, pool close.
    pub async fn shutdown(&self) -> Result<()> {
        let report = self.backup.backup_all().await;
        if !report.is_success() {
            warn!(
                "Final index backup reached {} of {} volume(s)",
                report.written.len(),
                report.written.len() + report.failed.len()
            );
        }
        lifecycle::write_shutdown_marker(&self.paths).await?;
        self.pool.close().await;
        info!("Storage core stopped");
        Ok(())
    }
}

pub struct AppStateBuilder {
    config: Config,
    space: Option<Arc<dyn SpaceProbe>>,
    usage: Option<Arc<dyn UsageProbe>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl AppStateBuilder {
    pub fn new(config: Config) -> Self {
        AppStateBuilder {
            config,
            space: None,
            usage: None,
            notifier: None,
        }
    }

    pub fn space_probe(mut self, space: Arc<dyn SpaceProbe>) -> Self {
        self.space = Some(space);
        self
    }

    pub fn usage_probe(mut self, usage: Arc<dyn UsageProbe>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn build(self) -> Result<AppState> {
        let config = self.config;
        config.validate()?;
        let config = Arc::new(config);
        let volumes = config.storage.paths.clone();
        let paths = PathManager::new(&config.data_dir);
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(LogNotifier) as Arc<dyn Notifier>);

        let clean_shutdown = lifecycle::consume_shutdown_marker(&paths).await?;
        let origin = prepare_index(&paths, &volumes, notifier.as_ref()).await?;
        if !clean_shutdown && origin != IndexOrigin::Empty {
            notifier.system_error(
                "Unexpected shutdown",
                "The storage core did not shut down cleanly during its previous run.",
            );
        }

        let pool = Arc::new(open_pool(&paths).await?);
        let backup = Arc::new(IndexBackup::new(
            pool.clone(),
            paths.clone(),
            volumes.clone(),
            Duration::from_millis(config.schedule.index_backup_delay_ms),
            notifier.clone(),
        ));
        if matches!(origin, IndexOrigin::Restored(_)) {
            // spread the recovered index back to every volume
            backup.request();
        }
        let index = Arc::new(IndexService::new(
            Arc::new(SqliteNodeRepository::new(pool.clone())),
            backup.clone(),
        ));

        let storage: Arc<dyn Storage> = Arc::new(FilesystemStorage::new(paths.clone()));
        let usage = self.usage.unwrap_or_else(|| {
            Arc::new(DiskUsage::new(config.storage.native_du)) as Arc<dyn UsageProbe>
        });
        let space = self
            .space
            .unwrap_or_else(|| Arc::new(StatvfsProbe) as Arc<dyn SpaceProbe>);
        let placement = Arc::new(PlacementPolicy::new(
            volumes,
            config.storage.quota_bytes(),
            space,
            usage.clone(),
        ));

        let files = Arc::new(FileService::new(
            index.clone(),
            storage.clone(),
            placement,
            config.clone(),
        ));
        let sessions: Arc<dyn SessionRepository> =
            Arc::new(SqliteSessionRepository::new(pool.clone()));
        let reclaimer = Arc::new(Reclaimer::new(
            index.clone(),
            files.clone(),
            storage.clone(),
            sessions.clone(),
            config.trash_can.clone(),
        ));
        let mirror = Arc::new(VolumeMirror::new(
            &config,
            paths.clone(),
            usage,
            notifier.clone(),
        ));

        info!(
            "Storage core ready: {} volume(s), {} indexed node(s), index {:?}",
            config.storage.paths.len(),
            index.count().await?,
            origin
        );

        Ok(AppState {
            config,
            paths,
            pool,
            origin,
            index,
            backup,
            storage,
            files,
            reclaimer,
            mirror,
            sessions,
            notifier,
        })
    }
}
