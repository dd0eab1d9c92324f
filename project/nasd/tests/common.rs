#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use nasd::config::Config;
use nasd::error::Result;
use nasd::service::file::OperationOutcome;
use nasd::storage::metrics::DiskUsage;
use nasd::storage::placement::SpaceProbe;
use nasd::utils::notify::Notifier;
use nasd::utils::state::{AppState, AppStateBuilder};
use tempfile::TempDir;
use walkdir::WalkDir;

pub const GB: u64 = 1024 * 1024 * 1024;

/// Reports the same free space for every volume.
pub struct FixedSpace(pub u64);

#[async_trait::async_trait]
impl SpaceProbe for FixedSpace {
    async fn free_space(&self, _volume: &Path) -> Result<u64> {
        Ok(self.0)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub successes: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn error_subjects(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn system_success(&self, message: &str) {
        self.successes.lock().unwrap().push(message.to_string());
    }

    fn system_error(&self, subject: &str, _message: &str) {
        self.errors.lock().unwrap().push(subject.to_string());
    }
}

/// Scratch data dir and volumes that live as long as the environment.
pub struct TestEnv {
    pub data: TempDir,
    pub volumes: Vec<TempDir>,
    pub config: Config,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestEnv {
    pub fn new(volume_count: usize) -> Self {
        let data = tempfile::tempdir().unwrap();
        let volumes: Vec<TempDir> = (0..volume_count)
            .map(|_| tempfile::tempdir().unwrap())
            .collect();
        let mut config = Config::new(
            data.path(),
            volumes.iter().map(|v| v.path().to_path_buf()).collect(),
        );
        config.storage.native_du = false;
        config.schedule.index_backup_delay_ms = 10;

        TestEnv {
            data,
            volumes,
            config,
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub async fn state(&self) -> AppState {
        self.state_with_space(1024 * GB).await
    }

    pub async fn state_with_space(&self, free: u64) -> AppState {
        AppStateBuilder::new(self.config.clone())
            .space_probe(Arc::new(FixedSpace(free)))
            .usage_probe(Arc::new(DiskUsage::new(false)))
            .notifier(self.notifier.clone())
            .build()
            .await
            .unwrap()
    }

    pub fn volume(&self, i: usize) -> &Path {
        self.volumes[i].path()
    }
}

pub async fn upload(state: &AppState, parent: &str, name: &str, body: &[u8]) -> OperationOutcome {
    try_upload(state, parent, name, body, None).await.unwrap()
}

pub async fn try_upload(
    state: &AppState,
    parent: &str,
    name: &str,
    body: &[u8],
    mime_type: Option<&str>,
) -> Result<OperationOutcome> {
    let mut reader = body;
    state
        .files
        .upload(
            parent,
            name,
            &mut reader,
            body.len() as u64,
            mime_type.map(str::to_string),
        )
        .await
}

/// Regular files below `root`, for asserting what reached the disk.
pub fn files_on_disk(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            !path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(".nas.db"))
        })
        .collect()
}

pub async fn child_names(state: &AppState, dir: &str) -> Vec<String> {
    state
        .files
        .list_children(dir)
        .await
        .unwrap()
        .into_iter()
        .map(|node| node.file_name)
        .collect()
}
