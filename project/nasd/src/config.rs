use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const BYTES_PER_MB: u64 = 1024 * 1024;
const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Configuration snapshot shared by every component.
///
/// Loaded from a JSON document, e.g.
///
/// ```json
/// {
///   "dataDir": "/var/lib/nasd",
///   "storage": { "paths": ["/mnt/disk1", "/mnt/disk2"], "quotaGB": 500 },
///   "server": { "maxUploadSizeMB": 4096 },
///   "trashcan": { "enabled": true, "retentionDays": 30 },
///   "backup": { "enabled": true, "paths": ["/mnt/backup1", "/mnt/backup2"] }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, rename = "trashcan")]
    pub trash_can: TrashCanConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Volume roots new files are spread across.
    pub paths: Vec<PathBuf>,
    /// Total quota across all volumes; `None` or 0 disables the check.
    #[serde(default, rename = "quotaGB")]
    pub quota_gb: Option<u64>,
    /// Ask `du` for directory sizes before falling back to a directory walk.
    #[serde(default = "default_true")]
    pub native_du: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Per-file upload ceiling; `None` or 0 means unlimited.
    #[serde(default, rename = "maxUploadSizeMB")]
    pub max_upload_size_mb: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashCanConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Mirror destinations, paired by position with `storage.paths`.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default, rename = "quotaGB")]
    pub quota_gb: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    #[serde(default = "default_day_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_day_secs")]
    pub mirror_interval_secs: u64,
    #[serde(default = "default_backup_delay_ms")]
    pub index_backup_delay_ms: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/nasd")
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> u32 {
    30
}

fn default_day_secs() -> u64 {
    24 * 60 * 60
}

fn default_backup_delay_ms() -> u64 {
    500
}

impl Default for TrashCanConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            retention_days: default_retention_days(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_day_secs(),
            mirror_interval_secs: default_day_secs(),
            index_backup_delay_ms: default_backup_delay_ms(),
        }
    }
}

impl StorageConfig {
    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_gb
            .filter(|gb| *gb > 0)
            .map(|gb| gb.saturating_mul(BYTES_PER_GB))
    }
}

impl ServerConfig {
    pub fn max_upload_bytes(&self) -> Option<u64> {
        self.max_upload_size_mb
            .filter(|mb| *mb > 0)
            .map(|mb| mb.saturating_mul(BYTES_PER_MB))
    }
}

impl BackupConfig {
    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_gb
            .filter(|gb| *gb > 0)
            .map(|gb| gb.saturating_mul(BYTES_PER_GB))
    }
}

impl Config {
    /// Minimal configuration over the given volumes, with every optional
    /// feature at its default.
    pub fn new(data_dir: impl Into<PathBuf>, volumes: Vec<PathBuf>) -> Self {
        Config {
            data_dir: data_dir.into(),
            storage: StorageConfig {
                paths: volumes,
                quota_gb: None,
                native_du: true,
            },
            server: ServerConfig::default(),
            trash_can: TrashCanConfig::default(),
            backup: BackupConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path).await.map_err(|err| {
            AppError::Config(format!("cannot read `{}`: {err}", path.display()))
        })?;
        let config: Config = serde_json::from_slice(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the snapshot and reports every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut validation_errors = Vec::new();

        if self.storage.paths.is_empty() {
            validation_errors.push("`storage.paths` must list at least one volume".to_string());
        }
        for path in &self.storage.paths {
            if !path.is_absolute() {
                validation_errors.push(format!(
                    "storage volume `{}` must be an absolute path",
                    path.display()
                ));
            }
        }
        if !self.data_dir.is_absolute() {
            validation_errors.push(format!(
                "`dataDir` `{}` must be an absolute path",
                self.data_dir.display()
            ));
        }
        if self.backup.enabled && self.backup.paths.len() != self.storage.paths.len() {
            validation_errors.push(format!(
                "`backup.paths` has {} entries but `storage.paths` has {}",
                self.backup.paths.len(),
                self.storage.paths.len()
            ));
        }
        if self.schedule.sweep_interval_secs == 0 || self.schedule.mirror_interval_secs == 0 {
            validation_errors.push("schedule intervals must be greater than zero".to_string());
        }

        if !validation_errors.is_empty() {
            return Err(AppError::Config(validation_errors.join("\n")));
        }
        Ok(())
    }
}
