// PathManager maps index files and uploaded bytes to their physical
// locations.
//
// The on-disk layout is roughly as follows:
//
//	<data_dir>
//	├── nas.db
//	├── nas.db.corrupt
//	└── .clean_shutdown
//
//	<volume>
//	├── .nas.db.backup
//	└── <username>
//	    └── <uuid>-<original name>
//
// Physical names carry a random prefix, so they can never be derived from a
// logical path and a logical rename never has to move bytes.

use std::path::{Path, PathBuf};

use uuid::Uuid;

const INDEX_FILE_NAME: &str = "nas.db";
const INDEX_BACKUP_FILE_NAME: &str = ".nas.db.backup";
const INDEX_BACKUP_STAGING_FILE_NAME: &str = ".nas.db.backup.tmp";
const INDEX_QUARANTINE_FILE_NAME: &str = "nas.db.corrupt";
const SHUTDOWN_MARKER_FILE_NAME: &str = ".clean_shutdown";

#[derive(Clone, Debug)]
pub struct PathManager {
    data_dir: PathBuf,
}

impl PathManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        PathManager {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the path to the index database,
    /// (e.g. `<data_dir>/nas.db`).
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(INDEX_FILE_NAME)
    }

    /// Returns where an unreadable index is moved before recovery,
    /// (e.g. `<data_dir>/nas.db.corrupt`).
    pub fn index_quarantine_path(&self) -> PathBuf {
        self.data_dir.join(INDEX_QUARANTINE_FILE_NAME)
    }

    /// Returns the path to the graceful shutdown marker,
    /// (e.g. `<data_dir>/.clean_shutdown`).
    pub fn shutdown_marker_path(&self) -> PathBuf {
        self.data_dir.join(SHUTDOWN_MARKER_FILE_NAME)
    }

    /// Returns the path to the index mirror kept on a volume,
    /// (e.g. `<volume>/.nas.db.backup`).
    pub fn index_backup_path(&self, volume: &Path) -> PathBuf {
        volume.join(INDEX_BACKUP_FILE_NAME)
    }

    /// Returns the path a fresh mirror is written to before it replaces the
    /// previous one, (e.g. `<volume>/.nas.db.backup.tmp`).
    pub fn index_backup_staging_path(&self, volume: &Path) -> PathBuf {
        volume.join(INDEX_BACKUP_STAGING_FILE_NAME)
    }

    /// Returns the directory holding a user's bytes on a volume,
    /// (e.g. `<volume>/<username>`).
    pub fn user_dir(&self, volume: &Path, username: &str) -> PathBuf {
        volume.join(username)
    }

    /// Returns a fresh physical location for an upload,
    /// (e.g. `<volume>/<username>/<uuid>-<original name>`).
    pub fn physical_file_path(&self, volume: &Path, username: &str, original_name: &str) -> PathBuf {
        self.user_dir(volume, username)
            .join(format!("{}-{}", Uuid::new_v4(), original_name))
    }
}
