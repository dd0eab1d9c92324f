use std::io;

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of an [`AppError`], used by the boundary layer to
/// pick a status code and by callers to decide whether a retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Capacity,
    Io,
}

#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors, rejected before any I/O happens
    #[error("Invalid name: {0}")]
    InvalidName(String), // Contains a descriptive message

    #[error("Invalid path: {0}")]
    InvalidPath(String), // Contains a descriptive message

    #[error("File size {size} bytes exceeds the maximum upload limit of {limit} bytes")]
    SizeExceeded { size: u64, limit: u64 },

    #[error("Cannot restore {0}: not a valid trash item")]
    NotRestorable(String), // Contains the logical path

    // Lookup errors
    #[error("{0} not found")]
    NotFound(String), // Contains the logical path

    #[error("{0} not found on disk, index corrected")]
    Inconsistent(String), // Contains the logical path of the removed entry

    // Capacity errors, rejected before any bytes are written
    #[error("Not enough space on any storage volume for {required} bytes")]
    InsufficientSpace { required: u64 },

    #[error("Storage quota exceeded, the system limit is {quota_gb} GB")]
    QuotaExceeded { quota_gb: u64 },

    // Internal errors
    #[error("No storage volumes configured")]
    NoVolumes,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName(_)
            | Self::InvalidPath(_)
            | Self::SizeExceeded { .. }
            | Self::NotRestorable(_) => ErrorKind::Validation,
            Self::NotFound(_) | Self::Inconsistent(_) => ErrorKind::NotFound,
            Self::InsufficientSpace { .. } | Self::QuotaExceeded { .. } => ErrorKind::Capacity,
            Self::NoVolumes
            | Self::Config(_)
            | Self::Sqlx(_)
            | Self::Migration(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::Join(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AppError::InvalidName(".hidden".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AppError::SizeExceeded { size: 2, limit: 1 }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AppError::Inconsistent("alice/a.txt".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            AppError::QuotaExceeded { quota_gb: 1 }.kind(),
            ErrorKind::Capacity
        );
        assert_eq!(
            AppError::Io(io::Error::other("disk gone")).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn test_inconsistent_message_mentions_correction() {
        let err = AppError::Inconsistent("alice/a.txt".into());
        assert_eq!(
            err.to_string(),
            "alice/a.txt not found on disk, index corrected"
        );
    }
}
