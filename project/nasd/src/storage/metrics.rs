use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;

/// Measures how many bytes are stored below a directory.
#[async_trait::async_trait]
pub trait UsageProbe: Send + Sync {
    async fn directory_size(&self, path: &Path) -> Result<u64>;

    async fn total_size(&self, paths: &[PathBuf]) -> Result<u64> {
        let mut total_bytes = 0u64;
        for path in paths {
            total_bytes = total_bytes.saturating_add(self.directory_size(path).await?);
        }
        Ok(total_bytes)
    }
}

/// Disk usage probe: `du -sb` on Linux when allowed, otherwise (or when `du`
/// fails) a directory walk.
#[derive(Debug, Clone)]
pub struct DiskUsage {
    native_du: bool,
}

impl DiskUsage {
    pub fn new(native_du: bool) -> Self {
        DiskUsage { native_du }
    }

    async fn native_size(path: &Path) -> Option<u64> {
        let output = Command::new("du")
            .arg("-sb")
            .arg(path)
            .output()
            .await
            .map_err(|err| warn!("Native `du` failed, falling back to a directory walk: {err}"))
            .ok()?;
        if !output.status.success() {
            warn!(
                "Native `du` exited with {}, falling back to a directory walk",
                output.status
            );
            return None;
        }
        parse_du_output(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Default for DiskUsage {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait::async_trait]
impl UsageProbe for DiskUsage {
    async fn directory_size(&self, path: &Path) -> Result<u64> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(0);
        }

        if self.native_du && cfg!(target_os = "linux") {
            if let Some(size) = Self::native_size(path).await {
                debug!("du reports {size} bytes below {}", path.display());
                return Ok(size);
            }
        }

        let root = path.to_path_buf();
        let size = tokio::task::spawn_blocking(move || walk_size(&root)).await?;
        Ok(size)
    }
}

/// Sums regular file sizes below `root`, skipping entries that cannot be read.
pub fn walk_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("Skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

fn parse_du_output(output: &str) -> Option<u64> {
    output.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_du_output() {
        assert_eq!(parse_du_output("4096\t/mnt/disk1\n"), Some(4096));
        assert_eq!(parse_du_output(""), None);
        assert_eq!(parse_du_output("du: cannot access"), None);
    }

    #[test]
    fn test_walk_size_counts_nested_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("alice/nested")).unwrap();
        std::fs::write(dir.path().join("alice/a.bin"), vec![0u8; 100]).unwrap();
        std::fs::write(dir.path().join("alice/nested/b.bin"), vec![0u8; 50]).unwrap();

        assert_eq!(walk_size(dir.path()), 150);
    }

    #[tokio::test]
    async fn test_missing_directory_has_no_usage() {
        let dir = tempdir().unwrap();
        let probe = DiskUsage::new(false);
        let size = probe
            .directory_size(&dir.path().join("missing"))
            .await
            .unwrap();
        assert_eq!(size, 0);
    }

    #[tokio::test]
    async fn test_total_size_without_du() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        std::fs::write(a.path().join("x"), vec![1u8; 10]).unwrap();
        std::fs::write(b.path().join("y"), vec![1u8; 20]).unwrap();

        let probe = DiskUsage::new(false);
        let total = probe
            .total_size(&[a.path().to_path_buf(), b.path().to_path_buf()])
            .await
            .unwrap();
        assert_eq!(total, 30);
    }
}
