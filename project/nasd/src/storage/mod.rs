use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{self, AsyncRead};

pub mod driver;
pub mod metrics;
pub mod paths;
pub mod placement;

/// Physical byte store behind the logical namespace.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Streams `reader` into a fresh file for `username` on `volume`.
    /// Returns the physical path and the number of bytes written; the bytes
    /// are durable once this returns.
    async fn write_stream(
        &self,
        volume: &Path,
        username: &str,
        original_name: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> io::Result<(PathBuf, u64)>;
    async fn open(&self, physical_path: &Path) -> io::Result<File>;
    async fn exists(&self, physical_path: &Path) -> io::Result<bool>;
    /// Removes a file; `Ok(false)` if it was already gone.
    async fn remove(&self, physical_path: &Path) -> io::Result<bool>;
    async fn create_path(&self, path: &Path) -> io::Result<PathBuf>;
}
