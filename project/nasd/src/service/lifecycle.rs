use tracing::{info, warn};

use crate::error::Result;
use crate::storage::paths::PathManager;

/// Consumes the marker left by the previous graceful shutdown. Returns
/// `false` if the previous run ended without writing it.
pub async fn consume_shutdown_marker(paths: &PathManager) -> Result<bool> {
    match tokio::fs::remove_file(paths.shutdown_marker_path()).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!("No clean shutdown marker found, the previous run ended unexpectedly");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn write_shutdown_marker(paths: &PathManager) -> Result<()> {
    tokio::fs::create_dir_all(paths.data_dir()).await?;
    tokio::fs::write(
        paths.shutdown_marker_path(),
        chrono::Utc::now().to_rfc3339(),
    )
    .await?;
    info!("Clean shutdown marker written");
    Ok(())
}
