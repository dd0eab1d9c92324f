use std::path::{Path, PathBuf};

use crate::storage::Storage;
use crate::storage::paths::PathManager;

use tokio::{
    fs::{File, create_dir_all, remove_file, try_exists},
    io::{self, AsyncRead, AsyncWriteExt, BufWriter},
};

pub struct FilesystemStorage {
    path_manager: PathManager,
}

impl FilesystemStorage {
    pub fn new(path_manager: PathManager) -> Self {
        FilesystemStorage { path_manager }
    }
}

#[async_trait::async_trait]
impl Storage for FilesystemStorage {
    async fn write_stream(
        &self,
        volume: &Path,
        username: &str,
        original_name: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> io::Result<(PathBuf, u64)> {
        let file_path = self
            .create_path(
                &self
                    .path_manager
                    .physical_file_path(volume, username, original_name),
            )
            .await?;

        let written = async {
            let file = File::create(&file_path).await?;
            let mut file_writer = BufWriter::new(file);

            // Copy the body into the file.
            let written = tokio::io::copy(reader, &mut file_writer).await?;
            file_writer.flush().await?;
            file_writer.get_ref().sync_all().await?;

            Ok::<_, io::Error>(written)
        }
        .await;

        match written {
            Ok(written) => Ok((file_path, written)),
            Err(err) => {
                // Never leave a half-written file behind
                if let Err(cleanup_err) = remove_file(&file_path).await {
                    if cleanup_err.kind() != io::ErrorKind::NotFound {
                        tracing::warn!(
                            "Failed to remove partial upload {}: {cleanup_err}",
                            file_path.display()
                        );
                    }
                }
                Err(err)
            }
        }
    }

    async fn open(&self, physical_path: &Path) -> io::Result<File> {
        File::open(physical_path).await
    }

    async fn exists(&self, physical_path: &Path) -> io::Result<bool> {
        try_exists(physical_path).await
    }

    async fn remove(&self, physical_path: &Path) -> io::Result<bool> {
        match remove_file(physical_path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn create_path(&self, path: &Path) -> io::Result<PathBuf> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent).await?;
        }
        Ok(path.to_path_buf())
    }
}
