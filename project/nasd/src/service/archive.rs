use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tar::{Builder, EntryType, Header};
use tokio::io::AsyncWrite;
use tokio_util::io::SyncIoBridge;

use crate::domain::node::Node;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path inside the archive; directories end with `/`.
    pub name: String,
    /// `None` for directories.
    pub source: Option<PathBuf>,
    pub modified_at: DateTime<Utc>,
}

/// A logical directory ready to be streamed as a tar archive.
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    pub root: String,
    pub entries: Vec<ArchiveEntry>,
}

impl DirectoryArchive {
    /// Builds the entry list from a subtree, shallowest first. Entry names are
    /// the part of each logical path below `root`.
    pub fn from_subtree(root: &str, subtree: &[Node]) -> Self {
        let prefix = format!("{root}/");
        let entries = subtree
            .iter()
            .filter_map(|node| {
                let relative = node.logical_path.strip_prefix(&prefix)?;
                Some(if node.is_directory {
                    ArchiveEntry {
                        name: format!("{relative}/"),
                        source: None,
                        modified_at: node.modified_at,
                    }
                } else {
                    ArchiveEntry {
                        name: relative.to_string(),
                        source: node.physical(),
                        modified_at: node.modified_at,
                    }
                })
            })
            .collect();

        DirectoryArchive {
            root: root.to_string(),
            entries,
        }
    }

    /// Suggested download name, e.g. `docs.tar`.
    pub fn file_name(&self) -> String {
        format!("{}.tar", crate::utils::logical_path::file_name(&self.root))
    }

    /// Writes the archive into `writer` on the blocking pool and hands the
    /// writer back.
    pub async fn write_to<W>(self, writer: W) -> Result<W>
    where
        W: Write + Send + 'static,
    {
        let writer = tokio::task::spawn_blocking(move || {
            let mut writer = build_tar(&self.entries, writer)?;
            writer.flush()?;
            Ok::<_, io::Error>(writer)
        })
        .await??;
        Ok(writer)
    }

    pub async fn write_to_async<W>(self, writer: W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let bridge = SyncIoBridge::new(writer);
        tokio::task::spawn_blocking(move || {
            let mut bridge = build_tar(&self.entries, bridge)?;
            bridge.shutdown()
        })
        .await??;
        Ok(())
    }
}

fn build_tar<W: Write>(entries: &[ArchiveEntry], writer: W) -> io::Result<W> {
    let mut tar_builder = Builder::new(writer);

    for entry in entries {
        let mtime = entry.modified_at.timestamp().max(0) as u64;
        match &entry.source {
            None => append_dir(&mut tar_builder, &entry.name, mtime)?,
            Some(source) => {
                let file = match File::open(source) {
                    Ok(file) => file,
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {
                        tracing::warn!(
                            "Skipping {}: {} vanished from disk",
                            entry.name,
                            source.display()
                        );
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                append_file(&mut tar_builder, &entry.name, file, mtime)?;
            }
        }
    }

    tar_builder.into_inner()
}

fn append_file<W: Write>(
    builder: &mut Builder<W>,
    name: &str,
    file: File,
    mtime: u64,
) -> io::Result<()> {
    let metadata = file.metadata()?;
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(metadata.len());
    header.set_mode(0o644);
    header.set_mtime(mtime);
    builder.append_data(&mut header, name, BufReader::new(file))
}

fn append_dir<W: Write>(builder: &mut Builder<W>, name: &str, mtime: u64) -> io::Result<()> {
    let mut header = Header::new_gnu();
    let dir_name = if name.ends_with('/') {
        name.to_string()
    } else {
        format!("{name}/")
    };
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_mtime(mtime);
    builder.append_data(&mut header, dir_name, io::empty())
}
