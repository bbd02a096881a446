use super::error::UploadError;
use crate::config::{CHUNK_SIZE, MAX_FILE_SIZE};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};

const CHUNK_PREFIX: &str = "chunk-";
const ASSEMBLED_PREFIX: &str = "assembled-";
const UPLOAD_PREFIX: &str = "upload-";

/// A file in scratch storage. The file is removed when this value is dropped.
#[derive(Debug)]
pub struct ScratchFile {
    pub path: TempPath,
    pub len: u64,
}

/// Local working directory for chunk, assembly and simple-upload files.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    /// Creates the scratch directory and purges files left behind by a previous process.
    pub async fn prepare(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let mut purged = 0;
        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let ours = [CHUNK_PREFIX, ASSEMBLED_PREFIX, UPLOAD_PREFIX]
                .iter()
                .any(|prefix| name.starts_with(prefix));
            if ours && entry.file_type().await?.is_file() {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => purged += 1,
                    Err(e) => tracing::warn!("Failed to purge scratch file {}: {}", name, e),
                }
            }
        }

        if purged > 0 {
            tracing::info!("🧹 Purged {} leftover scratch files from {:?}", purged, root);
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists one chunk, rejecting anything above the chunk ceiling.
    pub async fn write_chunk<R>(&self, reader: R) -> Result<ScratchFile, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        self.write_limited(CHUNK_PREFIX, reader, CHUNK_SIZE)
            .await?
            .ok_or(UploadError::ChunkTooLarge { limit: CHUNK_SIZE })
    }

    /// Persists a whole simple-path upload, rejecting anything above the file ceiling.
    pub async fn write_upload<R>(&self, reader: R) -> Result<ScratchFile, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        self.write_limited(UPLOAD_PREFIX, reader, MAX_FILE_SIZE)
            .await?
            .ok_or(UploadError::FileTooLarge {
                limit: MAX_FILE_SIZE,
            })
    }

    /// Opens an empty file that chunks are appended to during assembly.
    pub(crate) fn create_assembled(&self) -> io::Result<(File, TempPath)> {
        self.create(ASSEMBLED_PREFIX)
    }

    fn create(&self, prefix: &str) -> io::Result<(File, TempPath)> {
        let (file, path) = tempfile::Builder::new()
            .prefix(prefix)
            .tempfile_in(&self.root)?
            .into_parts();
        Ok((File::from_std(file), path))
    }

    /// Returns `Ok(None)` when the stream is longer than `limit`. The partial file is
    /// removed on every failure branch since `TempPath` deletes on drop.
    async fn write_limited<R>(
        &self,
        prefix: &str,
        reader: R,
        limit: u64,
    ) -> Result<Option<ScratchFile>, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        let (file, path) = self
            .create(prefix)
            .map_err(UploadError::ChunkPersistFailure)?;

        let mut limited = reader.take(limit + 1);
        let mut writer = BufWriter::new(file);
        let len = tokio::io::copy(&mut limited, &mut writer)
            .await
            .map_err(UploadError::ChunkPersistFailure)?;
        writer
            .flush()
            .await
            .map_err(UploadError::ChunkPersistFailure)?;

        if len > limit {
            return Ok(None);
        }

        Ok(Some(ScratchFile { path, len }))
    }
}
