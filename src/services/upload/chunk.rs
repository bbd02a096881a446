use super::{ChunkMeta, ScratchFile, UploadError, UploadService};
use crate::config::MAX_FILE_SIZE;
use crate::utils::validation::validate_upload_id;

impl UploadService {
    /// Records one persisted chunk against its transfer.
    ///
    /// The chunk bytes are already in scratch storage; on any rejection the file is
    /// dropped (and deleted) without touching the transfer.
    pub fn receive_chunk(
        &self,
        owner_id: &str,
        meta: &ChunkMeta,
        chunk: ScratchFile,
    ) -> Result<u32, UploadError> {
        self.storage()?;

        validate_upload_id(&meta.upload_id)
            .map_err(|e| UploadError::InvalidChunk(e.to_string()))?;

        if meta.total_chunks == 0 {
            return Err(UploadError::InvalidChunk(
                "totalChunks must be at least 1".to_string(),
            ));
        }
        if meta.chunk_index >= meta.total_chunks {
            return Err(UploadError::InvalidChunk(format!(
                "chunk index {} is outside 0..{}",
                meta.chunk_index, meta.total_chunks
            )));
        }
        if meta.file_size < 0 {
            return Err(UploadError::InvalidChunk(
                "fileSize must not be negative".to_string(),
            ));
        }
        if meta.file_size as u64 > MAX_FILE_SIZE {
            return Err(UploadError::FileTooLarge {
                limit: MAX_FILE_SIZE,
            });
        }

        let len = chunk.len;
        self.tracker.record_chunk(owner_id, meta, chunk)?;

        tracing::debug!(
            upload_id = %meta.upload_id,
            chunk_index = meta.chunk_index,
            total_chunks = meta.total_chunks,
            bytes = len,
            "Chunk received"
        );

        Ok(meta.chunk_index)
    }
}
