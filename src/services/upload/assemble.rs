use super::{CompleteUploadRequest, PendingObject, UploadError, UploadService, UploadTransfer};
use crate::config::MAX_FILE_SIZE;
use crate::entities::stored_files;
use tempfile::TempPath;
use tokio::io::{AsyncWriteExt, BufWriter};

impl UploadService {
    /// Completes a chunked transfer: claims it, checks the name and sizes, reserves quota,
    /// concatenates the chunks in index order and commits the result.
    ///
    /// The transfer is gone after this call whatever the outcome; every chunk file and the
    /// assembled file are deleted on both success and failure.
    pub async fn complete_upload(
        &self,
        owner_id: &str,
        req: CompleteUploadRequest,
    ) -> Result<stored_files::Model, UploadError> {
        let storage = self.storage()?;

        let transfer = self.tracker.claim(&req.upload_id, owner_id)?;

        if req.file_size < 0 || req.file_size as u64 > MAX_FILE_SIZE {
            return Err(UploadError::FileTooLarge {
                limit: MAX_FILE_SIZE,
            });
        }

        if req.file_size != transfer.declared_file_size {
            return Err(UploadError::SizeMismatch {
                declared: req.file_size,
                actual: transfer.declared_file_size,
            });
        }

        let object =
            PendingObject::describe(&req.file_name, req.mime_type, req.folder, req.file_size)?;

        let owner = self.quota.load_owner(owner_id).await?;
        let reservation = self.quota.reserve(owner_id, req.file_size).await?;

        if let Some(missing) = transfer.first_missing() {
            tracing::warn!(
                upload_id = %req.upload_id,
                missing,
                total = transfer.total_chunks,
                "Completion requested before all chunks arrived"
            );
            return Err(UploadError::IncompleteUpload {
                missing,
                total: transfer.total_chunks,
            });
        }

        let received = transfer.received_bytes() as i64;
        if received != req.file_size {
            return Err(UploadError::SizeMismatch {
                declared: req.file_size,
                actual: received,
            });
        }

        let (assembled, actual) = self.assemble(&req.upload_id, transfer).await?;
        if actual != req.file_size {
            return Err(UploadError::SizeMismatch {
                declared: req.file_size,
                actual,
            });
        }

        tracing::info!(
            upload_id = %req.upload_id,
            owner_id = %owner_id,
            size = object.size,
            "Chunked upload assembled, storing"
        );

        self.commit(storage, &owner, assembled, object, reservation)
            .await
    }

    /// Appends every chunk to a fresh scratch file in index order, deleting each chunk
    /// as soon as it has been copied. Returns the assembled file and its length.
    async fn assemble(
        &self,
        upload_id: &str,
        mut transfer: UploadTransfer,
    ) -> Result<(TempPath, i64), UploadError> {
        let (file, assembled) = self
            .scratch
            .create_assembled()
            .map_err(UploadError::ChunkPersistFailure)?;
        let mut writer = BufWriter::new(file);
        let mut total: u64 = 0;

        for index in 0..transfer.total_chunks {
            let chunk = transfer
                .chunks
                .remove(&index)
                .ok_or(UploadError::IncompleteUpload {
                    missing: index,
                    total: transfer.total_chunks,
                })?;

            let mut reader = tokio::fs::File::open(&chunk.path)
                .await
                .map_err(UploadError::ChunkPersistFailure)?;
            total += tokio::io::copy(&mut reader, &mut writer)
                .await
                .map_err(UploadError::ChunkPersistFailure)?;

            drop(reader);
            drop(chunk);
        }

        writer
            .flush()
            .await
            .map_err(UploadError::ChunkPersistFailure)?;

        tracing::debug!(
            upload_id = %upload_id,
            bytes = total,
            chunks = transfer.total_chunks,
            "Chunks concatenated"
        );

        Ok((assembled, total as i64))
    }
}
