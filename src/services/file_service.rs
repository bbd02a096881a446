use crate::config::SIGNED_URL_TTL;
use crate::entities::{prelude::*, stored_files};
use crate::services::quota::QuotaService;
use crate::services::storage::{BlobStore, StorageService};
use crate::services::upload::commit::{object_key, write_record};
use crate::services::upload::{PendingObject, UploadError};
use crate::utils::validation::sanitize_filename;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;

/// Operations on objects that are already committed.
pub struct FileService {
    db: DatabaseConnection,
    blob: BlobStore,
    quota: QuotaService,
}

impl FileService {
    pub fn new(db: DatabaseConnection, blob: BlobStore, quota: QuotaService) -> Self {
        Self { db, blob, quota }
    }

    fn storage(&self) -> Result<Arc<dyn StorageService>, UploadError> {
        self.blob.active().ok_or(UploadError::MissingConfiguration)
    }

    async fn find_owned(
        &self,
        owner_id: &str,
        file_id: &str,
    ) -> Result<stored_files::Model, UploadError> {
        StoredFiles::find_by_id(file_id)
            .filter(stored_files::Column::OwnerId.eq(owner_id))
            .one(&self.db)
            .await?
            .ok_or(UploadError::FileNotFound)
    }

    /// The owner's files in `folder` (the root when `None`), newest first.
    pub async fn list(
        &self,
        owner_id: &str,
        folder: Option<&str>,
    ) -> Result<Vec<stored_files::Model>, UploadError> {
        let query = StoredFiles::find().filter(stored_files::Column::OwnerId.eq(owner_id));
        let query = match folder.filter(|f| !f.is_empty() && *f != "null") {
            Some(folder) => query.filter(stored_files::Column::FolderId.eq(folder)),
            None => query.filter(stored_files::Column::FolderId.is_null()),
        };

        Ok(query
            .order_by_desc(stored_files::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    /// Changes the display name. The object key and original name stay as they are.
    pub async fn rename(
        &self,
        owner_id: &str,
        file_id: &str,
        name: &str,
    ) -> Result<stored_files::Model, UploadError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(UploadError::InvalidFileName("Name is required".to_string()));
        }
        let name = sanitize_filename(name).map_err(|e| UploadError::InvalidFileName(e.to_string()))?;

        let file = self.find_owned(owner_id, file_id).await?;
        let mut active = file.into_active_model();
        active.name = Set(name);
        active.updated_at = Set(Utc::now());
        let file = active.update(&self.db).await?;

        tracing::info!(owner_id = %owner_id, file_id = %file_id, name = %file.name, "File renamed");
        Ok(file)
    }

    pub async fn signed_url(&self, owner_id: &str, file_id: &str) -> Result<String, UploadError> {
        let storage = self.storage()?;
        let file = self.find_owned(owner_id, file_id).await?;

        storage
            .presigned_get_url(&file.s3_key, SIGNED_URL_TTL)
            .await
            .map_err(UploadError::RemoteStoreFailure)
    }

    pub async fn download(
        &self,
        owner_id: &str,
        file_id: &str,
    ) -> Result<(stored_files::Model, ByteStream), UploadError> {
        let storage = self.storage()?;
        let file = self.find_owned(owner_id, file_id).await?;

        let stream = storage
            .get_object_stream(&file.s3_key)
            .await
            .map_err(UploadError::RemoteStoreFailure)?;

        Ok((file, stream))
    }

    /// Removes the object, then its record, returning its bytes to the owner's quota.
    pub async fn delete(&self, owner_id: &str, file_id: &str) -> Result<(), UploadError> {
        let storage = self.storage()?;
        let file = self.find_owned(owner_id, file_id).await?;

        storage
            .delete_file(&file.s3_key)
            .await
            .map_err(UploadError::RemoteStoreFailure)?;

        // Only the caller that actually removes the row hands the bytes back.
        let txn = self.db.begin().await?;
        let removed = StoredFiles::delete_many()
            .filter(stored_files::Column::Id.eq(file_id))
            .filter(stored_files::Column::OwnerId.eq(owner_id))
            .exec(&txn)
            .await?;
        if removed.rows_affected != 1 {
            txn.rollback().await?;
            return Err(UploadError::FileNotFound);
        }
        let size = file.size;
        QuotaService::decrement(&txn, owner_id, size).await?;
        txn.commit().await?;

        tracing::info!(owner_id = %owner_id, file_id = %file_id, size, "🗑️ File deleted");
        Ok(())
    }

    /// Duplicates a stored object under a new key. Charged against quota like an upload.
    pub async fn copy(
        &self,
        owner_id: &str,
        file_id: &str,
    ) -> Result<stored_files::Model, UploadError> {
        let storage = self.storage()?;
        let source = self.find_owned(owner_id, file_id).await?;
        let owner = self.quota.load_owner(owner_id).await?;
        let reservation = self.quota.reserve(owner_id, source.size).await?;

        let dest_key = object_key(&owner.storage_prefix, &source.original_name);
        storage
            .copy_object(&source.s3_key, &dest_key)
            .await
            .map_err(UploadError::RemoteStoreFailure)?;

        let object = PendingObject {
            name: format!("Copy of {}", source.name),
            original_name: source.original_name.clone(),
            mime_type: source.mime_type.clone(),
            folder: source.folder_id.clone(),
            size: source.size,
        };

        let record = match self
            .quota
            .settle(reservation, write_record(&self.db, owner_id, &dest_key, &object))
            .await
        {
            Ok(record) => record,
            Err(e) => {
                if let Err(cleanup) = storage.delete_file(&dest_key).await {
                    tracing::warn!(key = %dest_key, "Failed to remove orphaned copy: {}", cleanup);
                }
                return Err(e.into());
            }
        };

        tracing::info!(owner_id = %owner_id, source = %file_id, copy = %record.id, "File copied");
        Ok(record)
    }

    /// Empties the owner's drive: every object under their namespace, every record,
    /// and the usage counter.
    pub async fn purge_drive(&self, owner_id: &str) -> Result<usize, UploadError> {
        let storage = self.storage()?;
        let owner = self.quota.load_owner(owner_id).await?;

        let namespace = format!("{}/", owner.storage_prefix.trim_end_matches('/'));
        let removed = storage
            .delete_prefix(&namespace)
            .await
            .map_err(UploadError::RemoteStoreFailure)?;

        let txn = self.db.begin().await?;
        let records = StoredFiles::delete_many()
            .filter(stored_files::Column::OwnerId.eq(owner_id))
            .exec(&txn)
            .await?;
        QuotaService::reset(&txn, owner_id).await?;
        txn.commit().await?;

        tracing::info!(
            owner_id = %owner_id,
            objects = removed,
            records = records.rows_affected,
            "🧹 Drive emptied"
        );

        Ok(records.rows_affected as usize)
    }
}
