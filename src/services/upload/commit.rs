use super::{PendingObject, UploadError, UploadService};
use crate::entities::{stored_files, users};
use crate::services::quota::{QuotaReservation, QuotaService};
use crate::services::storage::StorageService;
use crate::utils::validation::{file_extension, sanitize_filename};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set, TransactionTrait};
use std::sync::Arc;
use tempfile::TempPath;
use tokio::io::BufReader;
use uuid::Uuid;

/// Remote key for a new object: the owner's namespace, a fresh id and the original
/// extension. The client-supplied name never reaches the key.
pub fn object_key(storage_prefix: &str, original_name: &str) -> String {
    let prefix = storage_prefix.trim_end_matches('/');
    match file_extension(original_name) {
        Some(ext) => format!("{}/{}.{}", prefix, Uuid::new_v4(), ext),
        None => format!("{}/{}", prefix, Uuid::new_v4()),
    }
}

impl PendingObject {
    /// Display name, original name and content type as they will be recorded.
    /// Unparseable content types fall back to `application/octet-stream`.
    pub(super) fn describe(
        file_name: &str,
        mime_type: Option<String>,
        folder: Option<String>,
        size: i64,
    ) -> Result<Self, UploadError> {
        let original_name = if file_name.is_empty() {
            "unnamed".to_string()
        } else {
            file_name.to_string()
        };
        let name = sanitize_filename(&original_name)
            .map_err(|e| UploadError::InvalidFileName(e.to_string()))?;

        Ok(Self {
            name,
            original_name,
            mime_type: mime_type
                .and_then(|m| m.parse::<mime::Mime>().ok())
                .unwrap_or(mime::APPLICATION_OCTET_STREAM)
                .to_string(),
            folder: folder.filter(|f| !f.is_empty() && f != "null"),
            size,
        })
    }
}

impl UploadService {
    /// put → record + quota increment (one transaction) → done.
    ///
    /// `source` is deleted once its bytes are remote or on failure. If the record
    /// transaction fails the remote object is removed again so nothing is left half committed.
    pub(super) async fn commit(
        &self,
        storage: Arc<dyn StorageService>,
        owner: &users::Model,
        source: TempPath,
        object: PendingObject,
        reservation: QuotaReservation,
    ) -> Result<stored_files::Model, UploadError> {
        let s3_key = object_key(&owner.storage_prefix, &object.original_name);

        let file = tokio::fs::File::open(&source)
            .await
            .map_err(UploadError::ChunkPersistFailure)?;

        let put = storage
            .put_stream(&s3_key, Box::new(BufReader::new(file)), &object.mime_type)
            .await
            .map_err(|e| {
                tracing::error!(owner_id = %owner.id, key = %s3_key, "Remote put failed: {:?}", e);
                UploadError::RemoteStoreFailure(e)
            })?;
        drop(source);

        if put.size != object.size {
            tracing::warn!(
                key = %s3_key,
                expected = object.size,
                stored = put.size,
                "Stored size differs from scratch size"
            );
        }

        let record = match self
            .quota
            .settle(reservation, write_record(&self.db, &owner.id, &put.s3_key, &object))
            .await
        {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(owner_id = %owner.id, key = %s3_key, "Failed to write file record: {}", e);
                if let Err(cleanup) = storage.delete_file(&put.s3_key).await {
                    tracing::warn!(key = %s3_key, "Failed to remove orphaned object: {}", cleanup);
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            owner_id = %owner.id,
            file_id = %record.id,
            key = %record.s3_key,
            size = record.size,
            "✅ Upload committed"
        );

        Ok(record)
    }
}

/// Inserts the file record and charges the owner's quota atomically.
pub(crate) async fn write_record(
    db: &DatabaseConnection,
    owner_id: &str,
    s3_key: &str,
    object: &PendingObject,
) -> Result<stored_files::Model, DbErr> {
    let txn = db.begin().await?;
    let now = Utc::now();

    let record = stored_files::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        owner_id: Set(owner_id.to_string()),
        name: Set(object.name.clone()),
        original_name: Set(object.original_name.clone()),
        s3_key: Set(s3_key.to_string()),
        size: Set(object.size),
        mime_type: Set(object.mime_type.clone()),
        folder_id: Set(object.folder.clone()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    QuotaService::increment(&txn, owner_id, object.size).await?;

    txn.commit().await?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_uses_extension_only() {
        let key = object_key("users/alice", "../../Holiday Video.MP4");
        assert!(key.starts_with("users/alice/"));
        assert!(key.ends_with(".mp4"));
        assert!(!key.contains("Holiday"));
        assert!(!key.contains(".."));
    }

    #[test]
    fn test_object_key_without_extension() {
        let key = object_key("users/alice/", "Makefile");
        let id = key.strip_prefix("users/alice/").unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_describe_defaults() {
        let object = PendingObject::describe("", Some(String::new()), Some("null".into()), 5).unwrap();
        assert_eq!(object.name, "unnamed");
        assert_eq!(object.mime_type, "application/octet-stream");
        assert_eq!(object.folder, None);

        let object =
            PendingObject::describe("a|b.txt", Some("text/plain".into()), Some("f1".into()), 5)
                .unwrap();
        assert_eq!(object.name, "a_b.txt");
        assert_eq!(object.original_name, "a|b.txt");
        assert_eq!(object.folder.as_deref(), Some("f1"));

        let object = PendingObject::describe("x.bin", Some("not a mime".into()), None, 1).unwrap();
        assert_eq!(object.mime_type, "application/octet-stream");
    }

    #[test]
    fn test_object_keys_are_unique() {
        assert_ne!(
            object_key("users/alice", "a.txt"),
            object_key("users/alice", "a.txt")
        );
    }
}
