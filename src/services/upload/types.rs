use crate::entities::stored_files;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Metadata sent alongside every chunk. The first chunk of a transfer declares
/// `file_name`, `file_size` and `total_chunks`; later copies are not compared.
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    pub upload_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub folder: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceipt {
    pub success: bool,
    pub chunk_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    #[validate(length(min = 1, max = 128))]
    pub upload_id: String,
    #[validate(length(max = 1024))]
    pub file_name: String,
    #[validate(range(min = 0))]
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub folder: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredObjectView {
    pub id: String,
    pub name: String,
    pub original_name: String,
    pub size: i64,
    pub mime_type: String,
    pub folder: Option<String>,
    pub s3_key: String,
    pub created_at: DateTime<Utc>,
}

impl From<stored_files::Model> for StoredObjectView {
    fn from(model: stored_files::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            original_name: model.original_name,
            size: model.size,
            mime_type: model.mime_type,
            folder: model.folder_id,
            s3_key: model.s3_key,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub file: StoredObjectView,
}

impl From<stored_files::Model> for UploadResponse {
    fn from(model: stored_files::Model) -> Self {
        Self {
            success: true,
            file: model.into(),
        }
    }
}

/// Everything the commit step needs to know about an object besides its bytes.
#[derive(Debug, Clone)]
pub struct PendingObject {
    pub name: String,
    pub original_name: String,
    pub mime_type: String,
    pub folder: Option<String>,
    pub size: i64,
}
