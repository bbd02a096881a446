use crate::services::upload::UploadError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    fn upload_status(err: &UploadError) -> StatusCode {
        match err {
            UploadError::UploadNotFound | UploadError::FileNotFound => StatusCode::NOT_FOUND,
            UploadError::IncompleteUpload { .. }
            | UploadError::InvalidChunk(_)
            | UploadError::InvalidFileName(_)
            | UploadError::SizeMismatch { .. } => StatusCode::BAD_REQUEST,
            UploadError::OwnershipMismatch => StatusCode::FORBIDDEN,
            UploadError::UnknownOwner(_) => StatusCode::UNAUTHORIZED,
            UploadError::QuotaExceeded { .. } => StatusCode::INSUFFICIENT_STORAGE,
            UploadError::ChunkTooLarge { .. } | UploadError::FileTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            UploadError::RemoteStoreFailure(_) => StatusCode::BAD_GATEWAY,
            UploadError::MissingConfiguration => StatusCode::SERVICE_UNAVAILABLE,
            UploadError::ChunkPersistFailure(_) | UploadError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Upload(e) => {
                let status = Self::upload_status(&e);
                if status.is_server_error() {
                    tracing::error!("Upload error: {:?}", e);
                } else {
                    tracing::warn!("Upload rejected: {}", e);
                }
                let message = match e {
                    UploadError::Database(_) => "Internal Server Error".to_string(),
                    other => other.to_string(),
                };
                (status, message)
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message
        }));

        (status, body).into_response()
    }
}
