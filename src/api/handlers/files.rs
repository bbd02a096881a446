use crate::AppState;
use crate::api::error::AppError;
use crate::services::upload::{StoredObjectView, UploadResponse};
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct SignedUrlResponse {
    pub success: bool,
    pub url: String,
    pub expires_in: u64,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteResponse {
    pub success: bool,
    pub deleted: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub folder: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    pub success: bool,
    pub files: Vec<StoredObjectView>,
    pub current_folder: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenameRequest {
    pub name: String,
}

/// ASCII-only `attachment` disposition; anything else is replaced with '_'.
fn content_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

#[utoipa::path(
    get,
    path = "/api/files",
    params(
        ("folder" = Option<String>, Query, description = "Folder ID; the root when absent")
    ),
    responses(
        (status = 200, description = "Caller's files in the folder, newest first", body = FileListResponse)
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn list_files(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<Json<FileListResponse>, AppError> {
    let files = state
        .files
        .list(&claims.sub, query.folder.as_deref())
        .await?;

    Ok(Json(FileListResponse {
        success: true,
        files: files.into_iter().map(StoredObjectView::from).collect(),
        current_folder: query.folder,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/files/{id}",
    params(
        ("id" = String, Path, description = "File ID")
    ),
    request_body = RenameRequest,
    responses(
        (status = 200, description = "File renamed", body = UploadResponse),
        (status = 400, description = "Name is required"),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn rename_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    let record = state.files.rename(&claims.sub, &id, &req.name).await?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    get,
    path = "/api/files/{id}/url",
    params(
        ("id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "Time-limited retrieval URL", body = SignedUrlResponse),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn signed_url(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<SignedUrlResponse>, AppError> {
    let url = state.files.signed_url(&claims.sub, &id).await?;

    Ok(Json(SignedUrlResponse {
        success: true,
        url,
        expires_in: crate::config::SIGNED_URL_TTL.as_secs(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/files/{id}/download",
    params(
        ("id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File content"),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (file, stream) = state.files.download(&claims.sub, &id).await?;

    let body = Body::from_stream(ReaderStream::new(stream.into_async_read()));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, file.mime_type.as_str())
        .header(header::CONTENT_LENGTH, file.size)
        .header(header::CONTENT_DISPOSITION, content_disposition(&file.name))
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(body)
        .map_err(|e| AppError::Anyhow(e.into()))
}

#[utoipa::path(
    post,
    path = "/api/files/{id}/copy",
    params(
        ("id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "Copy created", body = UploadResponse),
        (status = 404, description = "File not found"),
        (status = 507, description = "Storage quota exceeded")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn copy_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<UploadResponse>, AppError> {
    let record = state.files.copy(&claims.sub, &id).await?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    params(
        ("id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File deleted", body = DeleteResponse),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.files.delete(&claims.sub, &id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        deleted: 1,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/files",
    responses(
        (status = 200, description = "Every file of the caller removed", body = DeleteResponse)
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn purge_drive(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = state.files.purge_drive(&claims.sub).await?;
    Ok(Json(DeleteResponse {
        success: true,
        deleted,
    }))
}
