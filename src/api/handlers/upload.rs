use crate::AppState;
use crate::api::error::AppError;
use crate::services::upload::{
    ChunkMeta, ChunkReceipt, CompleteUploadRequest, ScratchFile, UploadError, UploadResponse,
};
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Multipart, State, multipart::MultipartError},
};
use futures::TryStreamExt;
use std::collections::HashMap;
use tokio_util::io::StreamReader;
use validator::Validate;

fn multipart_error(e: MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(err_msg)
    }
}

/// A body-limit hit while streaming surfaces as an I/O error from the reader.
fn persist_error(e: UploadError) -> AppError {
    match e {
        UploadError::ChunkPersistFailure(io) if io.to_string().contains("length limit exceeded") => {
            AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
        }
        other => other.into(),
    }
}

/// Reads the remaining parts so the client sees the error instead of a reset connection.
async fn drain(multipart: &mut Multipart) {
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }
}

fn required<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str, AppError> {
    fields
        .get(name)
        .map(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Missing field: {}", name)))
}

fn parse_number<T: std::str::FromStr>(
    fields: &HashMap<String, String>,
    name: &str,
) -> Result<T, AppError> {
    required(fields, name)?
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid number in field: {}", name)))
}

fn optional(fields: &mut HashMap<String, String>, name: &str) -> Option<String> {
    fields
        .remove(name)
        .filter(|v| !v.is_empty() && v != "null" && v != "undefined")
}

fn parse_chunk_meta(mut fields: HashMap<String, String>) -> Result<ChunkMeta, AppError> {
    Ok(ChunkMeta {
        upload_id: required(&fields, "uploadId")?.to_string(),
        chunk_index: parse_number(&fields, "chunkIndex")?,
        total_chunks: parse_number(&fields, "totalChunks")?,
        file_name: required(&fields, "fileName")?.to_string(),
        file_size: parse_number(&fields, "fileSize")?,
        mime_type: optional(&mut fields, "mimeType"),
        folder: optional(&mut fields, "folder"),
    })
}

#[utoipa::path(
    post,
    path = "/api/files/upload-chunk",
    request_body(content = Multipart, description = "One chunk (`chunk`) plus chunkIndex, totalChunks, uploadId, fileName, fileSize, mimeType, folder"),
    responses(
        (status = 200, description = "Chunk stored", body = ChunkReceipt),
        (status = 400, description = "Missing or invalid chunk metadata"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Upload belongs to another user"),
        (status = 413, description = "Chunk too large"),
        (status = 503, description = "Storage not configured")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "upload"
)]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<Json<ChunkReceipt>, AppError> {
    let result: Result<Json<ChunkReceipt>, AppError> = async {
        state.uploads.storage()?;

        let mut fields = HashMap::new();
        let mut chunk: Option<ScratchFile> = None;

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "chunk" {
                let reader = StreamReader::new(field.map_err(std::io::Error::other));
                chunk = Some(
                    state
                        .uploads
                        .scratch()
                        .write_chunk(reader)
                        .await
                        .map_err(persist_error)?,
                );
            } else {
                let text = field.text().await.map_err(multipart_error)?;
                fields.insert(name, text);
            }
        }

        let chunk = chunk.ok_or(AppError::BadRequest("No chunk provided".to_string()))?;
        let meta = parse_chunk_meta(fields)?;

        let chunk_index = state.uploads.receive_chunk(&claims.sub, &meta, chunk)?;

        Ok(Json(ChunkReceipt {
            success: true,
            chunk_index,
        }))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            tracing::warn!("Chunk upload failed early: {}. Consuming remaining stream...", e);
            drain(&mut multipart).await;
            Err(e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/files/upload-complete",
    request_body = CompleteUploadRequest,
    responses(
        (status = 200, description = "Chunks assembled and stored", body = UploadResponse),
        (status = 400, description = "Incomplete upload or size mismatch"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Upload not found"),
        (status = 502, description = "Object store rejected the upload"),
        (status = 503, description = "Storage not configured"),
        (status = 507, description = "Storage quota exceeded")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "upload"
)]
pub async fn complete_upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CompleteUploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let record = state.uploads.complete_upload(&claims.sub, req).await?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    post,
    path = "/api/files/upload",
    request_body(content = Multipart, description = "Whole file (`file`) plus optional folder"),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "File too large"),
        (status = 502, description = "Object store rejected the upload"),
        (status = 503, description = "Storage not configured"),
        (status = 507, description = "Storage quota exceeded")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "upload"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let result: Result<Json<UploadResponse>, AppError> = async {
        state.uploads.storage()?;

        let mut folder: Option<String> = None;
        let mut received: Option<(String, Option<String>, ScratchFile)> = None;

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                let file_name = field.file_name().unwrap_or("unnamed").to_string();
                let content_type = field.content_type().map(|s| s.to_string());
                let reader = StreamReader::new(field.map_err(std::io::Error::other));
                let file = state
                    .uploads
                    .scratch()
                    .write_upload(reader)
                    .await
                    .map_err(persist_error)?;
                received = Some((file_name, content_type, file));
            } else if name == "folder" {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.is_empty() && text != "null" {
                    folder = Some(text);
                }
            }
        }

        let (file_name, content_type, file) =
            received.ok_or(AppError::BadRequest("No file provided".to_string()))?;

        let record = state
            .uploads
            .upload_simple(&claims.sub, &file_name, content_type, folder, file)
            .await?;

        Ok(Json(record.into()))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            drain(&mut multipart).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_chunk_meta() {
        let meta = parse_chunk_meta(fields(&[
            ("uploadId", "abc123"),
            ("chunkIndex", "2"),
            ("totalChunks", "3"),
            ("fileName", "movie.mp4"),
            ("fileSize", "125829120"),
            ("mimeType", "video/mp4"),
            ("folder", "null"),
        ]))
        .unwrap();

        assert_eq!(meta.upload_id, "abc123");
        assert_eq!(meta.chunk_index, 2);
        assert_eq!(meta.total_chunks, 3);
        assert_eq!(meta.file_size, 125829120);
        assert_eq!(meta.mime_type.as_deref(), Some("video/mp4"));
        assert_eq!(meta.folder, None);
    }

    #[test]
    fn test_parse_chunk_meta_rejects_missing_or_bad_fields() {
        assert!(matches!(
            parse_chunk_meta(fields(&[("uploadId", "abc123")])),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            parse_chunk_meta(fields(&[
                ("uploadId", "abc123"),
                ("chunkIndex", "-1"),
                ("totalChunks", "3"),
                ("fileName", "movie.mp4"),
                ("fileSize", "10"),
            ])),
            Err(AppError::BadRequest(_))
        ));
    }
}
