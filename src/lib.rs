pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::{CHUNK_SIZE, MAX_FILE_SIZE, UploadConfig};
use crate::services::file_service::FileService;
use crate::services::quota::QuotaService;
use crate::services::storage::BlobStore;
use crate::services::upload::UploadService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart boundaries and the text fields sent next to the bytes.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_chunk,
        api::handlers::upload::complete_upload,
        api::handlers::upload::upload_file,
        api::handlers::files::list_files,
        api::handlers::files::rename_file,
        api::handlers::files::signed_url,
        api::handlers::files::download_file,
        api::handlers::files::copy_file,
        api::handlers::files::delete_file,
        api::handlers::files::purge_drive,
        api::handlers::storage::storage_usage,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            services::upload::ChunkReceipt,
            services::upload::CompleteUploadRequest,
            services::upload::StoredObjectView,
            services::upload::UploadResponse,
            services::quota::QuotaUsage,
            api::handlers::files::FileListResponse,
            api::handlers::files::RenameRequest,
            api::handlers::files::SignedUrlResponse,
            api::handlers::files::DeleteResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "upload", description = "Chunked and simple upload endpoints"),
        (name = "files", description = "Stored file endpoints"),
        (name = "storage", description = "Quota endpoints"),
        (name = "system", description = "Health endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub blob: BlobStore,
    pub uploads: Arc<UploadService>,
    pub files: Arc<FileService>,
    pub quota: QuotaService,
    pub config: UploadConfig,
}

pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api/files/upload-chunk",
            post(api::handlers::upload::upload_chunk)
                .layer(DefaultBodyLimit::max(CHUNK_SIZE as usize + MULTIPART_OVERHEAD)),
        )
        .route(
            "/api/files/upload-complete",
            post(api::handlers::upload::complete_upload),
        )
        .route(
            "/api/files/upload",
            post(api::handlers::upload::upload_file)
                .layer(DefaultBodyLimit::max(MAX_FILE_SIZE as usize + MULTIPART_OVERHEAD)),
        )
        .route("/api/storage", get(api::handlers::storage::storage_usage))
        .route(
            "/api/files",
            get(api::handlers::files::list_files).delete(api::handlers::files::purge_drive),
        )
        .route(
            "/api/files/:id",
            patch(api::handlers::files::rename_file).delete(api::handlers::files::delete_file),
        )
        .route("/api/files/:id/url", get(api::handlers::files::signed_url))
        .route(
            "/api/files/:id/download",
            get(api::handlers::files::download_file),
        )
        .route("/api/files/:id/copy", post(api::handlers::files::copy_file))
        .route_layer(from_fn_with_state(
            state.clone(),
            api::middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .merge(protected)
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
