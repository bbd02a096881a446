use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub storage: String,
    pub pending_uploads: usize,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = if state.db.ping().await.is_ok() {
        "connected"
    } else {
        "disconnected"
    };

    let storage_status = match state.blob.active() {
        None => "unconfigured",
        Some(storage) => match storage.file_exists("health-check").await {
            Ok(_) => "connected",
            Err(e) => {
                tracing::warn!("Storage health probe failed: {}", e);
                "unreachable"
            }
        },
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        database: db_status.to_string(),
        storage: storage_status.to_string(),
        pending_uploads: state.uploads.tracker().len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
