use crate::config::UploadConfig;
use crate::entities::{prelude::*, storage_configs};
use crate::services::storage::{BlobStore, S3StorageService, StorageService};
use aws_sdk_s3::config::Region;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{info, warn};

/// Connection settings for one S3-compatible backend.
pub struct BackendSettings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    pub force_path_style: bool,
}

impl From<storage_configs::Model> for BackendSettings {
    fn from(row: storage_configs::Model) -> Self {
        Self {
            endpoint: row.endpoint,
            access_key: row.access_key,
            secret_key: row.secret_key,
            bucket: row.bucket,
            region: row.region,
            force_path_style: row.force_path_style,
        }
    }
}

impl BackendSettings {
    fn from_config(config: &UploadConfig) -> Option<Self> {
        Some(Self {
            endpoint: config.minio_endpoint.clone()?,
            access_key: config.minio_access_key.clone()?,
            secret_key: config.minio_secret_key.clone()?,
            bucket: config.minio_bucket.clone()?,
            region: config.minio_region.clone(),
            force_path_style: true,
        })
    }
}

/// Builds the blob store from the active `storage_configs` row, falling back to the
/// MINIO_* environment. With neither present the store starts unconfigured and every
/// upload fails fast until a backend is supplied.
pub async fn setup_storage(db: &DatabaseConnection, config: &UploadConfig) -> BlobStore {
    let store = BlobStore::unconfigured();
    reload_storage(db, config, &store).await;
    store
}

/// Re-reads the active backend and swaps it into `store`.
pub async fn reload_storage(db: &DatabaseConnection, config: &UploadConfig, store: &BlobStore) {
    let active = match StorageConfigs::find()
        .filter(storage_configs::Column::IsActive.eq(true))
        .one(db)
        .await
    {
        Ok(row) => row,
        Err(e) => {
            warn!("Failed to read storage configuration: {}", e);
            None
        }
    };

    let settings = match active {
        Some(row) => {
            info!("☁️  Using storage configuration '{}'", row.provider_name);
            Some(BackendSettings::from(row))
        }
        None => BackendSettings::from_config(config),
    };

    match settings {
        Some(settings) => {
            let backend: Arc<dyn StorageService> = Arc::new(connect(settings).await);
            store.replace(Some(backend));
        }
        None => {
            warn!("⚠️  No storage configuration found. Uploads are disabled until one is added.");
            store.replace(None);
        }
    }
}

async fn connect(settings: BackendSettings) -> S3StorageService {
    info!(
        "☁️  S3 Storage: {} (Bucket: {})",
        settings.endpoint, settings.bucket
    );

    let aws_config = aws_config::from_env()
        .endpoint_url(&settings.endpoint)
        .region(Region::new(settings.region))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            settings.access_key,
            settings.secret_key,
            None,
            None,
            "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(settings.force_path_style)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Ensure bucket exists
    match s3_client.head_bucket().bucket(&settings.bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", settings.bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", settings.bucket);
            if let Err(e) = s3_client.create_bucket().bucket(&settings.bucket).send().await {
                tracing::error!("❌ Failed to create bucket '{}': {}", settings.bucket, e);
            } else {
                info!("✅ Bucket '{}' created successfully", settings.bucket);
            }
        }
    }

    S3StorageService::new(s3_client, settings.bucket)
}
