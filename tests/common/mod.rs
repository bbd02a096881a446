#![allow(dead_code)]

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use drive_upload::config::UploadConfig;
use drive_upload::entities::users;
use drive_upload::infrastructure::database;
use drive_upload::services::file_service::FileService;
use drive_upload::services::quota::QuotaService;
use drive_upload::services::storage::{BlobStore, PutResult, StorageService};
use drive_upload::services::upload::{
    ChunkMeta, ScratchSpace, UploadService, UploadTracker,
};
use drive_upload::{AppState, create_app};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, EntityTrait, Set};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const JWT_SECRET: &str = "test_secret";

pub struct MockStorageService {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_puts: AtomicBool,
    pub puts: AtomicUsize,
    pub delete_delay_ms: AtomicU64,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
            puts: AtomicUsize::new(0),
            delete_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn put_stream<'a>(
        &self,
        key: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
        _content_type: &str,
    ) -> anyhow::Result<PutResult> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;

        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("simulated object store outage"));
        }

        let size = data.len() as i64;
        self.files.lock().unwrap().insert(key.to_string(), data);

        Ok(PutResult {
            size,
            s3_key: key.to_string(),
        })
    }

    async fn get_object_stream(&self, key: &str) -> anyhow::Result<ByteStream> {
        let data = self
            .object(key)
            .ok_or_else(|| anyhow::anyhow!("Key not found"))?;
        Ok(ByteStream::from(data))
    }

    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> anyhow::Result<String> {
        Ok(format!(
            "http://mock-bucket/{}?X-Amz-Expires={}",
            key,
            expires_in.as_secs()
        ))
    }

    async fn delete_file(&self, key: &str) -> anyhow::Result<()> {
        let delay = self.delete_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.files.lock().unwrap().remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> anyhow::Result<usize> {
        let mut files = self.files.lock().unwrap();
        let before = files.len();
        files.retain(|key, _| !key.starts_with(prefix));
        Ok(before - files.len())
    }

    async fn copy_object(&self, source_key: &str, dest_key: &str) -> anyhow::Result<()> {
        let data = self
            .object(source_key)
            .ok_or_else(|| anyhow::anyhow!("Source key not found"))?;
        self.files
            .lock()
            .unwrap()
            .insert(dest_key.to_string(), data);
        Ok(())
    }

    async fn file_exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(key))
    }
}

pub struct TestEnv {
    pub db: DatabaseConnection,
    pub storage: Arc<MockStorageService>,
    pub blob: BlobStore,
    pub tracker: Arc<UploadTracker>,
    pub quota: QuotaService,
    pub uploads: Arc<UploadService>,
    pub files: Arc<FileService>,
    pub config: UploadConfig,
    pub scratch_dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::build(true).await
    }

    /// Environment whose blob store has no backend.
    pub async fn unconfigured() -> Self {
        Self::build(false).await
    }

    async fn build(configured: bool) -> Self {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        database::run_migrations(&db).await.unwrap();

        let storage = Arc::new(MockStorageService::new());
        let blob = if configured {
            BlobStore::with_backend(storage.clone())
        } else {
            BlobStore::unconfigured()
        };

        let scratch_dir = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::prepare(scratch_dir.path()).await.unwrap();
        let tracker = Arc::new(UploadTracker::new());
        let quota = QuotaService::new(db.clone());

        let mut config = UploadConfig::development(scratch_dir.path());
        config.jwt_secret = JWT_SECRET.to_string();

        let uploads = Arc::new(UploadService::new(
            db.clone(),
            blob.clone(),
            tracker.clone(),
            quota.clone(),
            scratch,
        ));
        let files = Arc::new(FileService::new(db.clone(), blob.clone(), quota.clone()));

        Self {
            db,
            storage,
            blob,
            tracker,
            quota,
            uploads,
            files,
            config,
            scratch_dir,
        }
    }

    pub fn app(&self) -> axum::Router {
        create_app(AppState {
            db: self.db.clone(),
            blob: self.blob.clone(),
            uploads: self.uploads.clone(),
            files: self.files.clone(),
            quota: self.quota.clone(),
            config: self.config.clone(),
        })
    }

    pub async fn add_owner(&self, id: &str, used: i64, limit: i64) {
        users::ActiveModel {
            id: Set(id.to_string()),
            username: Set(format!("user-{}", id)),
            storage_prefix: Set(format!("users/{}", id)),
            storage_used: Set(used),
            storage_limit: Set(limit),
            created_at: Set(Some(chrono::Utc::now())),
        }
        .insert(&self.db)
        .await
        .unwrap();
    }

    pub async fn used(&self, owner_id: &str) -> i64 {
        users::Entity::find_by_id(owner_id)
            .one(&self.db)
            .await
            .unwrap()
            .unwrap()
            .storage_used
    }

    /// Number of files currently in the scratch directory.
    pub fn scratch_files(&self) -> usize {
        count_files(self.scratch_dir.path())
    }

    /// Writes `data` to scratch and records it as chunk `index` of `upload_id`.
    pub async fn send_chunk(
        &self,
        owner_id: &str,
        upload_id: &str,
        index: u32,
        total: u32,
        file_size: i64,
        data: &[u8],
    ) -> Result<u32, drive_upload::services::upload::UploadError> {
        let chunk = self.uploads.scratch().write_chunk(data).await?;
        let meta = ChunkMeta {
            upload_id: upload_id.to_string(),
            chunk_index: index,
            total_chunks: total,
            file_name: "video.mp4".to_string(),
            file_size,
            mime_type: Some("video/mp4".to_string()),
            folder: None,
        };
        self.uploads.receive_chunk(owner_id, &meta, chunk)
    }
}

pub fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

/// Deterministic test payload of `len` bytes.
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

pub fn complete_request(
    upload_id: &str,
    file_size: i64,
) -> drive_upload::services::upload::CompleteUploadRequest {
    drive_upload::services::upload::CompleteUploadRequest {
        upload_id: upload_id.to_string(),
        file_name: "video.mp4".to_string(),
        file_size,
        mime_type: Some("video/mp4".to_string()),
        folder: None,
    }
}
