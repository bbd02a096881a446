use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Largest single chunk accepted by the chunked upload path (50 MB).
/// Kept below the reverse proxy's request body ceiling.
pub const CHUNK_SIZE: u64 = 50 * 1024 * 1024;

/// Largest file accepted by either upload path (3 GB).
pub const MAX_FILE_SIZE: u64 = 3 * 1024 * 1024 * 1024;

/// Chunked transfers older than this are evicted by the reaper.
pub const STALE_UPLOAD_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// How often the reaper sweeps the upload tracker.
pub const REAPER_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Lifetime of signed retrieval URLs.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

/// Runtime configuration for the upload service
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Local directory for chunk and assembly scratch files (default: "temp_uploads")
    pub scratch_dir: PathBuf,

    /// JWT Secret Key (Required in production)
    pub jwt_secret: String,

    /// Fallback blob backend when no storage config row is active
    pub minio_endpoint: Option<String>,
    pub minio_access_key: Option<String>,
    pub minio_secret_key: Option<String>,
    pub minio_bucket: Option<String>,
    /// Region for the fallback backend (default: "us-east-1")
    pub minio_region: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("temp_uploads"),
            jwt_secret: "secret".to_string(),
            minio_endpoint: None,
            minio_access_key: None,
            minio_secret_key: None,
            minio_bucket: None,
            minio_region: "us-east-1".to_string(),
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            scratch_dir: env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.scratch_dir),

            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),

            minio_endpoint: env::var("MINIO_ENDPOINT").ok(),
            minio_access_key: env::var("MINIO_ACCESS_KEY").ok(),
            minio_secret_key: env::var("MINIO_SECRET_KEY").ok(),
            minio_bucket: env::var("MINIO_BUCKET").ok(),
            minio_region: env::var("MINIO_REGION").unwrap_or(default.minio_region),
        }
    }

    /// Create config for development and tests (scratch dir supplied by caller)
    pub fn development(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            ..Self::default()
        }
    }

    /// True when every fallback MINIO_* variable is present.
    pub fn has_fallback_backend(&self) -> bool {
        self.minio_endpoint.is_some()
            && self.minio_access_key.is_some()
            && self.minio_secret_key.is_some()
            && self.minio_bucket.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = UploadConfig::default();
        assert_eq!(config.scratch_dir, PathBuf::from("temp_uploads"));
        assert!(!config.has_fallback_backend());
    }

    #[test]
    fn test_development_config() {
        let config = UploadConfig::development("/tmp/scratch");
        assert_eq!(config.scratch_dir, PathBuf::from("/tmp/scratch"));
        assert_eq!(config.minio_region, "us-east-1");
    }

    #[test]
    fn test_chunk_ceiling_below_total_ceiling() {
        assert!(CHUNK_SIZE < MAX_FILE_SIZE);
        assert!(REAPER_INTERVAL < STALE_UPLOAD_MAX_AGE);
    }
}
