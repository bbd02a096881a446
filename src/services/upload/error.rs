use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to write upload data to scratch storage: {0}")]
    ChunkPersistFailure(#[source] std::io::Error),

    #[error("Upload not found. Please restart the upload")]
    UploadNotFound,

    #[error("Upload is incomplete: chunk {missing} of {total} was never received")]
    IncompleteUpload { missing: u32, total: u32 },

    #[error("Storage quota exceeded: {requested} bytes requested, {available} bytes available")]
    QuotaExceeded { requested: i64, available: i64 },

    #[error("Upload failed")]
    RemoteStoreFailure(#[source] anyhow::Error),

    #[error("Storage is not configured. Please contact the administrator")]
    MissingConfiguration,

    #[error("Upload belongs to another user")]
    OwnershipMismatch,

    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("Chunk exceeds the maximum chunk size of {limit} bytes")]
    ChunkTooLarge { limit: u64 },

    #[error("File exceeds the maximum file size of {limit} bytes")]
    FileTooLarge { limit: u64 },

    #[error("Declared size {declared} does not match the {actual} bytes received")]
    SizeMismatch { declared: i64, actual: i64 },

    #[error("Unknown owner: {0}")]
    UnknownOwner(String),

    #[error("File not found")]
    FileNotFound,

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}
