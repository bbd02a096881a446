use crate::services::quota::QuotaService;
use crate::services::storage::{BlobStore, StorageService};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod assemble;
pub mod chunk;
pub mod commit;
pub mod error;
pub mod scratch;
pub mod simple;
pub mod tracker;
pub mod types;

pub use error::UploadError;
pub use scratch::{ScratchFile, ScratchSpace};
pub use tracker::{UploadTracker, UploadTransfer};
pub use types::*;

/// Chunked and simple upload paths. Both end in [`UploadService::commit`].
pub struct UploadService {
    db: DatabaseConnection,
    blob: BlobStore,
    tracker: Arc<UploadTracker>,
    quota: QuotaService,
    scratch: ScratchSpace,
}

impl UploadService {
    pub fn new(
        db: DatabaseConnection,
        blob: BlobStore,
        tracker: Arc<UploadTracker>,
        quota: QuotaService,
        scratch: ScratchSpace,
    ) -> Self {
        Self {
            db,
            blob,
            tracker,
            quota,
            scratch,
        }
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    pub fn tracker(&self) -> &Arc<UploadTracker> {
        &self.tracker
    }

    /// Snapshot of the active backend; fails before any scratch I/O when none is set.
    pub fn storage(&self) -> Result<Arc<dyn StorageService>, UploadError> {
        self.blob.active().ok_or(UploadError::MissingConfiguration)
    }
}
