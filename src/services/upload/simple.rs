use super::{PendingObject, ScratchFile, UploadError, UploadService};
use crate::entities::stored_files;

impl UploadService {
    /// Stores a file that arrived whole in one request and already sits in scratch storage.
    pub async fn upload_simple(
        &self,
        owner_id: &str,
        file_name: &str,
        mime_type: Option<String>,
        folder: Option<String>,
        file: ScratchFile,
    ) -> Result<stored_files::Model, UploadError> {
        let storage = self.storage()?;

        let size = file.len as i64;
        let object = PendingObject::describe(file_name, mime_type, folder, size)?;

        let owner = self.quota.load_owner(owner_id).await?;
        let reservation = self.quota.reserve(owner_id, size).await?;

        tracing::info!(owner_id = %owner_id, size, "Simple upload received, storing");

        self.commit(storage, &owner, file.path, object, reservation)
            .await
    }
}
