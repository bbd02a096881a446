use super::error::UploadError;
use super::scratch::ScratchFile;
use super::types::ChunkMeta;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeMap;

/// In-flight chunked transfer. Dropping it deletes every chunk file it still holds.
#[derive(Debug)]
pub struct UploadTransfer {
    pub owner_id: String,
    pub file_name: String,
    pub declared_file_size: i64,
    pub total_chunks: u32,
    pub chunks: BTreeMap<u32, ScratchFile>,
    pub created_at: DateTime<Utc>,
}

impl UploadTransfer {
    /// Lowest index in `0..total_chunks` with no recorded chunk.
    pub fn first_missing(&self) -> Option<u32> {
        (0..self.total_chunks).find(|index| !self.chunks.contains_key(index))
    }

    pub fn received_bytes(&self) -> u64 {
        self.chunks.values().map(|chunk| chunk.len).sum()
    }
}

/// Process-wide table of chunked transfers keyed by upload id.
///
/// Entries leave the table through exactly one of [`UploadTracker::claim`] or
/// [`UploadTracker::evict_older_than`]; whoever removes an entry owns its chunk files.
#[derive(Debug, Default)]
pub struct UploadTracker {
    transfers: DashMap<String, UploadTransfer>,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `chunk` at its index, creating the transfer on first sight of the id.
    /// A chunk re-sent for an index replaces the earlier file.
    pub fn record_chunk(
        &self,
        owner_id: &str,
        meta: &ChunkMeta,
        chunk: ScratchFile,
    ) -> Result<(), UploadError> {
        let replaced = match self.transfers.entry(meta.upload_id.clone()) {
            Entry::Occupied(mut entry) => {
                let transfer = entry.get_mut();
                if transfer.owner_id != owner_id {
                    return Err(UploadError::OwnershipMismatch);
                }
                if meta.chunk_index >= transfer.total_chunks {
                    return Err(UploadError::InvalidChunk(format!(
                        "chunk index {} is outside 0..{}",
                        meta.chunk_index, transfer.total_chunks
                    )));
                }
                transfer.chunks.insert(meta.chunk_index, chunk)
            }
            Entry::Vacant(entry) => {
                entry.insert(UploadTransfer {
                    owner_id: owner_id.to_string(),
                    file_name: meta.file_name.clone(),
                    declared_file_size: meta.file_size,
                    total_chunks: meta.total_chunks,
                    chunks: BTreeMap::from([(meta.chunk_index, chunk)]),
                    created_at: Utc::now(),
                });
                None
            }
        };

        // The shard lock is released here, so removing the old file does not block other ids.
        if replaced.is_some() {
            tracing::debug!(
                upload_id = %meta.upload_id,
                chunk_index = meta.chunk_index,
                "Chunk re-sent, replacing previous copy"
            );
        }

        Ok(())
    }

    /// Removes the transfer for completion. Ids owned by someone else read as absent.
    pub fn claim(&self, upload_id: &str, owner_id: &str) -> Result<UploadTransfer, UploadError> {
        self.transfers
            .remove_if(upload_id, |_, transfer| transfer.owner_id == owner_id)
            .map(|(_, transfer)| transfer)
            .ok_or(UploadError::UploadNotFound)
    }

    /// Removes every transfer created before `cutoff` and hands them to the caller.
    pub fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Vec<(String, UploadTransfer)> {
        let stale: Vec<String> = self
            .transfers
            .iter()
            .filter(|entry| entry.created_at < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|upload_id| {
                // Age is re-checked under the shard lock in case the id was claimed
                // and restarted since the scan.
                self.transfers
                    .remove_if(&upload_id, |_, transfer| transfer.created_at < cutoff)
            })
            .collect()
    }

    pub fn contains(&self, upload_id: &str) -> bool {
        self.transfers.contains_key(upload_id)
    }

    pub fn chunk_count(&self, upload_id: &str) -> Option<usize> {
        self.transfers.get(upload_id).map(|t| t.chunks.len())
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}
