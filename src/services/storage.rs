use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Part size for multipart puts. Streams shorter than one part go out as a single PutObject.
const PART_SIZE: usize = 10 * 1024 * 1024;

pub struct PutResult {
    pub size: i64,
    pub s3_key: String,
}

/// Capability over the external object store. Upload code only depends on this contract.
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn put_stream<'a>(
        &self,
        key: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
        content_type: &str,
    ) -> Result<PutResult>;
    async fn get_object_stream(&self, key: &str) -> Result<ByteStream>;
    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> Result<String>;
    async fn delete_file(&self, key: &str) -> Result<()>;
    /// Deletes every object whose key starts with `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;
    async fn copy_object(&self, source_key: &str, dest_key: &str) -> Result<()>;
    async fn file_exists(&self, key: &str) -> Result<bool>;
}

/// Holder for the currently active backend.
///
/// The backend can be absent (nothing configured yet) or swapped at runtime when the
/// storage configuration changes; callers take a snapshot with [`BlobStore::active`].
#[derive(Clone, Default)]
pub struct BlobStore {
    backend: Arc<RwLock<Option<Arc<dyn StorageService>>>>,
}

impl BlobStore {
    pub fn unconfigured() -> Self {
        Self::default()
    }

    pub fn with_backend(backend: Arc<dyn StorageService>) -> Self {
        Self {
            backend: Arc::new(RwLock::new(Some(backend))),
        }
    }

    pub fn replace(&self, backend: Option<Arc<dyn StorageService>>) {
        let mut guard = self.backend.write().unwrap_or_else(|e| e.into_inner());
        *guard = backend;
    }

    pub fn active(&self) -> Option<Arc<dyn StorageService>> {
        self.backend
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_configured(&self) -> bool {
        self.active().is_some()
    }
}

pub struct S3StorageService {
    client: Client,
    bucket: String,
}

impl S3StorageService {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    async fn upload_parts<'a>(
        &self,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        reader: &mut (dyn AsyncRead + Unpin + Send + 'a),
    ) -> Result<i64> {
        let mut part_number = 1;
        let mut completed_parts = Vec::new();
        let mut total_size = first.len() as i64;
        let mut body = first;
        let mut buffer = vec![0u8; PART_SIZE];

        loop {
            let upload_part_res = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .body(ByteStream::from(body))
                .part_number(part_number)
                .send()
                .await?;

            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );

            let n = fill_buffer(reader, &mut buffer).await?;
            if n == 0 {
                break;
            }
            total_size += n as i64;
            body = buffer[..n].to_vec();
            part_number += 1;
        }

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;

        Ok(total_size)
    }
}

/// Reads until `buffer` is full or the reader is exhausted.
async fn fill_buffer<R>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let mut n = 0;
    while n < buffer.len() {
        let read = reader.read(&mut buffer[n..]).await?;
        if read == 0 {
            break;
        }
        n += read;
    }
    Ok(n)
}

#[async_trait]
impl StorageService for S3StorageService {
    async fn put_stream<'a>(
        &self,
        key: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
        content_type: &str,
    ) -> Result<PutResult> {
        let mut first = vec![0u8; PART_SIZE];
        let n = fill_buffer(&mut reader, &mut first).await?;
        first.truncate(n);

        if n < PART_SIZE {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .body(ByteStream::from(first))
                .send()
                .await?;
            return Ok(PutResult {
                size: n as i64,
                s3_key: key.to_string(),
            });
        }

        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| anyhow!("No upload ID"))?
            .to_string();

        match self.upload_parts(key, &upload_id, first, reader.as_mut()).await {
            Ok(size) => Ok(PutResult {
                size,
                s3_key: key.to_string(),
            }),
            Err(e) => {
                tracing::error!(key = %key, "Multipart put failed, aborting: {:?}", e);
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(key = %key, "Failed to abort multipart upload: {}", abort_err);
                }
                Err(e)
            }
        }
    }

    async fn get_object_stream(&self, key: &str) -> Result<ByteStream> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(res.body)
    }

    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(expires_in)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await?;
        Ok(request.uri().to_string())
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        if prefix.is_empty() {
            return Err(anyhow!("Refusing to delete with an empty prefix"));
        }

        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let res = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token)
                .send()
                .await?;

            if let Some(contents) = res.contents {
                keys.extend(contents.into_iter().filter_map(|object| object.key));
            }

            if res.is_truncated.unwrap_or(false) {
                continuation_token = res.next_continuation_token;
            } else {
                break;
            }
        }

        for key in &keys {
            self.delete_file(key).await?;
        }

        Ok(keys.len())
    }

    async fn copy_object(&self, source_key: &str, dest_key: &str) -> Result<()> {
        let res = self
            .client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, source_key))
            .key(dest_key)
            .send()
            .await;

        if let Err(e) = res {
            tracing::error!(
                "S3 copy_object failed: source={}/{}, dest={}, error={:?}",
                self.bucket,
                source_key,
                dest_key,
                e
            );
            return Err(e.into());
        }
        Ok(())
    }

    async fn file_exists(&self, key: &str) -> Result<bool> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow!(service_error))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fill_buffer_stops_at_eof() {
        let data = vec![7u8; 100];
        let mut reader = std::io::Cursor::new(data);
        let mut buffer = vec![0u8; 64];

        assert_eq!(fill_buffer(&mut reader, &mut buffer).await.unwrap(), 64);
        assert_eq!(fill_buffer(&mut reader, &mut buffer).await.unwrap(), 36);
        assert_eq!(fill_buffer(&mut reader, &mut buffer).await.unwrap(), 0);
    }

    #[test]
    fn test_unconfigured_blob_store() {
        let store = BlobStore::unconfigured();
        assert!(!store.is_configured());
        assert!(store.active().is_none());
    }
}
