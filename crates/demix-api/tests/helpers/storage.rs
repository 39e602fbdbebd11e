//! Storage wrappers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use demix_storage::{
    s3_object_url, ByteStream, LocalStorage, Storage, StorageBackend, StorageError, StorageResult,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const TEST_BUCKET: &str = "test-bucket";
pub const TEST_REGION: &str = "us-east-1";

/// Local storage that hands out S3 virtual-hosted URLs for `TEST_BUCKET`.
pub struct BucketUrlStorage {
    inner: LocalStorage,
}

impl BucketUrlStorage {
    pub fn new(inner: LocalStorage) -> Self {
        Self { inner }
    }

    fn host_prefixes() -> [String; 2] {
        let host = format!("{}.s3.{}.amazonaws.com/", TEST_BUCKET, TEST_REGION);
        [format!("https://{}", host), format!("https:/{}", host)]
    }
}

#[async_trait]
impl Storage for BucketUrlStorage {
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        self.inner
            .upload_with_key(storage_key, data, content_type)
            .await?;
        Ok(self.object_url(storage_key))
    }

    async fn download_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        self.inner.download_stream(storage_key).await
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.inner.exists(storage_key).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }

    fn object_url(&self, storage_key: &str) -> String {
        s3_object_url(TEST_BUCKET, TEST_REGION, None, storage_key)
    }

    fn resolve_url(&self, file_url: &str) -> StorageResult<String> {
        for prefix in Self::host_prefixes() {
            if let Some(key) = file_url.strip_prefix(&prefix) {
                return self.inner.resolve_url(key);
            }
        }
        if file_url.starts_with("http") {
            return Err(StorageError::PermissionDenied(format!(
                "'{}' is not in bucket {}",
                file_url, TEST_BUCKET
            )));
        }
        self.inner.resolve_url(file_url)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

/// Fails uploads whose key contains `needle`: permanently, or for the first
/// `transient_failures` attempts with a retryable error.
pub struct FlakyStorage {
    inner: Arc<dyn Storage>,
    needle: String,
    transient_failures: Option<u32>,
    pub attempts: AtomicU32,
}

impl FlakyStorage {
    pub fn permanent(inner: Arc<dyn Storage>, needle: &str) -> Self {
        Self {
            inner,
            needle: needle.to_string(),
            transient_failures: None,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn transient(inner: Arc<dyn Storage>, needle: &str, failures: u32) -> Self {
        Self {
            transient_failures: Some(failures),
            ..Self::permanent(inner, needle)
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        if storage_key.contains(&self.needle) {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.transient_failures {
                None => {
                    return Err(StorageError::InvalidKey(format!(
                        "bucket rejected {}",
                        storage_key
                    )))
                }
                Some(failures) if attempt < failures => {
                    return Err(StorageError::UploadFailed("connection reset by peer".to_string()))
                }
                Some(_) => {}
            }
        }
        self.inner
            .upload_with_key(storage_key, data, content_type)
            .await
    }

    async fn download_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        self.inner.download_stream(storage_key).await
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.inner.exists(storage_key).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }

    fn object_url(&self, storage_key: &str) -> String {
        self.inner.object_url(storage_key)
    }

    fn resolve_url(&self, file_url: &str) -> StorageResult<String> {
        self.inner.resolve_url(file_url)
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}
