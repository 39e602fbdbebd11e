use crate::keys::{s3_object_url, split_http_url, validate_key};
use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};

/// Key probed by the health check; it does not need to exist.
const HEALTH_PROBE_KEY: &str = "stems/.health-probe";

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// Credentials come from the standard AWS environment chain.
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region, also used to build public URLs
    /// * `endpoint_url` - Optional custom endpoint for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub fn new(bucket: String, region: String, endpoint_url: Option<String>) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket,
            region,
            endpoint_url,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn map_object_store_error(err: ObjectStoreError, storage_key: &str, upload: bool) -> StorageError {
    match err {
        ObjectStoreError::NotFound { .. } => StorageError::NotFound(storage_key.to_string()),
        ObjectStoreError::PermissionDenied { .. } | ObjectStoreError::Unauthenticated { .. } => {
            StorageError::PermissionDenied(err.to_string())
        }
        other if upload => StorageError::UploadFailed(other.to_string()),
        other => StorageError::DownloadFailed(other.to_string()),
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        validate_key(storage_key)?;

        let size = data.len() as u64;
        let location = Path::from(storage_key.to_string());
        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(Bytes::from(data)), opts)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %storage_key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            map_object_store_error(e, storage_key, true)
        })?;

        let url = self.object_url(storage_key);

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(url)
    }

    async fn download_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        validate_key(storage_key)?;

        let start = std::time::Instant::now();
        let location = Path::from(storage_key.to_string());

        let result: ObjectResult<_> = self.store.get(&location).await;
        let result = result.map_err(|e| {
            tracing::warn!(
                error = %e,
                bucket = %self.bucket,
                key = %storage_key,
                "S3 download failed"
            );
            map_object_store_error(e, storage_key, false)
        })?;

        let bucket = self.bucket.clone();
        let key = storage_key.to_string();

        let stream = result.into_stream().map(move |res| match res {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::error!(
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream download error"
                );
                Err(StorageError::DownloadFailed(e.to_string()))
            }
        });

        Ok(Box::pin(stream))
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        validate_key(storage_key)?;
        let location = Path::from(storage_key.to_string());
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(map_object_store_error(e, storage_key, false)),
        }
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.exists(HEALTH_PROBE_KEY).await.map(|_| ())
    }

    fn object_url(&self, storage_key: &str) -> String {
        s3_object_url(
            &self.bucket,
            &self.region,
            self.endpoint_url.as_deref(),
            storage_key,
        )
    }

    fn resolve_url(&self, file_url: &str) -> StorageResult<String> {
        let key = match split_http_url(file_url) {
            None => file_url.trim_start_matches('/').to_string(),
            Some((host, path)) => {
                let endpoint_host = self
                    .endpoint_url
                    .as_deref()
                    .and_then(split_http_url)
                    .map(|(host, _)| host);

                if endpoint_host == Some(host) {
                    // Path-style: {endpoint}/{bucket}/{key}
                    let (bucket, key) = path.split_once('/').unwrap_or((path, ""));
                    if bucket != self.bucket {
                        return Err(StorageError::PermissionDenied(format!(
                            "Bucket '{}' is not served by this service",
                            bucket
                        )));
                    }
                    key.to_string()
                } else {
                    // Virtual-hosted: {bucket}.s3.{region}.amazonaws.com/{key}
                    let bucket = host.split('.').next().unwrap_or_default();
                    if bucket != self.bucket {
                        return Err(StorageError::PermissionDenied(format!(
                            "Bucket '{}' is not served by this service",
                            bucket
                        )));
                    }
                    path.to_string()
                }
            }
        };

        validate_key(&key)?;
        Ok(key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
