//! Storage setup and initialization

use anyhow::Result;
use demix_core::{Config, StorageBackend};
use demix_storage::{create_storage, Storage};
use std::sync::Arc;

/// Create the configured storage backend.
pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    tracing::info!(backend = %config.storage_backend, "Initializing storage");
    let storage = create_storage(config).await?;

    match storage.backend_type() {
        StorageBackend::S3 => tracing::info!(
            bucket = config.s3_bucket.as_deref().unwrap_or_default(),
            region = config.s3_region.as_deref().unwrap_or_default(),
            endpoint = ?config.s3_endpoint,
            "S3 storage ready"
        ),
        StorageBackend::Local => tracing::info!(
            path = config.local_storage_path.as_deref().unwrap_or_default(),
            "Local storage ready"
        ),
    }

    Ok(storage)
}
