//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::io::ErrorKind;
use std::pin::Pin;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether repeating the same operation may succeed.
    ///
    /// Transport and backend failures, timeouts and permission denials are
    /// transient. Missing objects, bad keys and configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::UploadFailed(_)
            | StorageError::DownloadFailed(_)
            | StorageError::PermissionDenied(_)
            | StorageError::BackendError(_) => true,
            StorageError::IoError(err) => matches!(
                err.kind(),
                ErrorKind::PermissionDenied
                    | ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
            ),
            StorageError::NotFound(_)
            | StorageError::InvalidKey(_)
            | StorageError::ConfigError(_) => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Streamed object body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) implement this trait so the
/// separation pipeline and the download proxy never depend on a concrete backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload data under a specific key and return its public URL.
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String>;

    /// Download an object as a stream of chunks.
    async fn download_stream(&self, storage_key: &str) -> StorageResult<ByteStream>;

    /// Check if an object exists
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Verify that the backend is reachable with the configured credentials.
    async fn health_check(&self) -> StorageResult<()>;

    /// Public URL for a key.
    fn object_url(&self, storage_key: &str) -> String;

    /// Map a URL previously returned by [`Storage::object_url`] (or a bare key)
    /// back to the storage key.
    ///
    /// URLs that point at another bucket yield `PermissionDenied`.
    fn resolve_url(&self, file_url: &str) -> StorageResult<String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
