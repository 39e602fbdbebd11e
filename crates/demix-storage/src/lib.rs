//! Demix Storage Library
//!
//! Storage abstraction for separated stems, with an S3 implementation for
//! production and a local filesystem implementation for development and tests.
//!
//! # Storage key format
//!
//! - **Stems**: `stems/{stem}_{safe_filename}`
//! - **Original inputs**: `originals/{safe_filename}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation lives in the
//! `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use demix_core::StorageBackend;
pub use factory::create_storage;
pub use keys::{original_key, s3_object_url, stem_key};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
