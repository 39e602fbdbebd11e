//! Demix Core Library
//!
//! This crate provides the domain models, error types and configuration
//! shared by the storage, processing and API crates.

pub mod config;
pub mod error;
pub mod filename;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use filename::{sanitize_filename, SafeFilename};
pub use models::{SeparationMode, SeparationResponse, Stem, StemDownloads};
pub use storage_types::StorageBackend;
