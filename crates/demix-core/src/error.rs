//! Error types module
//!
//! All request failures are unified under `AppError`. Each variant describes its
//! own HTTP presentation through `ErrorMetadata`, so the API layer only has to
//! render what the error says about itself.

use std::io;

use crate::models::StemDownloads;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "SEPARATION_FAILED")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from clients
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Audio fetch failed: {0}")]
    AudioFetch(String),

    #[error("Media toolkit unavailable: {0}")]
    MediaToolkitUnavailable(String),

    #[error("Media conversion error: {0}")]
    MediaConversion(String),

    #[error("Separation failed: {0}")]
    Separation(String),

    #[error("Upload of stem '{stem}' failed: {message}")]
    StemUpload {
        stem: String,
        message: String,
        /// Stems that were stored before the failure
        uploaded: StemDownloads,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::UnsupportedFormat(_) => (
            400,
            "UNSUPPORTED_FORMAT",
            false,
            Some("Upload a wav or mp3 file"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the file URL"),
            false,
            LogLevel::Debug,
        ),
        AppError::Forbidden(_) => (
            403,
            "FORBIDDEN",
            false,
            Some("Check storage credentials and bucket permissions"),
            false,
            LogLevel::Warn,
        ),
        AppError::Storage(_) => (
            500,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::AudioFetch(_) => (
            500,
            "AUDIO_FETCH_FAILED",
            true,
            Some("Check that the link is reachable and retry"),
            false,
            LogLevel::Warn,
        ),
        AppError::MediaToolkitUnavailable(_) => (
            500,
            "MEDIA_TOOLKIT_UNAVAILABLE",
            false,
            Some("Install ffmpeg on the server"),
            true,
            LogLevel::Error,
        ),
        AppError::MediaConversion(_) => (
            500,
            "MEDIA_CONVERSION_ERROR",
            false,
            Some("Try a different file format"),
            false,
            LogLevel::Error,
        ),
        AppError::Separation(_) => (
            500,
            "SEPARATION_FAILED",
            true,
            Some("Retry; contact support if this error persists"),
            false,
            LogLevel::Error,
        ),
        AppError::StemUpload { .. } => (
            500,
            "STEM_UPLOAD_FAILED",
            true,
            Some("Retry after a short delay"),
            false,
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::UnsupportedFormat(_) => "UnsupportedFormat",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::NotFound(_) => "NotFound",
            AppError::Forbidden(_) => "Forbidden",
            AppError::Storage(_) => "Storage",
            AppError::AudioFetch(_) => "AudioFetch",
            AppError::MediaToolkitUnavailable(_) => "MediaToolkitUnavailable",
            AppError::MediaConversion(_) => "MediaConversion",
            AppError::Separation(_) => "Separation",
            AppError::StemUpload { .. } => "StemUpload",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = match self {
            // The display form repeats the client message; details carry the cause only.
            AppError::StemUpload { message, .. } => message.clone(),
            AppError::InvalidInput(msg)
            | AppError::UnsupportedFormat(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::NotFound(msg)
            | AppError::Forbidden(msg)
            | AppError::Storage(msg)
            | AppError::AudioFetch(msg)
            | AppError::MediaToolkitUnavailable(msg)
            | AppError::MediaConversion(msg)
            | AppError::Separation(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::InternalWithSource { message, .. } => message.clone(),
        };

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }

    /// Stems already stored when a later stem failed to upload.
    pub fn uploaded_stems(&self) -> Option<&StemDownloads> {
        match self {
            AppError::StemUpload { uploaded, .. } => Some(uploaded),
            _ => None,
        }
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::UnsupportedFormat(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::NotFound(_) => "File download failed".to_string(),
            AppError::Forbidden(_) => "Storage authentication failed".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::AudioFetch(_) => "Failed to prepare audio file".to_string(),
            AppError::MediaToolkitUnavailable(_) => "Media toolkit is not available".to_string(),
            AppError::MediaConversion(_) => "Failed to convert audio file".to_string(),
            AppError::Separation(_) => "Separation failed".to_string(),
            AppError::StemUpload { ref stem, .. } => {
                format!("Failed to upload {} stem", stem)
            }
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}
