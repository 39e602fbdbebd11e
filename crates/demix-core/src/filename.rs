//! Filename sanitisation and request-unique staging names.

use std::fmt;
use std::path::{Component, Path};

use crate::AppError;

const MAX_FILENAME_LENGTH: usize = 200;

/// Reduce a client supplied filename to a safe basename.
///
/// Only ASCII alphanumerics and `.`, `-`, `_` survive; anything else becomes `_`.
/// Names that try to climb out of a directory are rejected.
pub fn sanitize_filename(filename: &str) -> Result<String, AppError> {
    let path = Path::new(filename);
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(AppError::InvalidInput(
            "Filename contains invalid path traversal".to_string(),
        ));
    }

    let filename_only = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    if filename_only.contains("..") && filename_only.trim_matches('.').is_empty() {
        return Err(AppError::InvalidInput(
            "Filename contains invalid path traversal".to_string(),
        ));
    }

    let sanitized: String = filename_only
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Leading dots go, but a name that was only dots plus an extension keeps it.
    let trimmed = sanitized.trim_start_matches('.');
    let sanitized = match Path::new(&sanitized).extension().and_then(|e| e.to_str()) {
        Some(ext) if !trimmed.contains('.') => format!("audio.{}", ext),
        _ => trimmed.to_string(),
    };
    if sanitized.trim_matches('_').is_empty() {
        return Ok("audio".to_string());
    }

    Ok(sanitized)
}

/// Collision resistant name for one request's input: `{uuid}_{sanitised name}`.
///
/// The same value is used for the staged path and every storage key of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeFilename(String);

impl SafeFilename {
    pub fn new(original: &str) -> Result<Self, AppError> {
        let sanitized = sanitize_filename(original)?;
        Ok(Self(format!("{}_{}", uuid::Uuid::new_v4().simple(), sanitized)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.0)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Filename without its extension; the separation tool names its output folder after it.
    pub fn file_stem(&self) -> &str {
        Path::new(&self.0)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.0)
    }

    /// Same request prefix with a different extension (used for transcoded inputs).
    pub fn with_extension(&self, extension: &str) -> Self {
        Self(format!("{}.{}", self.file_stem(), extension))
    }
}

impl fmt::Display for SafeFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SafeFilename {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
