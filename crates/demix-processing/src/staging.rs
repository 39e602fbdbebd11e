//! Audio staging: turn an uploaded blob or a remote link into a local file
//! owned by exactly one request.

use crate::link_policy::redirect_policy;
use bytes::Bytes;
use demix_core::SafeFilename;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Extensions accepted for uploaded files.
pub const ALLOWED_UPLOAD_EXTENSIONS: &[&str] = &["wav", "mp3"];

/// Extensions recognised on remote links; anything else is staged as mp3.
const RECOGNISED_LINK_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a"];

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("No audio file or link provided")]
    MissingInput,

    #[error("File type not allowed: {0}")]
    UnsupportedExtension(String),

    #[error("Audio exceeds maximum size of {limit_bytes} bytes")]
    TooLarge { limit_bytes: usize },

    #[error("Invalid filename: {0}")]
    InvalidName(String),

    #[error("Failed to create staging directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch audio: {0}")]
    Fetch(String),

    #[error("Link redirect rejected: {0}")]
    RejectedRedirect(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request input before staging.
#[derive(Debug, Clone)]
pub enum AudioInput {
    Upload { filename: String, data: Bytes },
    Link(String),
}

impl AudioInput {
    pub fn is_link(&self) -> bool {
        matches!(self, AudioInput::Link(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    File,
    Dir,
}

/// A local path that is removed when the request is done with it.
///
/// `cleanup` removes it asynchronously and is safe to call repeatedly; `Drop`
/// removes anything still present when the owner unwinds without cleaning up.
#[derive(Debug)]
pub struct ScopedPath {
    path: PathBuf,
    kind: PathKind,
    released: bool,
}

impl ScopedPath {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: PathKind::File,
            released: false,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: PathKind::Dir,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn cleanup(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let result = match self.kind {
            PathKind::File => fs::remove_file(&self.path).await,
            PathKind::Dir => fs::remove_dir_all(&self.path).await,
        };
        match result {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed request artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove request artifact")
            }
        }
    }
}

impl Drop for ScopedPath {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let _ = match self.kind {
            PathKind::File => std::fs::remove_file(&self.path),
            PathKind::Dir => std::fs::remove_dir_all(&self.path),
        };
    }
}

/// Lowercased extension of a filename or URL path.
fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Reject uploaded filenames whose extension is not wav or mp3.
pub fn validate_upload_extension(filename: &str) -> Result<(), StagingError> {
    match extension_of(filename) {
        Some(ext) if ALLOWED_UPLOAD_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(StagingError::UnsupportedExtension(format!(
            "'{}' (allowed: {})",
            filename,
            ALLOWED_UPLOAD_EXTENSIONS.join(", ")
        ))),
    }
}

/// Filename to stage a link under: the last path segment with a recognised
/// extension, or `.mp3` appended/substituted otherwise.
pub fn link_filename(url: &str) -> String {
    let path = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url)
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let segment = path
        .split_once('/')
        .map(|(_, p)| p)
        .unwrap_or_default()
        .rsplit('/')
        .next()
        .unwrap_or_default();

    let stem = Path::new(segment)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("audio");

    match extension_of(segment) {
        Some(ext) if RECOGNISED_LINK_EXTENSIONS.contains(&ext.as_str()) => {
            format!("{}.{}", stem, ext)
        }
        _ => format!("{}.mp3", stem),
    }
}

/// Writes request input into the staging directory.
///
/// Link redirects to private or internal addresses are refused unless
/// `allow_private_hosts` is set.
#[derive(Clone)]
pub struct AudioStager {
    staging_dir: PathBuf,
    http: reqwest::Client,
    max_bytes: usize,
}

impl AudioStager {
    pub fn new(
        staging_dir: PathBuf,
        max_bytes: usize,
        fetch_timeout: Duration,
        allow_private_hosts: bool,
    ) -> Result<Self, StagingError> {
        let http = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .redirect(redirect_policy(allow_private_hosts))
            .build()
            .map_err(|e| StagingError::Fetch(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            staging_dir,
            http,
            max_bytes,
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    async fn ensure_dir(&self) -> Result<(), StagingError> {
        fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|source| StagingError::Directory {
                path: self.staging_dir.clone(),
                source,
            })
    }

    /// Stage request input and return its request-unique name plus the owning guard.
    pub async fn stage(&self, input: &AudioInput) -> Result<(SafeFilename, ScopedPath), StagingError> {
        match input {
            AudioInput::Upload { filename, data } => self.stage_upload(filename, data).await,
            AudioInput::Link(url) => self.stage_link(url).await,
        }
    }

    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn stage_upload(
        &self,
        filename: &str,
        data: &Bytes,
    ) -> Result<(SafeFilename, ScopedPath), StagingError> {
        validate_upload_extension(filename)?;
        if data.len() > self.max_bytes {
            return Err(StagingError::TooLarge {
                limit_bytes: self.max_bytes,
            });
        }

        let safe = SafeFilename::new(filename)
            .map_err(|e| StagingError::InvalidName(e.to_string()))?;
        self.ensure_dir().await?;

        let staged = ScopedPath::file(self.staging_dir.join(safe.as_str()));
        fs::write(staged.path(), data).await?;

        tracing::info!(path = %staged.path().display(), "Staged uploaded audio");
        Ok((safe, staged))
    }

    #[tracing::instrument(skip(self))]
    pub async fn stage_link(&self, url: &str) -> Result<(SafeFilename, ScopedPath), StagingError> {
        let start = std::time::Instant::now();
        let safe = SafeFilename::new(&link_filename(url))
            .map_err(|e| StagingError::InvalidName(e.to_string()))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| {
                if e.is_redirect() {
                    let reason = std::error::Error::source(&e)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| e.to_string());
                    StagingError::RejectedRedirect(reason)
                } else {
                    StagingError::Fetch(e.to_string())
                }
            })?
            .error_for_status()
            .map_err(|e| StagingError::Fetch(e.to_string()))?;

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(StagingError::TooLarge {
                    limit_bytes: self.max_bytes,
                });
            }
        }

        self.ensure_dir().await?;
        // Guarded before the first write; a partial download never outlives the request.
        let staged = ScopedPath::file(self.staging_dir.join(safe.as_str()));
        let mut file = fs::File::create(staged.path()).await?;

        let mut written: usize = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StagingError::Fetch(e.to_string()))?;
            written += chunk.len();
            if written > self.max_bytes {
                return Err(StagingError::TooLarge {
                    limit_bytes: self.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::info!(
            path = %staged.path().display(),
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Staged linked audio"
        );
        Ok((safe, staged))
    }
}
