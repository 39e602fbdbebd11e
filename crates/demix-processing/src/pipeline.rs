//! Separation request pipeline.
//!
//! stage input → (transcode) → separate → upload stems with retry → clean up.
//! Every local artifact a request creates is tracked in [`RequestArtifacts`] and
//! removed before `run` returns, whatever the outcome.

use demix_core::{AppError, Config, SafeFilename, SeparationMode, Stem, StemDownloads};
use demix_storage::{original_key, stem_key, Storage, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::separation::{DemucsSeparator, SeparationError, Separator, StemSet};
use crate::staging::{validate_upload_extension, AudioInput, AudioStager, ScopedPath, StagingError};
use crate::toolkit::{AudioToolkit, FfmpegToolkit, ToolkitError};

/// Content type of every uploaded stem.
pub const STEM_CONTENT_TYPE: &str = "audio/mpeg";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Toolkit(#[from] ToolkitError),

    #[error(transparent)]
    Separation(#[from] SeparationError),

    #[error("failed to store original file: {0}")]
    OriginalUpload(#[source] StorageError),

    #[error("failed to upload {stem} stem: {source}")]
    StemUpload {
        stem: Stem,
        #[source]
        source: StorageError,
        uploaded: StemDownloads,
    },
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Staging(e) => match e {
                StagingError::MissingInput => AppError::InvalidInput(e.to_string()),
                StagingError::UnsupportedExtension(_) => AppError::UnsupportedFormat(e.to_string()),
                StagingError::TooLarge { .. } => AppError::PayloadTooLarge(e.to_string()),
                StagingError::InvalidName(_) | StagingError::RejectedRedirect(_) => {
                    AppError::InvalidInput(e.to_string())
                }
                StagingError::Fetch(_) => AppError::AudioFetch(e.to_string()),
                StagingError::Directory { .. } | StagingError::Io(_) => {
                    AppError::Internal(e.to_string())
                }
            },
            PipelineError::Toolkit(e) => match e {
                ToolkitError::Unavailable(_) => AppError::MediaToolkitUnavailable(e.to_string()),
                ToolkitError::ConversionFailed(_) | ToolkitError::Io(_) => {
                    AppError::MediaConversion(e.to_string())
                }
            },
            PipelineError::Separation(e) => AppError::Separation(e.to_string()),
            PipelineError::OriginalUpload(e) => AppError::Storage(e.to_string()),
            PipelineError::StemUpload {
                stem,
                source,
                uploaded,
            } => AppError::StemUpload {
                stem: stem.name().to_string(),
                message: source.to_string(),
                uploaded,
            },
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct SeparationOutcome {
    pub downloads: StemDownloads,
    /// Seconds for the whole run
    pub processing_time: f64,
    /// Seconds spent in the separator
    pub separation_time: f64,
    pub original_file: Option<String>,
    pub safe_filename: String,
}

/// Local paths owned by one request.
#[derive(Debug, Default)]
pub struct RequestArtifacts {
    paths: Vec<ScopedPath>,
}

impl RequestArtifacts {
    pub fn track(&mut self, artifact: ScopedPath) -> PathBuf {
        let path = artifact.path().to_path_buf();
        self.paths.push(artifact);
        path
    }

    /// Remove everything tracked, newest first. Safe to call more than once.
    pub async fn cleanup(&mut self) {
        for artifact in self.paths.iter_mut().rev() {
            artifact.cleanup().await;
        }
    }
}

pub struct SeparationPipeline {
    storage: Arc<dyn Storage>,
    toolkit: Arc<dyn AudioToolkit>,
    separator: Arc<dyn Separator>,
    stager: AudioStager,
    retry: RetryPolicy,
    upload_original: bool,
}

impl SeparationPipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        toolkit: Arc<dyn AudioToolkit>,
        separator: Arc<dyn Separator>,
        stager: AudioStager,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            toolkit,
            separator,
            stager,
            retry,
            upload_original: false,
        }
    }

    /// Also store the (possibly transcoded) input under `originals/`.
    pub fn with_original_upload(mut self, enabled: bool) -> Self {
        self.upload_original = enabled;
        self
    }

    /// Wire the production toolkit and Demucs separator from configuration.
    pub fn from_config(config: &Config, storage: Arc<dyn Storage>) -> Result<Self, PipelineError> {
        let toolkit = Arc::new(FfmpegToolkit::new(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
        ));
        let separator = Arc::new(DemucsSeparator::new(
            &config.demucs_command,
            config.demucs_model.clone(),
            config.separated_dir.clone(),
        ));
        let stager = AudioStager::new(
            config.staging_dir.clone(),
            config.max_audio_size_bytes,
            config.url_fetch_timeout,
            config.url_allow_private_hosts,
        )?;
        let retry = RetryPolicy::new(
            config.upload_max_attempts,
            config.upload_initial_backoff,
            config.upload_max_backoff,
        );

        Ok(Self::new(storage, toolkit, separator, stager, retry)
            .with_original_upload(config.upload_original))
    }

    pub fn toolkit(&self) -> &Arc<dyn AudioToolkit> {
        &self.toolkit
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Run one separation request end to end.
    #[tracing::instrument(skip(self, input, mode), fields(mode = %mode, link = input.is_link()))]
    pub async fn run(
        &self,
        input: AudioInput,
        mode: SeparationMode,
    ) -> Result<SeparationOutcome, PipelineError> {
        let start = Instant::now();

        // Cheap input checks come before any subprocess or network work.
        if let AudioInput::Upload { filename, .. } = &input {
            validate_upload_extension(filename)?;
        }
        self.toolkit.ensure_available().await?;

        let mut artifacts = RequestArtifacts::default();
        let result = self.execute(&input, mode, start, &mut artifacts).await;
        artifacts.cleanup().await;

        match &result {
            Ok(outcome) => tracing::info!(
                safe_filename = %outcome.safe_filename,
                stems = outcome.downloads.len(),
                processing_time = outcome.processing_time,
                separation_time = outcome.separation_time,
                "Separation request complete"
            ),
            Err(e) => tracing::warn!(error = %e, "Separation request failed"),
        }
        result
    }

    async fn execute(
        &self,
        input: &AudioInput,
        mode: SeparationMode,
        start: Instant,
        artifacts: &mut RequestArtifacts,
    ) -> Result<SeparationOutcome, PipelineError> {
        let (safe, staged) = self.stager.stage(input).await?;
        let mut input_path = artifacts.track(staged);
        let mut input_name = safe.clone();

        if input.is_link() && safe.extension().as_deref() == Some("m4a") {
            let converted_name = safe.with_extension("mp3");
            let converted_path =
                artifacts.track(ScopedPath::file(input_path.with_file_name(converted_name.as_str())));

            let sample_rate = self.toolkit.probe_sample_rate(&input_path).await;
            self.toolkit
                .convert_to_mp3(&input_path, &converted_path, sample_rate)
                .await?;

            input_path = converted_path;
            input_name = converted_name;
        }

        let original_file = if self.upload_original {
            Some(self.upload_original_file(&input_path, &input_name).await?)
        } else {
            None
        };

        let output_dir = self.separator.output_dir(&input_path)?;
        artifacts.track(ScopedPath::dir(output_dir));

        let separation_start = Instant::now();
        let stem_set = self.separator.separate(&input_path, mode).await?;
        let separation_time = separation_start.elapsed().as_secs_f64();

        let downloads = self.upload_stems(&stem_set, &input_name).await?;

        Ok(SeparationOutcome {
            downloads,
            processing_time: start.elapsed().as_secs_f64(),
            separation_time,
            original_file,
            safe_filename: input_name.to_string(),
        })
    }

    /// Upload stems in order. Stops at the first stem that cannot be stored and
    /// reports the stems that were stored before it.
    async fn upload_stems(
        &self,
        stem_set: &StemSet,
        safe: &SafeFilename,
    ) -> Result<StemDownloads, PipelineError> {
        let mut uploaded = StemDownloads::new();

        for (stem, path) in &stem_set.stems {
            let key = stem_key(stem.name(), safe.as_str());
            let result = self
                .retry
                .run(&key, StorageError::is_retryable, |_| {
                    self.upload_file(&key, path, STEM_CONTENT_TYPE)
                })
                .await;

            match result {
                Ok(url) => {
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        tracing::debug!(path = %path.display(), error = %e, "Stem file already gone");
                    }
                    uploaded.insert(stem.name().to_string(), url);
                }
                Err(source) => {
                    return Err(PipelineError::StemUpload {
                        stem: *stem,
                        source,
                        uploaded,
                    });
                }
            }
        }

        Ok(uploaded)
    }

    async fn upload_original_file(
        &self,
        path: &Path,
        safe: &SafeFilename,
    ) -> Result<String, PipelineError> {
        let key = original_key(safe.as_str());
        let content_type = match safe.extension().as_deref() {
            Some("wav") => "audio/wav",
            _ => STEM_CONTENT_TYPE,
        };

        self.retry
            .run(&key, StorageError::is_retryable, |_| {
                self.upload_file(&key, path, content_type)
            })
            .await
            .map_err(PipelineError::OriginalUpload)
    }

    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(format!("{} was not produced", path.display()))
            } else {
                StorageError::IoError(e)
            }
        })?;

        self.storage.upload_with_key(key, data, content_type).await
    }
}
