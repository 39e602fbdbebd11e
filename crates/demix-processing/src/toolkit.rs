//! Media toolkit (ffmpeg / ffprobe) used around separation.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::process::Command;

/// Sample rate assumed when ffprobe cannot tell.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Error)]
pub enum ToolkitError {
    #[error("ffmpeg is not available: {0}")]
    Unavailable(String),

    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations the pipeline needs from an external media toolkit.
#[async_trait]
pub trait AudioToolkit: Send + Sync {
    /// Fail unless the toolkit can be executed.
    async fn ensure_available(&self) -> Result<(), ToolkitError>;

    /// Sample rate of the first audio stream, or [`DEFAULT_SAMPLE_RATE`].
    async fn probe_sample_rate(&self, input: &Path) -> u32;

    /// Transcode `input` to a 320k mp3 at `sample_rate`.
    async fn convert_to_mp3(
        &self,
        input: &Path,
        output: &Path,
        sample_rate: u32,
    ) -> Result<(), ToolkitError>;
}

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    sample_rate: Option<String>,
}

/// Extract the first audio stream's sample rate from `ffprobe -print_format json` output.
pub fn parse_sample_rate(ffprobe_json: &[u8]) -> Option<u32> {
    let probe: FFprobeOutput = serde_json::from_slice(ffprobe_json).ok()?;
    probe
        .streams?
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .and_then(|s| s.sample_rate.as_deref())
        .and_then(|rate| rate.trim().parse().ok())
        .filter(|rate| *rate > 0)
}

/// `AudioToolkit` backed by the ffmpeg and ffprobe executables.
pub struct FfmpegToolkit {
    ffmpeg_path: String,
    ffprobe_path: String,
    verified: AtomicBool,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg_path: String, ffprobe_path: String) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            verified: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AudioToolkit for FfmpegToolkit {
    async fn ensure_available(&self) -> Result<(), ToolkitError> {
        if self.verified.load(Ordering::Relaxed) {
            return Ok(());
        }

        let status = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ToolkitError::Unavailable(format!("{}: {}", self.ffmpeg_path, e)))?;

        if !status.success() {
            return Err(ToolkitError::Unavailable(format!(
                "{} -version exited with {}",
                self.ffmpeg_path, status
            )));
        }

        self.verified.store(true, Ordering::Relaxed);
        tracing::debug!(ffmpeg = %self.ffmpeg_path, "ffmpeg is available");
        Ok(())
    }

    #[tracing::instrument(skip(self, input), fields(input = %input.display()))]
    async fn probe_sample_rate(&self, input: &Path) -> u32 {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(input)
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                parse_sample_rate(&output.stdout).unwrap_or_else(|| {
                    tracing::warn!("No audio sample rate reported, using default");
                    DEFAULT_SAMPLE_RATE
                })
            }
            Ok(output) => {
                tracing::warn!(status = %output.status, "ffprobe failed, using default sample rate");
                DEFAULT_SAMPLE_RATE
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to run ffprobe, using default sample rate");
                DEFAULT_SAMPLE_RATE
            }
        }
    }

    #[tracing::instrument(skip(self, input, output), fields(input = %input.display(), output = %output.display()))]
    async fn convert_to_mp3(
        &self,
        input: &Path,
        output: &Path,
        sample_rate: u32,
    ) -> Result<(), ToolkitError> {
        let start = std::time::Instant::now();

        let result = Command::new(&self.ffmpeg_path)
            .arg("-i")
            .arg(input)
            .args(["-acodec", "libmp3lame", "-ab", "320k", "-ar"])
            .arg(sample_rate.to_string())
            .arg("-y")
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ToolkitError::ConversionFailed(tail(&stderr, 2000)));
        }

        tracing::info!(
            sample_rate,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Converted audio to mp3"
        );
        Ok(())
    }
}

/// Last `max_chars` characters of process output.
pub(crate) fn tail(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}
