//! Separation invocation: run the external Demucs CLI once per request and
//! locate its stems by the tool's output naming convention.

use async_trait::async_trait;
use demix_core::{SeparationMode, Stem};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

use crate::toolkit::tail;

#[derive(Debug, Error)]
pub enum SeparationError {
    #[error("failed to start separation command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("separation exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("staged input has no usable file name: {0}")]
    InvalidInput(PathBuf),
}

/// Stem name to local output file, in upload order.
///
/// Paths are derived from the tool's naming convention and are not checked;
/// a stem the tool did not write surfaces when it is read for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemSet {
    pub output_dir: PathBuf,
    pub stems: Vec<(Stem, PathBuf)>,
}

impl StemSet {
    pub fn from_convention(output_dir: PathBuf, mode: SeparationMode) -> Self {
        let stems = mode
            .stems()
            .iter()
            .map(|stem| (*stem, output_dir.join(stem.output_file_name())))
            .collect();
        Self { output_dir, stems }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stems.iter().map(|(stem, _)| stem.name()).collect()
    }
}

/// External separation routine.
#[async_trait]
pub trait Separator: Send + Sync {
    /// Directory the routine will write stems for `input` into.
    ///
    /// Known before running so the caller can own it even if separation fails halfway.
    fn output_dir(&self, input: &Path) -> Result<PathBuf, SeparationError>;

    /// Separate `input`, blocking until the routine finishes.
    async fn separate(&self, input: &Path, mode: SeparationMode) -> Result<StemSet, SeparationError>;
}

/// Runs the `demucs` command line tool.
pub struct DemucsSeparator {
    program: String,
    leading_args: Vec<String>,
    model: String,
    output_root: PathBuf,
}

impl DemucsSeparator {
    /// `command` may carry leading arguments, e.g. `python3 -m demucs`.
    pub fn new(command: &str, model: String, output_root: PathBuf) -> Self {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next().unwrap_or_else(|| "demucs".to_string());
        Self {
            program,
            leading_args: parts.collect(),
            model,
            output_root,
        }
    }

    /// Arguments after the program name.
    pub fn build_args(&self, input: &Path, mode: SeparationMode) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.push("--mp3".to_string());
        if mode == SeparationMode::TwoStems {
            args.extend(["--two-stems".to_string(), "vocals".to_string()]);
        }
        args.extend([
            "-n".to_string(),
            self.model.clone(),
            "-o".to_string(),
            self.output_root.to_string_lossy().to_string(),
            input.to_string_lossy().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl Separator for DemucsSeparator {
    fn output_dir(&self, input: &Path) -> Result<PathBuf, SeparationError> {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SeparationError::InvalidInput(input.to_path_buf()))?;
        Ok(self.output_root.join(&self.model).join(stem))
    }

    #[tracing::instrument(skip(self, input, mode), fields(input = %input.display(), mode = %mode, model = %self.model))]
    async fn separate(&self, input: &Path, mode: SeparationMode) -> Result<StemSet, SeparationError> {
        let output_dir = self.output_dir(input)?;
        let args = self.build_args(input, mode);
        let start = std::time::Instant::now();

        tracing::info!(program = %self.program, "Starting separation");

        // kill_on_drop stops inference when the request future is dropped.
        let output = Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SeparationError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SeparationError::Failed {
                status: output.status.to_string(),
                stderr: tail(&stderr, 2000),
            });
        }

        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            output_dir = %output_dir.display(),
            "Separation finished"
        );

        Ok(StemSet::from_convention(output_dir, mode))
    }
}
