//! Stand-ins for the external media toolkit and separator.

#![allow(dead_code)]

use async_trait::async_trait;
use demix_core::SeparationMode;
use demix_processing::{AudioToolkit, SeparationError, Separator, StemSet, ToolkitError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Toolkit that never spawns a process; conversion copies the input.
pub struct FakeToolkit {
    pub available: bool,
    pub ensure_calls: AtomicU32,
    pub conversions: AtomicU32,
}

impl FakeToolkit {
    pub fn new(available: bool) -> Self {
        Self {
            available,
            ensure_calls: AtomicU32::new(0),
            conversions: AtomicU32::new(0),
        }
    }

    pub fn ensure_calls(&self) -> u32 {
        self.ensure_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioToolkit for FakeToolkit {
    async fn ensure_available(&self) -> Result<(), ToolkitError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if self.available {
            Ok(())
        } else {
            Err(ToolkitError::Unavailable("ffmpeg: No such file or directory".to_string()))
        }
    }

    async fn probe_sample_rate(&self, _input: &Path) -> u32 {
        44_100
    }

    async fn convert_to_mp3(
        &self,
        input: &Path,
        output: &Path,
        _sample_rate: u32,
    ) -> Result<(), ToolkitError> {
        self.conversions.fetch_add(1, Ordering::SeqCst);
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

/// Separator that writes one small file per stem, named by convention.
pub struct FakeSeparator {
    pub root: PathBuf,
    pub fail: bool,
    pub calls: AtomicU32,
}

impl FakeSeparator {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            fail: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(root: PathBuf) -> Self {
        Self {
            fail: true,
            ..Self::new(root)
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Separator for FakeSeparator {
    fn output_dir(&self, input: &Path) -> Result<PathBuf, SeparationError> {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SeparationError::InvalidInput(input.to_path_buf()))?;
        Ok(self.root.join("htdemucs").join(stem))
    }

    async fn separate(&self, input: &Path, mode: SeparationMode) -> Result<StemSet, SeparationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let dir = self.output_dir(input)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| SeparationError::Spawn {
                command: "fake-separator".to_string(),
                source,
            })?;

        let set = StemSet::from_convention(dir, mode);
        for (stem, path) in &set.stems {
            tokio::fs::write(path, stem.name())
                .await
                .map_err(|source| SeparationError::Spawn {
                    command: "fake-separator".to_string(),
                    source,
                })?;
        }

        if self.fail {
            return Err(SeparationError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "RuntimeError: CUDA out of memory".to_string(),
            });
        }
        Ok(set)
    }
}
