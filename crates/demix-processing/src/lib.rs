//! Stem separation processing for Demix.
//!
//! Staging request audio, driving the media toolkit and the external separator,
//! and uploading the resulting stems with retry.

pub mod link_policy;
pub mod pipeline;
pub mod retry;
pub mod separation;
pub mod staging;
pub mod toolkit;

pub use pipeline::{
    PipelineError, RequestArtifacts, SeparationOutcome, SeparationPipeline, STEM_CONTENT_TYPE,
};
pub use retry::RetryPolicy;
pub use separation::{DemucsSeparator, SeparationError, Separator, StemSet};
pub use staging::{
    link_filename, validate_upload_extension, AudioInput, AudioStager, ScopedPath, StagingError,
    ALLOWED_UPLOAD_EXTENSIONS,
};
pub use toolkit::{AudioToolkit, FfmpegToolkit, ToolkitError, DEFAULT_SAMPLE_RATE};
