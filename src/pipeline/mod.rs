//! # Pipeline Module
//!
//! Ties validation, storage, normalization, and transcription into one run
//! with guaranteed cleanup of temporary files.

pub mod error;    // PipelineError / ProcessingError
pub mod runner;   // AudioPipeline orchestrator
pub mod stage;    // Run stages and tracker

pub use error::{PipelineError, ProcessingError};
pub use runner::{AudioPipeline, OriginalFileInfo, PipelineOutcome, UploadedAudio};
pub use stage::{RunStage, RunTracker};
