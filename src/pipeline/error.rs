//! Pipeline failure taxonomy.
//!
//! Component errors are kept intact as sources; the pipeline only adds which
//! step they came from.

use crate::audio::{IntakeError, NormalizeError};
use crate::storage::StorageError;
use crate::transcription::TranscriptionError;

use super::stage::RunStage;

/// Failures in the normalize → re-read → transcribe sub-chain.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    ReRead(#[from] StorageError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Persist(StorageError),

    #[error("File processing failed: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Failed to save transcript: {0}")]
    TranscriptSave(StorageError),
}

impl PipelineError {
    /// Last stage the run completed before this failure.
    pub fn failed_at(&self) -> RunStage {
        match self {
            PipelineError::Intake(_) => RunStage::Received,
            PipelineError::Persist(_) => RunStage::Validated,
            PipelineError::Processing(ProcessingError::Normalize(_)) => RunStage::Persisted,
            PipelineError::Processing(ProcessingError::ReRead(_)) => RunStage::Normalized,
            PipelineError::Processing(ProcessingError::Transcription(_)) => RunStage::ReRead,
            PipelineError::TranscriptSave(_) => RunStage::Transcribed,
        }
    }

    /// Whether the upload itself was at fault (as opposed to the service).
    pub fn is_client_error(&self) -> bool {
        match self {
            PipelineError::Intake(_) => true,
            PipelineError::Persist(e) => e.is_client_error(),
            _ => false,
        }
    }
}
