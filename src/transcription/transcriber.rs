//! # Transcriber
//!
//! Sends canonical audio to a [`SpeechRecognizer`] and folds the response into
//! a single [`TranscriptionResult`].
//!
//! ## Result Folding:
//! - **text**: the top alternative of every result, joined with `\n`
//! - **confidence**: top alternative of the *first* result
//! - **word timings**: from the first result's top alternative, when it
//!   carries words
//!
//! A response with no results, or whose first result has no alternative, is
//! an error rather than an empty transcript.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use super::types::{RecognitionConfig, RecognizeRequest, RecognizeResponse, TranscriptionResult, WordTiming};

/// Transport or service failure while talking to the recognizer.
#[derive(Debug, thiserror::Error)]
pub enum SpeechApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned {status}: {message}")]
    Status { status: u16, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("Speech-to-Text API error: {0}")]
    SpeechApi(#[from] SpeechApiError),

    #[error("No transcription results received")]
    NoTranscriptionResult,
}

/// Speech recognition backend.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self, request: &RecognizeRequest) -> Result<RecognizeResponse, SpeechApiError>;
}

pub struct Transcriber {
    recognizer: Arc<dyn SpeechRecognizer>,
    config: RecognitionConfig,
}

impl Transcriber {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, config: RecognitionConfig) -> Self {
        Self { recognizer, config }
    }

    /// Transcribe canonical (16 kHz mono LINEAR16) audio.
    pub async fn transcribe(&self, audio: &[u8]) -> Result<TranscriptionResult, TranscriptionError> {
        let request = RecognizeRequest::new(self.config.clone(), audio);

        let response = self.recognizer.recognize(&request).await.map_err(|e| {
            error!(error = %e, "Speech-to-Text API error");
            TranscriptionError::SpeechApi(e)
        })?;

        let result = fold_response(response)?;
        info!(
            chars = result.text.chars().count(),
            confidence = ?result.confidence,
            "Transcription completed"
        );
        Ok(result)
    }
}

/// Collapse a recognizer response into one result.
pub fn fold_response(response: RecognizeResponse) -> Result<TranscriptionResult, TranscriptionError> {
    let first = response
        .results
        .first()
        .and_then(|r| r.alternatives.first())
        .ok_or(TranscriptionError::NoTranscriptionResult)?;

    let confidence = first.confidence;
    let word_timings = (!first.words.is_empty())
        .then(|| first.words.iter().map(WordTiming::from).collect::<Vec<_>>());

    // Later results without an alternative contribute nothing
    let text = response
        .results
        .iter()
        .filter_map(|r| r.alternatives.first())
        .map(|a| a.transcript.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(TranscriptionResult {
        text,
        confidence,
        word_timings,
    })
}
