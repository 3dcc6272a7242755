//! # Transcription Module
//!
//! Speech-to-text over the Google Cloud Speech REST API.
//!
//! ## Key Components:
//! - **SpeechRecognizer**: the backend seam; one request in, one response out
//! - **GoogleSpeechClient**: production backend, built once at startup
//! - **Transcriber**: builds requests from settings and folds responses into
//!   a [`TranscriptionResult`]
//!
//! ## Request Defaults:
//! Ukrainian (`uk-UA`) with English and Russian as alternatives, the
//! `latest_long` enhanced model, speaker diarization for 1 to 6 speakers,
//! automatic punctuation, and per-word timings and confidence.

pub mod google;       // REST client
pub mod transcriber;  // Request building and response folding
pub mod types;        // Wire and result types

pub use google::{GoogleSpeechClient, SpeechCredentials};
pub use transcriber::{SpeechApiError, SpeechRecognizer, Transcriber, TranscriptionError};
pub use types::{RecognitionConfig, TranscriptionResult, WordTiming};
