//! # Audio Module
//!
//! Turns an arbitrary uploaded audio file into the one format the speech
//! service is fed.
//!
//! ## Key Components:
//! - **Intake Validator**: rejects empty, non-audio, and unparseable uploads
//! - **Normalizer**: converts to canonical speech WAV via a [`Transcoder`]
//! - **ffmpeg Transcoder**: the production [`Transcoder`]
//!
//! ## Canonical Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM, little-endian
//! - **Channels**: Mono (1 channel)
//! - **Container**: WAV
//! - **Filters**: high-pass 200 Hz, low-pass 8 kHz, gain ×1.5

pub mod ffmpeg;       // ffmpeg child-process transcoder
pub mod intake;       // Upload validation and sample-rate sniffing
pub mod normalizer;   // Canonical WAV conversion
pub mod types;        // Shared audio descriptors

pub use ffmpeg::FfmpegTranscoder;
pub use intake::{IntakeError, IntakeValidator};
pub use normalizer::{
    ConversionResult, LoggingObserver, NormalizeError, Normalizer, TranscodeError, TranscodeJob,
    TranscodeObserver, TranscodeProgress, Transcoder,
};
pub use types::{AudioMetadata, EncodingTag, SpeechFormat};
