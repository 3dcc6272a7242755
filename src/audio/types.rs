//! Shared audio descriptors.
//!
//! These types cross module boundaries: the intake validator produces
//! [`AudioMetadata`], the normalizer reports the [`SpeechFormat`] it applied,
//! and the transcriber sends an [`EncodingTag`] to the speech service.

use std::fmt;

use serde::Serialize;

/// Sample rate every canonical file is resampled to.
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Channel count of a canonical file.
pub const CANONICAL_CHANNELS: u16 = 1;

/// Encoding names understood by the speech recognition service.
///
/// ## Serialization:
/// Serialized with the exact upper-case names the service expects
/// (`"LINEAR16"`, `"OGG_OPUS"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EncodingTag {
    #[serde(rename = "OGG_OPUS")]
    OggOpus,
    #[serde(rename = "LINEAR16")]
    Linear16,
    #[serde(rename = "FLAC")]
    Flac,
    #[serde(rename = "MP3")]
    Mp3,
}

impl EncodingTag {
    /// Tag used for any MIME type without a dedicated mapping.
    pub const DEFAULT: EncodingTag = EncodingTag::Mp3;

    /// Map a MIME type to the service encoding.
    ///
    /// ## Mapping:
    /// - `audio/ogg` → OGG_OPUS
    /// - `audio/wav` → LINEAR16
    /// - `audio/flac` → FLAC
    /// - `audio/mpeg`, `audio/mp3` → MP3
    /// - anything else → MP3
    pub fn from_mime_type(mime_type: &str) -> Self {
        match mime_type {
            "audio/ogg" => EncodingTag::OggOpus,
            "audio/wav" => EncodingTag::Linear16,
            "audio/flac" => EncodingTag::Flac,
            "audio/mpeg" | "audio/mp3" => EncodingTag::Mp3,
            _ => Self::DEFAULT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingTag::OggOpus => "OGG_OPUS",
            EncodingTag::Linear16 => "LINEAR16",
            EncodingTag::Flac => "FLAC",
            EncodingTag::Mp3 => "MP3",
        }
    }
}

impl fmt::Display for EncodingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What intake learned about an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMetadata {
    pub encoding: EncodingTag,
    pub sample_rate: u32,
    pub mime_type: String,
}

/// Format of the audio handed to the speech service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechFormat {
    pub encoding: EncodingTag,
    pub sample_rate_hertz: u32,
    pub audio_channel_count: u16,
    pub language_code: String,
}

impl SpeechFormat {
    /// 16 kHz mono LINEAR16, the only format the normalizer produces.
    pub fn canonical(language_code: impl Into<String>) -> Self {
        Self {
            encoding: EncodingTag::Linear16,
            sample_rate_hertz: CANONICAL_SAMPLE_RATE,
            audio_channel_count: CANONICAL_CHANNELS,
            language_code: language_code.into(),
        }
    }
}
