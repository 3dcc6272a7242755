//! Wire types for the speech recognition REST API, plus the result the
//! pipeline reports.
//!
//! Request types serialize to the service's camelCase JSON. Response types
//! deserialize leniently: every field the service may omit has a default.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::audio::types::{EncodingTag, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};
use crate::config::SpeechConfig;

/// Recognition settings sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfig {
    pub encoding: EncodingTag,
    pub sample_rate_hertz: u32,
    pub audio_channel_count: u16,
    pub language_code: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternative_language_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub use_enhanced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diarization_config: Option<DiarizationConfig>,
    pub enable_automatic_punctuation: bool,
    pub enable_word_time_offsets: bool,
    pub enable_word_confidence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RecognitionMetadata>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub speech_contexts: Vec<SpeechContext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiarizationConfig {
    pub enable_speaker_diarization: bool,
    pub min_speaker_count: u32,
    pub max_speaker_count: u32,
}

/// Hints about how the audio was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionMetadata {
    pub microphone_distance: String,
    pub original_media_type: String,
    pub recording_device_type: String,
    pub interaction_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechContext {
    pub phrases: Vec<String>,
    pub boost: f32,
}

impl RecognitionConfig {
    /// Build the request config for canonical audio from service settings.
    ///
    /// Encoding, sample rate, and channel count are fixed: the pipeline only
    /// ever sends what the normalizer produced.
    pub fn from_settings(settings: &SpeechConfig) -> Self {
        let diarization_config = settings.enable_diarization.then(|| DiarizationConfig {
            enable_speaker_diarization: true,
            min_speaker_count: settings.min_speaker_count,
            max_speaker_count: settings.max_speaker_count,
        });

        Self {
            encoding: EncodingTag::Linear16,
            sample_rate_hertz: CANONICAL_SAMPLE_RATE,
            audio_channel_count: CANONICAL_CHANNELS,
            language_code: settings.language_code.clone(),
            alternative_language_codes: settings.alternative_language_codes.clone(),
            model: settings.model.clone().filter(|m| !m.is_empty()),
            use_enhanced: settings.use_enhanced,
            diarization_config,
            enable_automatic_punctuation: settings.enable_automatic_punctuation,
            enable_word_time_offsets: settings.enable_word_time_offsets,
            enable_word_confidence: settings.enable_word_confidence,
            metadata: Some(RecognitionMetadata {
                microphone_distance: settings.microphone_distance.clone(),
                original_media_type: settings.original_media_type.clone(),
                recording_device_type: settings.recording_device_type.clone(),
                interaction_type: settings.interaction_type.clone(),
            }),
            speech_contexts: vec![SpeechContext {
                phrases: settings.phrases.clone(),
                boost: settings.phrase_boost,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionAudio {
    /// Base64 of the raw audio bytes
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognizeRequest {
    pub config: RecognitionConfig,
    pub audio: RecognitionAudio,
}

impl RecognizeRequest {
    pub fn new(config: RecognitionConfig, audio: &[u8]) -> Self {
        Self {
            config,
            audio: RecognitionAudio {
                content: BASE64.encode(audio),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeResponse {
    #[serde(default)]
    pub results: Vec<SpeechRecognitionResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRecognitionResult {
    #[serde(default)]
    pub alternatives: Vec<SpeechAlternative>,
    #[serde(default)]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechAlternative {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub words: Vec<WordInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordInfo {
    #[serde(default)]
    pub word: String,
    /// Duration string such as `"1.500s"`
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub speaker_tag: Option<i32>,
}

/// Timing of one recognised word, in seconds from the start of the audio.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordTiming {
    pub word: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_tag: Option<i32>,
}

impl From<&WordInfo> for WordTiming {
    fn from(info: &WordInfo) -> Self {
        Self {
            word: info.word.clone(),
            start_time: parse_duration_secs(info.start_time.as_deref()),
            end_time: parse_duration_secs(info.end_time.as_deref()),
            speaker_tag: info.speaker_tag,
        }
    }
}

/// Final transcription of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionResult {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_timings: Option<Vec<WordTiming>>,
}

/// Parse a protobuf JSON duration (`"1.500s"`) into seconds; missing or
/// malformed values count as zero.
pub fn parse_duration_secs(value: Option<&str>) -> f64 {
    value
        .map(|v| v.trim().trim_end_matches('s'))
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}
