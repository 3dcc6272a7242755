//! # Intake Validation
//!
//! First gate for an upload: is there any data, does the name say "audio",
//! and can the container be parsed far enough to learn its sample rate?
//!
//! ## Checks, in order:
//! 1. **Non-empty**: an empty buffer is rejected before anything else
//! 2. **MIME type**: derived from the file name's extension; must be `audio/*`
//! 3. **Container probe**: symphonia must recognise the container; the default
//!    track's sample rate is reported when the header carries one
//!
//! Validation is pure: nothing is written and no decoder runs past the header.

use std::io::Cursor;
use std::path::Path;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, error};

use super::types::{AudioMetadata, EncodingTag, CANONICAL_SAMPLE_RATE};

/// Prefix every accepted MIME type carries.
pub const AUDIO_MIME_PREFIX: &str = "audio/";

/// Sample rate assumed when the container header does not state one.
pub const DEFAULT_SAMPLE_RATE: u32 = CANONICAL_SAMPLE_RATE;

/// Extension → MIME lookup. Non-audio entries exist so that e.g. `.mp4` is
/// recognised and rejected as video rather than treated as unknown.
const MIME_BY_EXTENSION: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("mpga", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("oga", "audio/ogg"),
    ("opus", "audio/ogg"),
    ("spx", "audio/ogg"),
    ("flac", "audio/flac"),
    ("m4a", "audio/mp4"),
    ("mp4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("weba", "audio/webm"),
    ("aif", "audio/x-aiff"),
    ("aiff", "audio/x-aiff"),
    ("amr", "audio/amr"),
    ("mid", "audio/midi"),
    ("midi", "audio/midi"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
];

/// Look up the MIME type for a file name by its extension (case-insensitive).
pub fn mime_type_for(filename: &str) -> Option<&'static str> {
    let extension = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    MIME_BY_EXTENSION
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

pub fn is_audio_mime(mime_type: &str) -> bool {
    mime_type.starts_with(AUDIO_MIME_PREFIX)
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Empty buffer provided")]
    EmptyBuffer,

    #[error("Invalid audio file format: {filename}")]
    InvalidFormat { filename: String },

    #[error("File validation failed for {filename}: {reason}")]
    ValidationFailed { filename: String, reason: String },
}

/// Stateless upload validator.
#[derive(Debug, Clone, Default)]
pub struct IntakeValidator;

impl IntakeValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate an upload and describe it.
    ///
    /// ## Returns:
    /// - **Ok(AudioMetadata)**: encoding tag from the MIME table, sample rate
    ///   from the container header (16 kHz when absent), and the MIME type
    /// - **Err(IntakeError)**: which check rejected the upload
    pub fn validate(&self, bytes: &[u8], filename: &str) -> Result<AudioMetadata, IntakeError> {
        if bytes.is_empty() {
            return Err(IntakeError::EmptyBuffer);
        }

        let mime_type = match mime_type_for(filename) {
            Some(mime) if is_audio_mime(mime) => mime,
            other => {
                error!(filename, mime_type = ?other, "Invalid audio file format");
                return Err(IntakeError::InvalidFormat {
                    filename: filename.to_string(),
                });
            }
        };

        let extension = Path::new(filename).extension().and_then(|e| e.to_str());
        let sample_rate = probe_sample_rate(bytes, extension).map_err(|reason| {
            error!(filename, %reason, "File validation failed");
            IntakeError::ValidationFailed {
                filename: filename.to_string(),
                reason,
            }
        })?;

        let metadata = AudioMetadata {
            encoding: EncodingTag::from_mime_type(mime_type),
            sample_rate: sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
            mime_type: mime_type.to_string(),
        };

        debug!(filename, ?metadata, "Upload passed intake validation");
        Ok(metadata)
    }
}

/// Parse the container header and return the default track's sample rate.
fn probe_sample_rate(bytes: &[u8], extension: Option<&str>) -> Result<Option<u32>, String> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(&ext.to_ascii_lowercase());
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| e.to_string())?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| "container has no audio track".to_string())?;

    Ok(track.codec_params.sample_rate)
}
