//! # Audio Normalizer
//!
//! Converts any accepted upload into the canonical recognition input:
//! 16 kHz, mono, 16-bit little-endian PCM in a WAV container, band-limited to
//! the speech range and slightly amplified.
//!
//! ## Design:
//! The normalizer decides *what* the output looks like ([`TranscodeJob`]) and
//! *where* it goes; the actual conversion is delegated to a [`Transcoder`]
//! implementation (ffmpeg in production, fakes in tests).
//!
//! ## Processing Chain:
//! ```text
//! input ──► highpass 200 Hz ──► lowpass 8 kHz ──► volume ×1.5 ──► 16 kHz mono s16le WAV
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, error, info};

use super::types::{SpeechFormat, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};

/// Container of the canonical file.
pub const OUTPUT_FORMAT: &str = "wav";

/// Suffix appended to the input stem for the default output name.
pub const OUTPUT_SUFFIX: &str = "speech";

/// Filter chain applied before resampling, in order.
pub const AUDIO_FILTERS: [&str; 3] = ["highpass=f=200", "lowpass=f=8000", "volume=1.5"];

/// Everything a transcoder needs to know about the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: String,
    /// Applied in order as one filter graph
    pub audio_filters: Vec<String>,
    /// Request bit-exact output so identical input yields identical bytes
    pub bitexact: bool,
}

impl TranscodeJob {
    /// The job the normalizer always runs.
    pub fn canonical_speech() -> Self {
        Self {
            format: OUTPUT_FORMAT.to_string(),
            sample_rate: CANONICAL_SAMPLE_RATE,
            channels: CANONICAL_CHANNELS,
            codec: "pcm_s16le".to_string(),
            audio_filters: AUDIO_FILTERS.iter().map(|f| f.to_string()).collect(),
            bitexact: true,
        }
    }
}

/// One progress report from a running conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeProgress {
    /// Output position reached so far, in seconds
    pub out_time_secs: Option<f64>,
    /// Set on the last report of a conversion
    pub finished: bool,
}

/// Optional hooks into a running conversion. All methods default to no-ops.
pub trait TranscodeObserver: Send + Sync {
    fn on_start(&self, _command_line: &str) {}
    fn on_progress(&self, _progress: &TranscodeProgress) {}
    fn on_end(&self, _output: &Path) {}
}

/// Observer that forwards conversion events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl TranscodeObserver for LoggingObserver {
    fn on_start(&self, command_line: &str) {
        info!(command = command_line, "Started audio conversion");
    }

    fn on_progress(&self, progress: &TranscodeProgress) {
        debug!(out_time_secs = ?progress.out_time_secs, finished = progress.finished, "Conversion progress");
    }

    fn on_end(&self, output: &Path) {
        info!(output = %output.display(), "Audio conversion completed");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} did not finish within {seconds}s")]
    TimedOut { program: String, seconds: u64 },

    #[error("conversion reported success but produced no file at {}", .0.display())]
    MissingOutput(PathBuf),
}

/// Something that can turn one audio file into another.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Human-readable program name, used in logs and health output.
    fn name(&self) -> &str;

    /// Whether the transcoder can run at all.
    async fn is_available(&self) -> bool;

    /// Convert `input` into `output` according to `job`.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        job: &TranscodeJob,
        observer: &dyn TranscodeObserver,
    ) -> Result<(), TranscodeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Audio conversion unavailable: transcoder is not installed or not runnable")]
    Unavailable,

    #[error("Invalid input file path: {}", .0.display())]
    InvalidInput(PathBuf),

    #[error("Failed to create output directory {}: {source}", .directory.display())]
    OutputDirectory {
        directory: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Audio conversion failed: {0}")]
    ConversionFailed(#[from] TranscodeError),
}

/// Outcome of a successful normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub output_path: PathBuf,
    pub applied_format: SpeechFormat,
}

/// Produces canonical speech WAV files.
pub struct Normalizer {
    transcoder: Arc<dyn Transcoder>,
    job: TranscodeJob,
    applied_format: SpeechFormat,
}

impl Normalizer {
    /// ## Parameters:
    /// - **transcoder**: conversion backend
    /// - **language_code**: recorded in the reported [`SpeechFormat`]
    pub fn new(transcoder: Arc<dyn Transcoder>, language_code: impl Into<String>) -> Self {
        Self {
            transcoder,
            job: TranscodeJob::canonical_speech(),
            applied_format: SpeechFormat::canonical(language_code),
        }
    }

    pub fn transcoder_name(&self) -> &str {
        self.transcoder.name()
    }

    /// Availability probe; a `false` here means every conversion would fail.
    pub async fn is_available(&self) -> bool {
        self.transcoder.is_available().await
    }

    /// Default output location: `<dir>/<stem>_speech.wav` next to the input.
    pub fn output_path_for(input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        input.with_file_name(format!("{}_{}.{}", stem, OUTPUT_SUFFIX, OUTPUT_FORMAT))
    }

    /// Convert `input` to the canonical format.
    ///
    /// ## Parameters:
    /// - **input**: existing audio file
    /// - **output**: explicit destination, or `None` for [`Self::output_path_for`]
    /// - **observer**: progress hooks, or `None` to log progress
    pub async fn to_canonical_wav(
        &self,
        input: &Path,
        output: Option<&Path>,
        observer: Option<&dyn TranscodeObserver>,
    ) -> Result<ConversionResult, NormalizeError> {
        if input.as_os_str().is_empty() || !fs::try_exists(input).await.unwrap_or(false) {
            error!(input = %input.display(), "Invalid input file path");
            return Err(NormalizeError::InvalidInput(input.to_path_buf()));
        }

        let output_path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::output_path_for(input));

        if let Some(directory) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(directory)
                .await
                .map_err(|source| NormalizeError::OutputDirectory {
                    directory: directory.to_path_buf(),
                    source,
                })?;
        }

        let observer = observer.unwrap_or(&LoggingObserver);
        if let Err(e) = self
            .transcoder
            .transcode(input, &output_path, &self.job, observer)
            .await
        {
            error!(input = %input.display(), error = %e, "Audio conversion failed");
            return Err(e.into());
        }

        Ok(ConversionResult {
            output_path,
            applied_format: self.applied_format.clone(),
        })
    }
}
