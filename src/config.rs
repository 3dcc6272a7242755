//! # Configuration Management
//!
//! This module loads application configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: derive `Serialize`/`Deserialize` so the `config` crate can
//!   layer sources on top of our defaults
//! - **#[serde(default)]**: a section missing from config.toml falls back to
//!   its `Default` impl instead of failing
//! - **Option<T>**: secrets such as the API key are simply absent when unset
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Well-known variables: HOST, PORT, GOOGLE_API_KEY, GOOGLE_ACCESS_TOKEN
//! 2. Environment variables (APP_SERVER__PORT, APP_SPEECH__LANGUAGE_CODE, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impls)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::storage::file_store::DEFAULT_DIRECTORY;
use crate::storage::transcript::DEFAULT_TRANSCRIPT_PATH;

/// Largest accepted upload (10 MiB).
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Main application configuration.
///
/// ## Sections:
/// - **server**: where to listen
/// - **upload**: multipart field name and size limit
/// - **storage**: temporary directory, transcript location, and sweeps
/// - **normalizer**: ffmpeg binary and time limit
/// - **speech**: speech recognition service and request defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub storage: StorageConfig,
    pub normalizer: NormalizerConfig,
    pub speech: SpeechConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Upload handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Multipart field carrying the audio file
    pub field_name: String,
    /// Uploads larger than this are rejected with 413
    pub max_file_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            field_name: "audio".to_string(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

/// Local storage locations and maintenance sweeps.
///
/// ## Sweeps:
/// Every `sweep_interval_secs` the temporary directory is scanned and files
/// older than `sweep_max_age_secs` are removed. This only catches leftovers of
/// crashed processes; normal runs clean up after themselves. An interval of 0
/// disables the sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub temp_dir: String,
    pub transcript_path: String,
    pub sweep_interval_secs: u64,
    pub sweep_max_age_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: DEFAULT_DIRECTORY.to_string(),
            transcript_path: DEFAULT_TRANSCRIPT_PATH.to_string(),
            sweep_interval_secs: 3600,
            sweep_max_age_secs: 24 * 3600,
        }
    }
}

impl StorageConfig {
    pub fn sweep_interval(&self) -> Option<Duration> {
        non_zero_secs(self.sweep_interval_secs)
    }

    pub fn sweep_max_age(&self) -> Duration {
        Duration::from_secs(self.sweep_max_age_secs)
    }
}

/// Audio normalizer (ffmpeg) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Binary name or path
    pub ffmpeg_path: String,
    /// Upper bound for one conversion; 0 = unlimited
    pub timeout_secs: u64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            timeout_secs: 0,
        }
    }
}

impl NormalizerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        non_zero_secs(self.timeout_secs)
    }
}

/// Speech recognition service settings.
///
/// ## Credentials:
/// Set either `api_key` (or GOOGLE_API_KEY) or `access_token`
/// (or GOOGLE_ACCESS_TOKEN). The key wins when both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub language_code: String,
    pub alternative_language_codes: Vec<String>,
    pub model: Option<String>,
    pub use_enhanced: bool,
    pub enable_diarization: bool,
    pub min_speaker_count: u32,
    pub max_speaker_count: u32,
    pub enable_automatic_punctuation: bool,
    pub enable_word_time_offsets: bool,
    pub enable_word_confidence: bool,
    pub microphone_distance: String,
    pub original_media_type: String,
    pub recording_device_type: String,
    pub interaction_type: String,
    /// Phrase hints sent as one speech context
    pub phrases: Vec<String>,
    pub phrase_boost: f32,
    /// 0 = no client-side timeout
    pub request_timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://speech.googleapis.com".to_string(),
            api_key: None,
            access_token: None,
            language_code: "uk-UA".to_string(),
            alternative_language_codes: vec!["en-US".to_string(), "ru-RU".to_string()],
            model: Some("latest_long".to_string()),
            use_enhanced: true,
            enable_diarization: true,
            min_speaker_count: 1,
            max_speaker_count: 6,
            enable_automatic_punctuation: true,
            enable_word_time_offsets: true,
            enable_word_confidence: true,
            microphone_distance: "NEARFIELD".to_string(),
            original_media_type: "AUDIO".to_string(),
            recording_device_type: "SMARTPHONE".to_string(),
            interaction_type: "DISCUSSION".to_string(),
            phrases: Vec::new(),
            phrase_boost: 20.0,
            request_timeout_secs: 0,
        }
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl AppConfig {
    /// Load configuration from every source in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_STORAGE__TEMP_DIR=/var/tmp/voice`: Override the temp directory
    /// - `APP_SPEECH__ALTERNATIVE_LANGUAGE_CODES=en-US,pl-PL`: Lists are comma separated
    /// - `HOST`, `PORT`: Special cases for deployment platforms
    /// - `GOOGLE_API_KEY`, `GOOGLE_ACCESS_TOKEN`: Speech credentials
    ///
    /// Nested keys use a double underscore so that field names containing a
    /// single underscore (`temp_dir`) survive the mapping.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("speech.alternative_language_codes")
                    .with_list_parse_key("speech.phrases"),
            );

        let overrides = [
            ("HOST", "server.host"),
            ("PORT", "server.port"),
            ("GOOGLE_API_KEY", "speech.api_key"),
            ("GOOGLE_ACCESS_TOKEN", "speech.access_token"),
        ];
        for (variable, key) in overrides {
            if let Ok(value) = env::var(variable) {
                settings = settings.set_override(key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.upload.field_name.trim().is_empty() {
            return Err(anyhow::anyhow!("Upload field name cannot be empty"));
        }

        if self.upload.max_file_bytes == 0 {
            return Err(anyhow::anyhow!("Maximum upload size must be greater than 0"));
        }

        if self.storage.temp_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("Temporary directory cannot be empty"));
        }

        if self.storage.transcript_path.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcript path cannot be empty"));
        }

        if self.normalizer.ffmpeg_path.trim().is_empty() {
            return Err(anyhow::anyhow!("ffmpeg path cannot be empty"));
        }

        if !self.speech.endpoint.starts_with("http://") && !self.speech.endpoint.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "Speech endpoint must be an http(s) URL, got {:?}",
                self.speech.endpoint
            ));
        }

        if self.speech.language_code.trim().is_empty() {
            return Err(anyhow::anyhow!("Speech language code cannot be empty"));
        }

        if self.speech.min_speaker_count == 0
            || self.speech.min_speaker_count > self.speech.max_speaker_count
        {
            return Err(anyhow::anyhow!(
                "Speaker counts must satisfy 1 <= min ({}) <= max ({})",
                self.speech.min_speaker_count,
                self.speech.max_speaker_count
            ));
        }

        Ok(())
    }
}
