//! Google Cloud Speech-to-Text REST client.
//!
//! Calls `POST {endpoint}/v1p1beta1/speech:recognize` with the audio inlined
//! as base64. Authentication is either an API key (sent as the `key` query
//! parameter) or an OAuth bearer token; with neither configured the request is
//! sent unauthenticated, which is useful against local emulators.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::transcriber::{SpeechApiError, SpeechRecognizer};
use super::types::{RecognizeRequest, RecognizeResponse};
use crate::config::SpeechConfig;

const RECOGNIZE_PATH: &str = "/v1p1beta1/speech:recognize";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechCredentials {
    ApiKey(String),
    BearerToken(String),
    Anonymous,
}

impl SpeechCredentials {
    /// API key wins when both are configured. Blank values are ignored.
    pub fn from_settings(settings: &SpeechConfig) -> Self {
        let non_blank = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();

        if let Some(key) = non_blank(&settings.api_key) {
            SpeechCredentials::ApiKey(key)
        } else if let Some(token) = non_blank(&settings.access_token) {
            SpeechCredentials::BearerToken(token)
        } else {
            SpeechCredentials::Anonymous
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, SpeechCredentials::Anonymous)
    }
}

/// Long-lived client; build it once and share it.
pub struct GoogleSpeechClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: SpeechCredentials,
}

impl GoogleSpeechClient {
    pub fn new(settings: &SpeechConfig) -> Result<Self, SpeechApiError> {
        let mut builder = reqwest::Client::builder();
        if settings.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(settings.request_timeout_secs));
        }

        Ok(Self {
            http: builder.build()?,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            credentials: SpeechCredentials::from_settings(settings),
        })
    }

    pub fn credentials(&self) -> &SpeechCredentials {
        &self.credentials
    }

    fn recognize_url(&self) -> String {
        format!("{}{}", self.endpoint, RECOGNIZE_PATH)
    }
}

#[async_trait]
impl SpeechRecognizer for GoogleSpeechClient {
    async fn recognize(&self, request: &RecognizeRequest) -> Result<RecognizeResponse, SpeechApiError> {
        let mut builder = self.http.post(self.recognize_url()).json(request);
        builder = match &self.credentials {
            SpeechCredentials::ApiKey(key) => builder.query(&[("key", key)]),
            SpeechCredentials::BearerToken(token) => builder.bearer_auth(token),
            SpeechCredentials::Anonymous => builder,
        };

        debug!(
            url = %self.recognize_url(),
            language = %request.config.language_code,
            audio_b64_len = request.audio.content.len(),
            "Sending recognition request"
        );

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechApiError::Status {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        let parsed: RecognizeResponse = response.json().await?;
        info!(results = parsed.results.len(), "Speech recognition completed");
        Ok(parsed)
    }
}

/// Pull `error.message` out of a Google error body, falling back to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "empty error response".to_string()
            } else {
                body.trim().to_string()
            }
        })
}
