//! # Audio Upload Handler
//!
//! `POST /api/v1/audio/upload` (also mounted at `/api/audio/upload`).
//!
//! ## Request:
//! `multipart/form-data` with one file field (default name `audio`). The part's
//! content type must be `audio/*`.
//!
//! ## Responses:
//! - **200**: `{ "success": true, "data": { metadata, transcription, originalFile } }`
//! - **400**: no file, wrong content type, or the upload failed validation
//! - **413**: the file is larger than `upload.max_file_bytes`
//! - **500**: conversion, recognition, or storage failed

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use bytes::BytesMut;
use futures_util::StreamExt;
use tracing::{error, info};

use crate::audio::intake::is_audio_mime;
use crate::config::UploadConfig;
use crate::error::{ApiResponse, AppError, AppResult};
use crate::pipeline::UploadedAudio;
use crate::state::AppState;

pub async fn upload_audio(state: web::Data<AppState>, mut payload: Multipart) -> AppResult<HttpResponse> {
    let upload = read_audio_field(&mut payload, &state.config.upload).await?;
    info!(
        file = %upload.original_name,
        size = upload.declared_size,
        mime_type = %upload.declared_mime_type,
        "Processing audio file"
    );

    let run = state.metrics.begin_run();
    match state.pipeline.run(upload).await {
        Ok(outcome) => {
            run.finish(true);
            Ok(HttpResponse::Ok().json(ApiResponse::success(outcome)))
        }
        Err(err) => {
            run.finish(false);
            error!(error = %err, failed_at = %err.failed_at(), "Error processing file");
            Err(err.into())
        }
    }
}

/// Pull the configured file field out of the form, enforcing type and size.
///
/// Other fields are skipped. Reading stops as soon as the size limit is
/// crossed, so an oversized upload is never fully buffered.
async fn read_audio_field(payload: &mut Multipart, limits: &UploadConfig) -> AppResult<UploadedAudio> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let (field_name, filename) = match field.content_disposition() {
            Some(disposition) => (
                disposition.get_name().map(str::to_owned),
                disposition.get_filename().map(str::to_owned),
            ),
            None => (None, None),
        };
        if field_name.as_deref() != Some(limits.field_name.as_str()) {
            continue;
        }

        let mime_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();
        if !is_audio_mime(&mime_type) {
            return Err(AppError::BadRequest("Only audio files are allowed!".to_string()));
        }

        let mut bytes = BytesMut::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Failed to read file data: {}", e)))?;
            if bytes.len() + chunk.len() > limits.max_file_bytes {
                return Err(AppError::PayloadTooLarge(format!(
                    "File too large: limit is {} bytes",
                    limits.max_file_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(UploadedAudio {
            declared_size: bytes.len(),
            bytes: bytes.freeze(),
            original_name: filename.unwrap_or_default(),
            declared_mime_type: mime_type,
        });
    }

    Err(AppError::BadRequest("No audio file provided".to_string()))
}
