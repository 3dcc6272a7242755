//! # Voice Transcript Backend - Main Application Entry Point
//!
//! HTTP service that accepts an uploaded audio recording, normalizes it to
//! 16 kHz mono WAV with ffmpeg, transcribes it with Google Cloud
//! Speech-to-Text, stores the transcript, and returns it to the caller.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (config.toml + environment variables)
//! - **storage**: Temporary files, file reads, transcript persistence
//! - **audio**: Intake validation and canonical WAV normalization
//! - **transcription**: Speech recognition client and result folding
//! - **pipeline**: One upload end to end, with guaranteed cleanup
//! - **state**: Shared application state and metrics
//! - **health**: Health and metrics endpoints
//! - **maintenance**: Sweeps of the temporary directory
//! - **middleware**: Request logging and metrics collection
//! - **handlers**: HTTP request handlers for API endpoints
//! - **error**: HTTP error mapping and the JSON response envelope
//!
//! ## Wiring:
//! Every long-lived component (ffmpeg transcoder, speech client, file store,
//! transcript sink) is built exactly once here and handed to the pipeline.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_transcript_backend::audio::{FfmpegTranscoder, Normalizer, Transcoder};
use voice_transcript_backend::config::AppConfig;
use voice_transcript_backend::pipeline::AudioPipeline;
use voice_transcript_backend::state::AppState;
use voice_transcript_backend::storage::{FileStore, FileTranscriptSink};
use voice_transcript_backend::transcription::{GoogleSpeechClient, RecognitionConfig, Transcriber};
use voice_transcript_backend::{handlers, maintenance, middleware};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging** for debugging and monitoring
/// 3. **Builds the pipeline** and its long-lived components
/// 4. **Starts the sweeper** for leftovers of earlier crashes
/// 5. **Runs the HTTP server** until a shutdown signal arrives
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let pipeline = Arc::new(build_pipeline(&config).await?);

    if let Some(interval) = config.storage.sweep_interval() {
        maintenance::spawn_sweeper(pipeline.store().clone(), interval, config.storage.sweep_max_age());
        info!(
            interval_secs = interval.as_secs(),
            max_age_secs = config.storage.sweep_max_age_secs,
            "Temporary file sweeper started"
        );
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config, pipeline);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Middleware executes in reverse registration order for requests
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .wrap(TracingLogger::default())
            .configure(handlers::configure_routes)
    })
    .disable_signals()
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Construct the pipeline and everything it depends on.
async fn build_pipeline(config: &AppConfig) -> Result<AudioPipeline> {
    tokio::fs::create_dir_all(&config.storage.temp_dir)
        .await
        .with_context(|| format!("Failed to create directory {}", config.storage.temp_dir))?;

    let transcoder: Arc<dyn Transcoder> = Arc::new(FfmpegTranscoder::new(
        &config.normalizer.ffmpeg_path,
        config.normalizer.timeout(),
    ));
    if !transcoder.is_available().await {
        warn!(
            program = %config.normalizer.ffmpeg_path,
            "ffmpeg is not available; uploads will fail until it is installed"
        );
    }

    let speech_client = GoogleSpeechClient::new(&config.speech).context("Failed to build speech client")?;
    if !speech_client.credentials().is_configured() {
        warn!("No speech credentials configured; set GOOGLE_API_KEY or GOOGLE_ACCESS_TOKEN");
    }

    Ok(AudioPipeline::new(
        FileStore::new(&config.storage.temp_dir),
        Normalizer::new(transcoder, config.speech.language_code.clone()),
        Transcriber::new(Arc::new(speech_client), RecognitionConfig::from_settings(&config.speech)),
        Arc::new(FileTranscriptSink::new(&config.storage.transcript_path)),
    ))
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "voice_transcript_backend=trace")
/// - If not set, defaults to "voice_transcript_backend=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_transcript_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialise tracing")?;

    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
