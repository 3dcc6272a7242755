pub mod audio;
pub mod maintenance;

pub use audio::*;
pub use maintenance::*;

use actix_web::web;

use crate::health;

/// Routes under `/api/v1`, plus unversioned aliases for health and upload.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .route("/audio/upload", web::post().to(upload_audio))
            .route("/maintenance/sweep", web::post().to(sweep_temp_files)),
    )
    .route("/api/audio/upload", web::post().to(upload_audio))
    .route("/health", web::get().to(health::health_check));
}
