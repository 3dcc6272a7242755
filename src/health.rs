use crate::state::{AppMetrics, AppState};
use crate::transcription::SpeechCredentials;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Liveness plus dependency report. `degraded` means uploads will fail
/// because the transcoder cannot run.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics.snapshot();
    let config = &state.config;
    let normalizer = state.pipeline.normalizer();
    let transcoder_available = normalizer.is_available().await;

    HttpResponse::Ok().json(json!({
        "status": if transcoder_available { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": run_metrics(&metrics),
        "memory": get_memory_info(),
        "normalizer": {
            "program": normalizer.transcoder_name(),
            "available": transcoder_available,
            "timeout_secs": config.normalizer.timeout_secs
        },
        "storage": {
            "temp_dir": config.storage.temp_dir,
            "transcript_path": config.storage.transcript_path
        },
        "speech": {
            "endpoint": config.speech.endpoint,
            "language_code": config.speech.language_code,
            "credentials_configured": SpeechCredentials::from_settings(&config.speech).is_configured()
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics.snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "runs": run_metrics(&metrics),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info(),
        "limits": {
            "max_file_bytes": state.config.upload.max_file_bytes,
            "sweep_interval_secs": state.config.storage.sweep_interval_secs,
            "sweep_max_age_secs": state.config.storage.sweep_max_age_secs
        }
    }))
}

fn run_metrics(metrics: &AppMetrics) -> serde_json::Value {
    json!({
        "total_requests": metrics.request_count,
        "total_errors": metrics.error_count,
        "error_rate": if metrics.request_count > 0 {
            metrics.error_count as f64 / metrics.request_count as f64
        } else {
            0.0
        },
        "active_runs": metrics.active_runs,
        "completed_runs": metrics.completed_runs,
        "failed_runs": metrics.failed_runs
    })
}

#[cfg(target_os = "linux")]
fn get_memory_info() -> serde_json::Value {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return json!({ "available": false });
    };

    let read_kb = |prefix: &str| {
        status
            .lines()
            .find(|line| line.starts_with(prefix))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
            .unwrap_or(0)
            * 1024
    };

    json!({
        "resident_memory_bytes": read_kb("VmRSS:"),
        "virtual_memory_bytes": read_kb("VmSize:"),
        "available": true
    })
}

#[cfg(not(target_os = "linux"))]
fn get_memory_info() -> serde_json::Value {
    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_metrics_error_rate() {
        let metrics = AppMetrics {
            request_count: 4,
            error_count: 1,
            completed_runs: 3,
            ..AppMetrics::default()
        };

        let value = run_metrics(&metrics);
        assert_eq!(value["error_rate"], 0.25);
        assert_eq!(value["completed_runs"], 3);
        assert_eq!(run_metrics(&AppMetrics::default())["error_rate"], 0.0);
    }
}
