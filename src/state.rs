//! # Application State Management
//!
//! Shared state every HTTP handler can reach through `web::Data<AppState>`.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - Every actix worker holds a clone of `AppState`; cloning only bumps the
//!   reference counts, the pipeline and config are built exactly once
//!
//! ### RwLock for metrics
//! - Many handlers record metrics concurrently; the lock is held only for a
//!   few integer updates, so contention is negligible
//! - A poisoned lock is recovered with `PoisonError::into_inner`; metrics are
//!   counters and stay meaningful even if a writer panicked mid-update
//!
//! ### RAII run guard
//! - `begin_run` returns a [`RunGuard`]; the active-run gauge is decremented
//!   when the guard drops, even if the handler future is cancelled

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use serde::Serialize;

use crate::config::AppConfig;
use crate::pipeline::AudioPipeline;

/// Main application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Immutable after startup
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<AudioPipeline>,
    pub metrics: MetricsRegistry,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Arc<AudioPipeline>) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
            metrics: MetricsRegistry::default(),
            start_time: Instant::now(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Counters collected while the server runs.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    /// Pipeline runs currently in flight
    pub active_runs: u32,
    pub completed_runs: u64,
    pub failed_runs: u64,
    /// Keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Metrics for one endpoint.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

/// Thread-safe handle to [`AppMetrics`].
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    inner: Arc<RwLock<AppMetrics>>,
}

impl MetricsRegistry {
    fn read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn increment_request_count(&self) {
        self.write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.write().error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Count a pipeline run as in flight until the guard is finished or dropped.
    pub fn begin_run(&self) -> RunGuard {
        self.write().active_runs += 1;
        RunGuard {
            registry: self.clone(),
            settled: false,
        }
    }

    fn end_run(&self, success: bool) {
        let mut metrics = self.write();
        metrics.active_runs = metrics.active_runs.saturating_sub(1);
        if success {
            metrics.completed_runs += 1;
        } else {
            metrics.failed_runs += 1;
        }
    }

    pub fn snapshot(&self) -> AppMetrics {
        self.read().clone()
    }
}

/// Keeps one run counted as active. Dropping it unfinished counts a failure.
#[must_use = "dropping the guard immediately ends the run"]
pub struct RunGuard {
    registry: MetricsRegistry,
    settled: bool,
}

impl RunGuard {
    pub fn finish(mut self, success: bool) {
        self.settled = true;
        self.registry.end_run(success);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.end_run(false);
        }
    }
}
