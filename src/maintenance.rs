//! Temporary directory sweeps.
//!
//! Normal runs remove their own files. Sweeps exist for what a crashed or
//! killed process leaves behind, and run both on a timer and on demand.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::storage::{BatchRemovalReport, FileStore, StorageError};

/// Modification-time cutoff for files older than `max_age`.
pub fn age_threshold(max_age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Remove files in the store's directory older than `max_age`.
pub async fn sweep_stale_files(store: &FileStore, max_age: Duration) -> Result<BatchRemovalReport, StorageError> {
    let directory: PathBuf = store.default_directory().to_path_buf();
    let report = store.remove_older_than(&directory, age_threshold(max_age)).await?;

    if report.total_files > 0 {
        info!(
            directory = %directory.display(),
            removed = report.removed,
            failed = report.failed.len(),
            "Swept stale temporary files"
        );
    }
    Ok(report)
}

/// Start the periodic sweeper. The first sweep runs immediately.
pub fn spawn_sweeper(store: FileStore, interval: Duration, max_age: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = sweep_stale_files(&store, max_age).await {
                warn!(error = %e, "Temporary file sweep failed");
            }
        }
    })
}
