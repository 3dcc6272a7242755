//! Run stages and the tracker that walks them.
//!
//! A run moves strictly forward:
//! ```text
//! Received → Validated → Persisted → Normalized → ReRead → Transcribed
//!          → TranscriptSaved → CleanedUp → Done
//! ```
//! A failure at any point ends the run as failed, tagged with the last stage
//! that completed.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Received,
    Validated,
    Persisted,
    Normalized,
    ReRead,
    Transcribed,
    TranscriptSaved,
    CleanedUp,
    Done,
}

impl RunStage {
    pub fn label(self) -> &'static str {
        match self {
            RunStage::Received => "received",
            RunStage::Validated => "validated",
            RunStage::Persisted => "persisted",
            RunStage::Normalized => "normalized",
            RunStage::ReRead => "re_read",
            RunStage::Transcribed => "transcribed",
            RunStage::TranscriptSaved => "transcript_saved",
            RunStage::CleanedUp => "cleaned_up",
            RunStage::Done => "done",
        }
    }

    /// The only stage allowed to follow this one.
    pub fn next(self) -> Option<RunStage> {
        match self {
            RunStage::Received => Some(RunStage::Validated),
            RunStage::Validated => Some(RunStage::Persisted),
            RunStage::Persisted => Some(RunStage::Normalized),
            RunStage::Normalized => Some(RunStage::ReRead),
            RunStage::ReRead => Some(RunStage::Transcribed),
            RunStage::Transcribed => Some(RunStage::TranscriptSaved),
            RunStage::TranscriptSaved => Some(RunStage::CleanedUp),
            RunStage::CleanedUp => Some(RunStage::Done),
            RunStage::Done => None,
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-run progress record.
#[derive(Debug)]
pub struct RunTracker {
    run_id: Uuid,
    stage: RunStage,
    started: Instant,
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stage: RunStage::Received,
            started: Instant::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Move to `to`, which must be the direct successor of the current stage.
    pub fn advance(&mut self, to: RunStage) {
        debug_assert_eq!(self.stage.next(), Some(to), "stage skipped or repeated");
        debug!(
            run_id = %self.run_id,
            from = %self.stage,
            to = %to,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Run advanced"
        );
        self.stage = to;
    }

    /// Record that the run ended in failure.
    pub fn fail(&self, failed_at: RunStage, cause: &dyn fmt::Display) {
        warn!(
            run_id = %self.run_id,
            failed_at = %failed_at,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            error = %cause,
            "Run failed"
        );
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_chain_to_done() {
        let mut stage = RunStage::Received;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            stage = next;
            visited.push(stage);
        }

        assert_eq!(visited.len(), 9);
        assert_eq!(visited.last(), Some(&RunStage::Done));
    }

    #[test]
    fn test_tracker_advances_in_order() {
        let mut tracker = RunTracker::new();
        assert_eq!(tracker.stage, RunStage::Received);

        tracker.advance(RunStage::Validated);
        tracker.advance(RunStage::Persisted);
        assert_eq!(tracker.stage, RunStage::Persisted);
    }

    #[test]
    #[should_panic(expected = "stage skipped or repeated")]
    #[cfg(debug_assertions)]
    fn test_tracker_rejects_skipped_stage() {
        let mut tracker = RunTracker::new();
        tracker.advance(RunStage::Normalized);
    }

    #[test]
    fn test_labels_serialize_as_snake_case() {
        assert_eq!(serde_json::to_string(&RunStage::ReRead).unwrap(), "\"re_read\"");
        assert_eq!(RunStage::TranscriptSaved.to_string(), "transcript_saved");
    }
}
