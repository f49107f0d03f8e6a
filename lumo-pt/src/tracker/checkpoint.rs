//! Position checkpoints
//!
//! A checkpoint is a timestamped record of how far into a content item a
//! learner has watched. The local cache holds the exact float; the remote
//! store receives a percentage-derived snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One playback-position record for a (curriculum, item) pair
///
/// Invariant: `0 <= elapsed_seconds <= total_seconds` whenever
/// `total_seconds > 0`. `total_seconds` may be 0.0 before the player
/// reports metadata; captures tolerate that and never divide by zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionCheckpoint {
    pub curriculum_id: String,
    pub content_item_id: i64,
    pub elapsed_seconds: f64,
    pub total_seconds: f64,
    pub captured_at: DateTime<Utc>,
}

impl PositionCheckpoint {
    /// Capture a checkpoint from raw player-reported values, clamping
    /// defensively.
    pub fn capture(
        curriculum_id: &str,
        content_item_id: i64,
        elapsed_seconds: f64,
        total_seconds: f64,
    ) -> Self {
        let total = if total_seconds.is_finite() && total_seconds > 0.0 {
            total_seconds
        } else {
            0.0
        };

        let mut elapsed = if elapsed_seconds.is_finite() {
            elapsed_seconds.max(0.0)
        } else {
            0.0
        };
        if total > 0.0 {
            elapsed = elapsed.min(total);
        }

        Self {
            curriculum_id: curriculum_id.to_string(),
            content_item_id,
            elapsed_seconds: elapsed,
            total_seconds: total,
            captured_at: lumo_common::time::now(),
        }
    }

    /// Watched share in percent, 0.0 when the duration is unknown
    pub fn progress_percent(&self) -> f64 {
        if self.total_seconds > 0.0 {
            (self.elapsed_seconds / self.total_seconds * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

/// Coarser snapshot written to the remote progress store
///
/// Full-record overwrite; the remote upsert is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub content_item_id: i64,
    pub elapsed_seconds: f64,
    pub total_seconds: f64,
    pub progress_percent: f64,
    pub last_watched_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn from_checkpoint(checkpoint: &PositionCheckpoint) -> Self {
        Self {
            content_item_id: checkpoint.content_item_id,
            elapsed_seconds: checkpoint.elapsed_seconds,
            total_seconds: checkpoint.total_seconds,
            progress_percent: checkpoint.progress_percent(),
            last_watched_at: checkpoint.captured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_clamps_negative_elapsed() {
        let cp = PositionCheckpoint::capture("c-1", 1, -3.5, 120.0);
        assert_eq!(cp.elapsed_seconds, 0.0);
        assert_eq!(cp.total_seconds, 120.0);
    }

    #[test]
    fn test_capture_clamps_elapsed_to_total() {
        let cp = PositionCheckpoint::capture("c-1", 1, 130.0, 120.0);
        assert_eq!(cp.elapsed_seconds, 120.0);
    }

    #[test]
    fn test_capture_tolerates_zero_total() {
        // Metadata not loaded yet: keep elapsed, no division
        let cp = PositionCheckpoint::capture("c-1", 1, 4.2, 0.0);
        assert_eq!(cp.elapsed_seconds, 4.2);
        assert_eq!(cp.total_seconds, 0.0);
        assert_eq!(cp.progress_percent(), 0.0);
    }

    #[test]
    fn test_capture_tolerates_non_finite_input() {
        let cp = PositionCheckpoint::capture("c-1", 1, f64::NAN, f64::INFINITY);
        assert_eq!(cp.elapsed_seconds, 0.0);
        assert_eq!(cp.total_seconds, 0.0);
    }

    #[test]
    fn test_progress_percent() {
        let cp = PositionCheckpoint::capture("c-1", 1, 30.0, 120.0);
        assert!((cp.progress_percent() - 25.0).abs() < 1e-9);

        let done = PositionCheckpoint::capture("c-1", 1, 120.0, 120.0);
        assert_eq!(done.progress_percent(), 100.0);
    }

    #[test]
    fn test_snapshot_carries_percentage() {
        let cp = PositionCheckpoint::capture("c-1", 7, 60.0, 240.0);
        let snap = ProgressSnapshot::from_checkpoint(&cp);
        assert_eq!(snap.content_item_id, 7);
        assert!((snap.progress_percent - 25.0).abs() < 1e-9);
        assert_eq!(snap.last_watched_at, cp.captured_at);
    }
}
