//! Pipeline tuning knobs.
//!
//! Defaults match the calibrated thresholds in `detect::confidence`; tests
//! and deployments with different review capacity can tighten or relax
//! them per ingestor.

use serde::{Deserialize, Serialize};

use crate::detect::{detection_thresholds, DEFAULT_DETECTION_FLOOR};

/// Configuration for one ingestor instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Items at or above this confidence skip human review (closed bound).
    pub auto_approve_threshold: f32,
    /// Detections below this floor collapse to no-match.
    pub detection_floor: f32,
    /// Relevance multiplier for terms corroborated across segment kinds.
    pub cross_validation_boost: f32,
    /// Parallel parse workers for batch runs.
    pub worker_count: usize,
    /// Per-file parse budget. A file that blows it is queued as
    /// unparseable rather than holding up the batch.
    pub file_timeout_secs: u64,
    /// Total attempts for a failing store write before the file lands in
    /// the failure ledger.
    pub store_retries: u32,
    /// Pause between store retry attempts.
    pub store_retry_backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            auto_approve_threshold: detection_thresholds::AUTO_APPROVE,
            detection_floor: DEFAULT_DETECTION_FLOOR,
            cross_validation_boost: 1.5,
            worker_count: 4,
            file_timeout_secs: 30,
            store_retries: 3,
            store_retry_backoff_ms: 250,
        }
    }
}
