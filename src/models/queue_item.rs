//! Approval queue items and queue-level statistics.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::detection::DetectionResult;
use super::enums::QueueStatus;

/// One ingested file's place in the approval workflow.
///
/// `case_id` and `confidence` mirror the embedded detection result so list
/// and stats queries never parse the evidence JSON. The original payload is
/// persisted next to the item (see the queue store) so approval and
/// reprocessing replay mapping against the exact ingested bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub item_id: Uuid,
    pub filename: String,
    pub format: String,
    pub case_id: Option<String>,
    pub confidence: f32,
    pub detection: DetectionResult,
    /// Reviewer-chosen profile replacing the detected case before remapping.
    pub profile_override: Option<String>,
    pub status: QueueStatus,
    pub reviewed_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub decided_at: Option<String>,
    pub reprocess_count: i64,
}

impl QueueItem {
    /// The profile mapping should run with: override wins over detection.
    pub fn effective_profile(&self) -> Option<&str> {
        self.profile_override
            .as_deref()
            .or(self.case_id.as_deref())
    }
}

/// Aggregate view of the queue. Pending confidence buckets follow the
/// review screen's grouping: low < 0.5, medium in [0.5, 0.75).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_pending: i64,
    pub total_approved: i64,
    pub total_rejected: i64,
    pub avg_pending_confidence: f32,
    pub low_confidence_pending: i64,
    pub medium_confidence_pending: i64,
    pub oldest_pending: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_item() -> QueueItem {
        QueueItem {
            item_id: Uuid::new_v4(),
            filename: "scan_0001.xml".into(),
            format: "xml".into(),
            case_id: Some("lidc_single_session".into()),
            confidence: 0.62,
            detection: DetectionResult::no_match(),
            profile_override: None,
            status: QueueStatus::Pending,
            reviewed_by: None,
            notes: None,
            created_at: "2026-03-01T10:00:00Z".into(),
            decided_at: None,
            reprocess_count: 0,
        }
    }

    #[test]
    fn effective_profile_prefers_override() {
        let mut item = make_item();
        assert_eq!(item.effective_profile(), Some("lidc_single_session"));

        item.profile_override = Some("complete_attributes".into());
        assert_eq!(item.effective_profile(), Some("complete_attributes"));
    }

    #[test]
    fn effective_profile_none_when_undetected() {
        let mut item = make_item();
        item.case_id = None;
        assert_eq!(item.effective_profile(), None);
    }

    #[test]
    fn item_round_trips_through_json() {
        let item = make_item();
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"pending\""));
        let back: QueueItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }
}
