//! The approval queue state machine, kept as a pure table so it can be
//! tested exhaustively apart from any storage.

use crate::models::QueueStatus;

/// Reviewer name recorded on auto-approved items.
pub const SYSTEM_REVIEWER: &str = "system";

/// The only legal transitions: pending to either terminal state. Terminal
/// states never move again, and nothing moves back to pending.
pub fn is_valid_transition(from: QueueStatus, to: QueueStatus) -> bool {
    matches!(
        (from, to),
        (QueueStatus::Pending, QueueStatus::Approved)
            | (QueueStatus::Pending, QueueStatus::Rejected)
    )
}

/// Auto-approval takes the closed interval: a confidence exactly at the
/// threshold is approved without review.
pub fn qualifies_for_auto_approval(confidence: f32, threshold: f32) -> bool {
    confidence >= threshold
}
