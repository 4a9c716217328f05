//! The approval queue: pure state machine plus the review operations
//! that drive it against storage.

pub mod review;
pub mod transitions;

pub use review::{delete_item, queue_stats, review_item};
pub use transitions::{is_valid_transition, qualifies_for_auto_approval, SYSTEM_REVIEWER};

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::QueueStatus;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Queue item not found: {item_id}")]
    NotFound { item_id: Uuid },

    #[error("Queue item {item_id} is already {status}")]
    AlreadyDecided { item_id: Uuid, status: QueueStatus },

    #[error("Queue item {item_id} is {status}; only approved items can be reprocessed")]
    NotApproved { item_id: Uuid, status: QueueStatus },

    #[error("Queue item {item_id} is still pending; decide it before deleting")]
    StillPending { item_id: Uuid },

    #[error("Queue item {item_id} was decided by another reviewer")]
    ConcurrentReviewConflict { item_id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl ReviewError {
    /// A conflict means the caller lost a race, not that the request was
    /// invalid; re-reading the item and deciding again is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentReviewConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        let id = Uuid::new_v4();
        assert!(ReviewError::ConcurrentReviewConflict { item_id: id }.is_retryable());
        assert!(!ReviewError::NotFound { item_id: id }.is_retryable());
        assert!(!ReviewError::StillPending { item_id: id }.is_retryable());
        assert!(!ReviewError::AlreadyDecided {
            item_id: id,
            status: QueueStatus::Approved,
        }
        .is_retryable());
    }
}
