//! Review operations against the queue store.
//!
//! Each decision re-reads the item, checks the transition table, and then
//! performs a conditional update so two reviewers can never both decide
//! the same item.

use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ingest::traits::QueueStore;
use crate::models::{QueueItem, QueueStats, QueueStatus, ReviewAction};

use super::transitions::is_valid_transition;
use super::ReviewError;

/// Decide one pending item. Returns the updated item.
pub fn review_item(
    store: &dyn QueueStore,
    conn: &Connection,
    item_id: Uuid,
    action: ReviewAction,
    reviewer: &str,
    notes: Option<&str>,
) -> Result<QueueItem, ReviewError> {
    let item = store
        .get(conn, item_id)?
        .ok_or(ReviewError::NotFound { item_id })?;

    let target = action.target_status();
    if !is_valid_transition(item.status, target) {
        return Err(ReviewError::AlreadyDecided {
            item_id,
            status: item.status,
        });
    }

    let decided_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let decided = store.decide(conn, item_id, action, reviewer, notes, &decided_at)?;
    if !decided {
        warn!(%item_id, reviewer, "decision lost a review race");
        return Err(ReviewError::ConcurrentReviewConflict { item_id });
    }

    info!(%item_id, action = action.as_str(), reviewer, "queue item decided");
    store
        .get(conn, item_id)?
        .ok_or(ReviewError::NotFound { item_id })
}

/// Remove a decided item. Pending items are protected; they must be
/// reviewed first so nothing silently disappears from the queue.
pub fn delete_item(
    store: &dyn QueueStore,
    conn: &Connection,
    item_id: Uuid,
) -> Result<(), ReviewError> {
    let item = store
        .get(conn, item_id)?
        .ok_or(ReviewError::NotFound { item_id })?;
    if item.status == QueueStatus::Pending {
        return Err(ReviewError::StillPending { item_id });
    }
    store.delete(conn, item_id)?;
    info!(%item_id, status = item.status.as_str(), "queue item deleted");
    Ok(())
}

pub fn queue_stats(
    store: &dyn QueueStore,
    conn: &Connection,
) -> Result<QueueStats, ReviewError> {
    Ok(store.stats(conn)?)
}
