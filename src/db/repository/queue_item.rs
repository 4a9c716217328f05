//! Queue item persistence. The original payload rides along with each item
//! so approval and reprocessing replay mapping against the ingested bytes.

use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{DetectionResult, QueueItem, QueueStats, QueueStatus};

pub fn insert_queue_item(
    conn: &Connection,
    item: &QueueItem,
    payload: &[u8],
) -> Result<(), DatabaseError> {
    let detection_json = serde_json::to_string(&item.detection)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    conn.execute(
        "INSERT INTO queue_items (id, filename, format, source_payload, case_id, confidence,
             detection_json, profile_override, status, reviewed_by, notes, created_at,
             decided_at, reprocess_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            item.item_id.to_string(),
            item.filename,
            item.format,
            payload,
            item.case_id,
            item.confidence,
            detection_json,
            item.profile_override,
            item.status.as_str(),
            item.reviewed_by,
            item.notes,
            item.created_at,
            item.decided_at,
            item.reprocess_count,
        ],
    )?;
    Ok(())
}

pub fn get_queue_item(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<QueueItem>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, filename, format, case_id, confidence, detection_json, profile_override,
                status, reviewed_by, notes, created_at, decided_at, reprocess_count
         FROM queue_items WHERE id = ?1",
        params![id.to_string()],
        read_queue_row,
    );

    match result {
        Ok(row) => Ok(Some(queue_item_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The stored source bytes for one item, fetched separately so list and
/// detail queries never drag blobs along.
pub fn get_queue_payload(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<Vec<u8>>, DatabaseError> {
    let result = conn.query_row(
        "SELECT source_payload FROM queue_items WHERE id = ?1",
        params![id.to_string()],
        |row| row.get::<_, Vec<u8>>(0),
    );

    match result {
        Ok(payload) => Ok(Some(payload)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List items, optionally filtered to one status, oldest first.
pub fn list_queue_items(
    conn: &Connection,
    status: Option<QueueStatus>,
) -> Result<Vec<QueueItem>, DatabaseError> {
    let rows = match status {
        Some(status) => {
            let mut stmt = conn.prepare(
                "SELECT id, filename, format, case_id, confidence, detection_json,
                        profile_override, status, reviewed_by, notes, created_at,
                        decided_at, reprocess_count
                 FROM queue_items WHERE status = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;
            let mapped = stmt.query_map(params![status.as_str()], read_queue_row)?;
            mapped.collect::<Result<Vec<_>, _>>()?
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, filename, format, case_id, confidence, detection_json,
                        profile_override, status, reviewed_by, notes, created_at,
                        decided_at, reprocess_count
                 FROM queue_items
                 ORDER BY created_at ASC, id ASC",
            )?;
            let mapped = stmt.query_map([], read_queue_row)?;
            mapped.collect::<Result<Vec<_>, _>>()?
        }
    };

    rows.into_iter().map(queue_item_from_row).collect()
}

/// Pending items ordered for review: most doubtful first. Served by the
/// partial index on (status, confidence).
pub fn list_pending_queue_items(conn: &Connection) -> Result<Vec<QueueItem>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, filename, format, case_id, confidence, detection_json,
                profile_override, status, reviewed_by, notes, created_at,
                decided_at, reprocess_count
         FROM queue_items WHERE status = 'pending'
         ORDER BY confidence ASC, created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map([], read_queue_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(queue_item_from_row).collect()
}

/// Compare-and-set decide: the update applies only if the row is still
/// pending. Returns false when a concurrent reviewer decided first.
pub fn decide_queue_item(
    conn: &Connection,
    id: &Uuid,
    new_status: QueueStatus,
    reviewer: &str,
    notes: Option<&str>,
    decided_at: &str,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE queue_items
         SET status = ?1, reviewed_by = ?2, notes = ?3, decided_at = ?4
         WHERE id = ?5 AND status = 'pending'",
        params![new_status.as_str(), reviewer, notes, decided_at, id.to_string()],
    )?;
    Ok(rows == 1)
}

/// Record a reviewer's profile choice without deciding the item.
pub fn set_profile_override(
    conn: &Connection,
    id: &Uuid,
    profile_id: Option<&str>,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE queue_items SET profile_override = ?1 WHERE id = ?2",
        params![profile_id, id.to_string()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "QueueItem".to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn bump_reprocess_count(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE queue_items SET reprocess_count = reprocess_count + 1 WHERE id = ?1",
        params![id.to_string()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "QueueItem".to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Delete an item. Cascades to its canonical records and their keyword
/// occurrences via foreign keys.
pub fn delete_queue_item(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM queue_items WHERE id = ?1",
        params![id.to_string()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "QueueItem".to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Aggregate counts for the review screen. Confidence buckets over pending
/// items only: low below 0.5, medium in [0.5, 0.75).
pub fn queue_stats(conn: &Connection) -> Result<QueueStats, DatabaseError> {
    let stats = conn.query_row(
        "SELECT
            COUNT(CASE WHEN status = 'pending' THEN 1 END),
            COUNT(CASE WHEN status = 'approved' THEN 1 END),
            COUNT(CASE WHEN status = 'rejected' THEN 1 END),
            COALESCE(AVG(CASE WHEN status = 'pending' THEN confidence END), 0.0),
            COUNT(CASE WHEN status = 'pending' AND confidence < 0.5 THEN 1 END),
            COUNT(CASE WHEN status = 'pending' AND confidence >= 0.5 AND confidence < 0.75 THEN 1 END),
            MIN(CASE WHEN status = 'pending' THEN created_at END)
         FROM queue_items",
        [],
        |row| {
            Ok(QueueStats {
                total_pending: row.get(0)?,
                total_approved: row.get(1)?,
                total_rejected: row.get(2)?,
                avg_pending_confidence: row.get::<_, f64>(3)? as f32,
                low_confidence_pending: row.get(4)?,
                medium_confidence_pending: row.get(5)?,
                oldest_pending: row.get(6)?,
            })
        },
    )?;
    Ok(stats)
}

struct QueueItemRow {
    id: String,
    filename: String,
    format: String,
    case_id: Option<String>,
    confidence: f32,
    detection_json: String,
    profile_override: Option<String>,
    status: String,
    reviewed_by: Option<String>,
    notes: Option<String>,
    created_at: String,
    decided_at: Option<String>,
    reprocess_count: i64,
}

fn read_queue_row(row: &rusqlite::Row) -> rusqlite::Result<QueueItemRow> {
    Ok(QueueItemRow {
        id: row.get(0)?,
        filename: row.get(1)?,
        format: row.get(2)?,
        case_id: row.get(3)?,
        confidence: row.get(4)?,
        detection_json: row.get(5)?,
        profile_override: row.get(6)?,
        status: row.get(7)?,
        reviewed_by: row.get(8)?,
        notes: row.get(9)?,
        created_at: row.get(10)?,
        decided_at: row.get(11)?,
        reprocess_count: row.get(12)?,
    })
}

fn queue_item_from_row(row: QueueItemRow) -> Result<QueueItem, DatabaseError> {
    let detection: DetectionResult = serde_json::from_str(&row.detection_json)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    Ok(QueueItem {
        item_id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        filename: row.filename,
        format: row.format,
        case_id: row.case_id,
        confidence: row.confidence,
        detection,
        profile_override: row.profile_override,
        status: QueueStatus::from_str(&row.status)?,
        reviewed_by: row.reviewed_by,
        notes: row.notes,
        created_at: row.created_at,
        decided_at: row.decided_at,
        reprocess_count: row.reprocess_count,
    })
}
