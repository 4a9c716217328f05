//! Ledger of files that failed after exhausting their retries.

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::FailedFile;

pub fn insert_failed_file(conn: &Connection, failure: &FailedFile) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO failed_files (id, filename, reason, attempts, failed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            failure.failure_id.to_string(),
            failure.filename,
            failure.reason,
            failure.attempts,
            failure.failed_at,
        ],
    )?;
    Ok(())
}

/// Most recent failures first.
pub fn list_failed_files(conn: &Connection) -> Result<Vec<FailedFile>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, filename, reason, attempts, failed_at
         FROM failed_files ORDER BY failed_at DESC, id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, filename, reason, attempts, failed_at)| {
            Ok(FailedFile {
                failure_id: Uuid::parse_str(&id)
                    .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
                filename,
                reason,
                attempts,
                failed_at,
            })
        })
        .collect()
}
