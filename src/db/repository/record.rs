//! Canonical record persistence. Records are append-only: reprocessing a
//! queue item inserts a new version, it never rewrites an existing row.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{CanonicalRecord, FieldValue};

pub fn insert_record(conn: &Connection, record: &CanonicalRecord) -> Result<(), DatabaseError> {
    let fields_json = serde_json::to_string(&record.fields)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    let missing_json = serde_json::to_string(&record.missing_required)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    conn.execute(
        "INSERT INTO canonical_records (id, source_id, version, profile_id, fields_json,
             missing_required_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.record_id.to_string(),
            record.source_id.to_string(),
            record.version,
            record.profile_id,
            fields_json,
            missing_json,
            record.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_record(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<CanonicalRecord>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, source_id, version, profile_id, fields_json, missing_required_json,
                created_at
         FROM canonical_records WHERE id = ?1",
        params![id.to_string()],
        read_record_row,
    );

    match result {
        Ok(row) => Ok(Some(record_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The highest-version record mapped from one queue item.
pub fn latest_record_for_source(
    conn: &Connection,
    source_id: &Uuid,
) -> Result<Option<CanonicalRecord>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, source_id, version, profile_id, fields_json, missing_required_json,
                created_at
         FROM canonical_records WHERE source_id = ?1
         ORDER BY version DESC LIMIT 1",
        params![source_id.to_string()],
        read_record_row,
    );

    match result {
        Ok(row) => Ok(Some(record_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Every version mapped from one queue item, oldest first.
pub fn records_for_source(
    conn: &Connection,
    source_id: &Uuid,
) -> Result<Vec<CanonicalRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, source_id, version, profile_id, fields_json, missing_required_json,
                created_at
         FROM canonical_records WHERE source_id = ?1
         ORDER BY version ASC",
    )?;
    let rows = stmt
        .query_map(params![source_id.to_string()], read_record_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(record_from_row).collect()
}

struct RecordRow {
    id: String,
    source_id: String,
    version: i64,
    profile_id: String,
    fields_json: String,
    missing_required_json: String,
    created_at: String,
}

fn read_record_row(row: &rusqlite::Row) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        source_id: row.get(1)?,
        version: row.get(2)?,
        profile_id: row.get(3)?,
        fields_json: row.get(4)?,
        missing_required_json: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn record_from_row(row: RecordRow) -> Result<CanonicalRecord, DatabaseError> {
    let fields: BTreeMap<String, FieldValue> = serde_json::from_str(&row.fields_json)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    let missing_required: BTreeSet<String> = serde_json::from_str(&row.missing_required_json)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    Ok(CanonicalRecord {
        record_id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        source_id: Uuid::parse_str(&row.source_id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        version: row.version,
        profile_id: row.profile_id,
        fields,
        missing_required,
        created_at: row.created_at,
    })
}
