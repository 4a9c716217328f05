//! Keyword reference data, per-record occurrences, and corpus counters.

use std::collections::HashMap;
use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{Keyword, KeywordOccurrence, SegmentKind};

/// Register a term, or extend an existing term with new aliases. Reference
/// data is append-only: existing rows are never repointed or removed.
pub fn upsert_keyword(conn: &Connection, keyword: &Keyword) -> Result<(), DatabaseError> {
    let added_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    conn.execute(
        "INSERT INTO keywords (canonical_term, category, source, added_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(canonical_term) DO NOTHING",
        params![keyword.canonical_term, keyword.category, keyword.source, added_at],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO keyword_aliases (alias, canonical_term) VALUES (?1, ?2)
         ON CONFLICT(alias) DO NOTHING",
    )?;
    for alias in &keyword.aliases {
        stmt.execute(params![alias, keyword.canonical_term])?;
    }
    Ok(())
}

/// All stored terms with their aliases, for extending the bundled
/// vocabulary at load time.
pub fn load_stored_keywords(conn: &Connection) -> Result<Vec<Keyword>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT canonical_term, category, source FROM keywords ORDER BY canonical_term",
    )?;
    let terms = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut alias_stmt = conn.prepare(
        "SELECT alias, canonical_term FROM keyword_aliases ORDER BY alias",
    )?;
    let alias_rows = alias_stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    for (alias, canonical) in alias_rows {
        aliases.entry(canonical).or_default().push(alias);
    }

    Ok(terms
        .into_iter()
        .map(|(canonical_term, category, source)| Keyword {
            aliases: aliases.remove(&canonical_term).unwrap_or_default(),
            canonical_term,
            category,
            source,
        })
        .collect())
}

pub fn insert_occurrences(
    conn: &Connection,
    occurrences: &[KeywordOccurrence],
) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO keyword_occurrences (id, record_id, canonical_term, category,
             segment_kind, surface_form, position, relevance, cross_validated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for occ in occurrences {
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            occ.record_id.to_string(),
            occ.canonical_term,
            occ.category,
            occ.segment_kind.as_str(),
            occ.surface_form,
            occ.position as i64,
            occ.relevance_score,
            occ.cross_validated,
        ])?;
    }
    Ok(())
}

pub fn occurrences_for_record(
    conn: &Connection,
    record_id: &Uuid,
) -> Result<Vec<KeywordOccurrence>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT record_id, canonical_term, category, segment_kind, surface_form,
                position, relevance, cross_validated
         FROM keyword_occurrences WHERE record_id = ?1
         ORDER BY canonical_term ASC, position ASC",
    )?;
    let rows = stmt
        .query_map(params![record_id.to_string()], read_occurrence_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(occurrence_from_row).collect()
}

pub fn delete_occurrences_for_record(
    conn: &Connection,
    record_id: &Uuid,
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM keyword_occurrences WHERE record_id = ?1",
        params![record_id.to_string()],
    )?;
    Ok(())
}

/// Corpus counters: the document total plus per-term document frequencies.
pub fn corpus_counts(conn: &Connection) -> Result<(i64, HashMap<String, i64>), DatabaseError> {
    let total: i64 = conn.query_row(
        "SELECT total_documents FROM corpus_meta WHERE id = 1",
        [],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT canonical_term, document_frequency FROM corpus_stats",
    )?;
    let frequencies = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;

    Ok((total, frequencies))
}

/// Count one more document containing each of `terms`. Each entry carries
/// the term's in-document occurrence count.
pub fn bump_corpus(conn: &Connection, terms: &[(String, i64)]) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE corpus_meta SET total_documents = total_documents + 1 WHERE id = 1",
        [],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO corpus_stats (canonical_term, document_frequency, total_occurrences)
         VALUES (?1, 1, ?2)
         ON CONFLICT(canonical_term) DO UPDATE SET
             document_frequency = document_frequency + 1,
             total_occurrences = total_occurrences + excluded.total_occurrences",
    )?;
    for (term, occurrences) in terms {
        stmt.execute(params![term, occurrences])?;
    }
    Ok(())
}

struct OccurrenceRow {
    record_id: String,
    canonical_term: String,
    category: String,
    segment_kind: String,
    surface_form: String,
    position: i64,
    relevance: f32,
    cross_validated: bool,
}

fn read_occurrence_row(row: &rusqlite::Row) -> rusqlite::Result<OccurrenceRow> {
    Ok(OccurrenceRow {
        record_id: row.get(0)?,
        canonical_term: row.get(1)?,
        category: row.get(2)?,
        segment_kind: row.get(3)?,
        surface_form: row.get(4)?,
        position: row.get(5)?,
        relevance: row.get(6)?,
        cross_validated: row.get(7)?,
    })
}

fn occurrence_from_row(row: OccurrenceRow) -> Result<KeywordOccurrence, DatabaseError> {
    Ok(KeywordOccurrence {
        record_id: Uuid::parse_str(&row.record_id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        canonical_term: row.canonical_term,
        category: row.category,
        segment_kind: SegmentKind::from_str(&row.segment_kind)?,
        surface_form: row.surface_form,
        position: row.position as usize,
        relevance_score: row.relevance,
        cross_validated: row.cross_validated,
    })
}
