//! SQLite-backed implementations of the pipeline storage traits.
//!
//! Thin adapters: each method delegates to the matching repository
//! function. The indirection exists so review logic and the batch runner
//! can be exercised against in-memory fakes.

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository;
use crate::db::DatabaseError;
use crate::keywords::{CorpusView, Vocabulary};
use crate::models::{
    CanonicalRecord, FailedFile, Keyword, KeywordOccurrence, QueueItem, QueueStats, QueueStatus,
    ReviewAction,
};

use super::traits::{FailureLedger, KeywordStore, QueueStore, RecordStore};

pub struct SqliteQueueStore;

impl QueueStore for SqliteQueueStore {
    fn enqueue(
        &self,
        conn: &Connection,
        item: &QueueItem,
        payload: &[u8],
    ) -> Result<(), DatabaseError> {
        repository::insert_queue_item(conn, item, payload)
    }

    fn get(&self, conn: &Connection, item_id: Uuid) -> Result<Option<QueueItem>, DatabaseError> {
        repository::get_queue_item(conn, &item_id)
    }

    fn payload(
        &self,
        conn: &Connection,
        item_id: Uuid,
    ) -> Result<Option<Vec<u8>>, DatabaseError> {
        repository::get_queue_payload(conn, &item_id)
    }

    fn list(
        &self,
        conn: &Connection,
        status: Option<QueueStatus>,
    ) -> Result<Vec<QueueItem>, DatabaseError> {
        repository::list_queue_items(conn, status)
    }

    fn list_pending(&self, conn: &Connection) -> Result<Vec<QueueItem>, DatabaseError> {
        repository::list_pending_queue_items(conn)
    }

    fn decide(
        &self,
        conn: &Connection,
        item_id: Uuid,
        action: ReviewAction,
        reviewer: &str,
        notes: Option<&str>,
        decided_at: &str,
    ) -> Result<bool, DatabaseError> {
        repository::decide_queue_item(
            conn,
            &item_id,
            action.target_status(),
            reviewer,
            notes,
            decided_at,
        )
    }

    fn set_profile_override(
        &self,
        conn: &Connection,
        item_id: Uuid,
        profile_id: Option<&str>,
    ) -> Result<(), DatabaseError> {
        repository::set_profile_override(conn, &item_id, profile_id)
    }

    fn bump_reprocess_count(
        &self,
        conn: &Connection,
        item_id: Uuid,
    ) -> Result<(), DatabaseError> {
        repository::bump_reprocess_count(conn, &item_id)
    }

    fn delete(&self, conn: &Connection, item_id: Uuid) -> Result<(), DatabaseError> {
        repository::delete_queue_item(conn, &item_id)
    }

    fn stats(&self, conn: &Connection) -> Result<QueueStats, DatabaseError> {
        repository::queue_stats(conn)
    }
}

pub struct SqliteRecordStore;

impl RecordStore for SqliteRecordStore {
    fn insert(&self, conn: &Connection, record: &CanonicalRecord) -> Result<(), DatabaseError> {
        repository::insert_record(conn, record)
    }

    fn get(
        &self,
        conn: &Connection,
        record_id: Uuid,
    ) -> Result<Option<CanonicalRecord>, DatabaseError> {
        repository::get_record(conn, &record_id)
    }

    fn latest_for_source(
        &self,
        conn: &Connection,
        source_id: Uuid,
    ) -> Result<Option<CanonicalRecord>, DatabaseError> {
        repository::latest_record_for_source(conn, &source_id)
    }

    fn versions_for_source(
        &self,
        conn: &Connection,
        source_id: Uuid,
    ) -> Result<Vec<CanonicalRecord>, DatabaseError> {
        repository::records_for_source(conn, &source_id)
    }
}

pub struct SqliteKeywordStore;

impl KeywordStore for SqliteKeywordStore {
    /// Bundled vocabulary plus every admin-added term in the database.
    /// Stored terms win collisions because `extend` replaces by canonical
    /// term.
    fn load_vocabulary(&self, conn: &Connection) -> Result<Vocabulary, DatabaseError> {
        let mut vocabulary = Vocabulary::bundled().clone();
        vocabulary.extend(repository::load_stored_keywords(conn)?);
        Ok(vocabulary)
    }

    fn add_term(&self, conn: &Connection, keyword: &Keyword) -> Result<(), DatabaseError> {
        repository::upsert_keyword(conn, keyword)
    }

    fn insert_occurrences(
        &self,
        conn: &Connection,
        occurrences: &[KeywordOccurrence],
    ) -> Result<(), DatabaseError> {
        repository::insert_occurrences(conn, occurrences)
    }

    fn delete_occurrences_for_record(
        &self,
        conn: &Connection,
        record_id: Uuid,
    ) -> Result<(), DatabaseError> {
        repository::delete_occurrences_for_record(conn, &record_id)
    }

    fn corpus_view(&self, conn: &Connection) -> Result<CorpusView, DatabaseError> {
        let (total_documents, frequencies) = repository::corpus_counts(conn)?;
        let mut view = CorpusView::new(total_documents);
        for (term, documents) in frequencies {
            view.set_frequency(term, documents);
        }
        Ok(view)
    }

    fn bump_corpus(
        &self,
        conn: &Connection,
        terms: &[(String, i64)],
    ) -> Result<(), DatabaseError> {
        repository::bump_corpus(conn, terms)
    }
}

pub struct SqliteFailureLedger;

impl FailureLedger for SqliteFailureLedger {
    fn record_failure(
        &self,
        conn: &Connection,
        failure: &FailedFile,
    ) -> Result<(), DatabaseError> {
        repository::insert_failed_file(conn, failure)
    }

    fn list_failures(&self, conn: &Connection) -> Result<Vec<FailedFile>, DatabaseError> {
        repository::list_failed_files(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn vocabulary_merges_bundled_and_stored_terms() {
        let conn = open_memory_database().unwrap();
        let store = SqliteKeywordStore;

        let baseline = store.load_vocabulary(&conn).unwrap();
        assert!(baseline.lookup_alias("nodule").is_some());

        store
            .add_term(
                &conn,
                &Keyword {
                    canonical_term: "honeycombing".into(),
                    aliases: vec!["honeycomb pattern".into()],
                    category: "finding".into(),
                    source: "admin".into(),
                },
            )
            .unwrap();

        let merged = store.load_vocabulary(&conn).unwrap();
        assert!(merged.lookup_canonical("honeycombing").is_some());
        assert!(merged.lookup_alias("honeycomb pattern").is_some());
        assert!(merged.lookup_alias("nodule").is_some());
    }

    #[test]
    fn corpus_view_reflects_bumped_counts() {
        let conn = open_memory_database().unwrap();
        let store = SqliteKeywordStore;

        let empty = store.corpus_view(&conn).unwrap();
        assert_eq!(empty.total_documents, 0);

        store
            .bump_corpus(&conn, &[("nodule".into(), 3), ("margin".into(), 1)])
            .unwrap();
        store.bump_corpus(&conn, &[("nodule".into(), 2)]).unwrap();

        let view = store.corpus_view(&conn).unwrap();
        assert_eq!(view.total_documents, 2);
        assert_eq!(view.document_frequency("nodule"), 2);
        assert_eq!(view.document_frequency("margin"), 1);
        assert_eq!(view.document_frequency("calcification"), 0);
    }
}
