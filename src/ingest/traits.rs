//! Trait definitions for the ingestion pipeline.
//!
//! Five traits define the module boundaries:
//! - TreeReader: format detection + parsing into the neutral tree
//! - QueueStore: approval queue persistence with compare-and-set decides
//! - RecordStore: canonical record versions
//! - KeywordStore: vocabulary, occurrences, and corpus statistics
//! - FailureLedger: files that exhausted their retries

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::keywords::{CorpusView, Vocabulary};
use crate::models::{
    CanonicalRecord, FailedFile, Keyword, KeywordOccurrence, QueueItem, QueueStats, QueueStatus,
    RawTree, ReviewAction,
};

use super::error::IngestError;

/// Parses one supported input format into the neutral tree.
pub trait TreeReader: Send + Sync {
    /// Short format label stored with the queue item, e.g. "xml".
    fn format(&self) -> &'static str;

    /// Whether this reader takes the file. `format` is either a bare
    /// format label or a filename whose extension decides.
    fn can_handle(&self, format: &str) -> bool;

    /// Parse the payload. Errors here mean the file is unparseable, which
    /// is a queue outcome rather than a pipeline failure.
    fn read(&self, filename: &str, payload: &[u8]) -> Result<RawTree, IngestError>;
}

/// Approval queue persistence.
pub trait QueueStore: Send + Sync {
    /// Insert a new item together with its source payload.
    fn enqueue(
        &self,
        conn: &Connection,
        item: &QueueItem,
        payload: &[u8],
    ) -> Result<(), DatabaseError>;

    fn get(&self, conn: &Connection, item_id: Uuid) -> Result<Option<QueueItem>, DatabaseError>;

    /// The stored source payload, needed for reprocessing.
    fn payload(&self, conn: &Connection, item_id: Uuid)
        -> Result<Option<Vec<u8>>, DatabaseError>;

    fn list(
        &self,
        conn: &Connection,
        status: Option<QueueStatus>,
    ) -> Result<Vec<QueueItem>, DatabaseError>;

    /// Pending items ordered for review: most doubtful first
    /// (confidence ascending, then oldest first).
    fn list_pending(&self, conn: &Connection) -> Result<Vec<QueueItem>, DatabaseError>;

    /// Decide a pending item. The update is conditional on the row still
    /// being pending; returns false when another reviewer got there first.
    fn decide(
        &self,
        conn: &Connection,
        item_id: Uuid,
        action: ReviewAction,
        reviewer: &str,
        notes: Option<&str>,
        decided_at: &str,
    ) -> Result<bool, DatabaseError>;

    /// Pin the profile a reviewer chose over the detected one, or clear
    /// the pin with `None`.
    fn set_profile_override(
        &self,
        conn: &Connection,
        item_id: Uuid,
        profile_id: Option<&str>,
    ) -> Result<(), DatabaseError>;

    fn bump_reprocess_count(
        &self,
        conn: &Connection,
        item_id: Uuid,
    ) -> Result<(), DatabaseError>;

    fn delete(&self, conn: &Connection, item_id: Uuid) -> Result<(), DatabaseError>;

    fn stats(&self, conn: &Connection) -> Result<QueueStats, DatabaseError>;
}

/// Canonical record persistence. Records are append-only; reprocessing
/// inserts a new version instead of updating in place.
pub trait RecordStore: Send + Sync {
    fn insert(&self, conn: &Connection, record: &CanonicalRecord) -> Result<(), DatabaseError>;

    fn get(
        &self,
        conn: &Connection,
        record_id: Uuid,
    ) -> Result<Option<CanonicalRecord>, DatabaseError>;

    /// Highest-version record for a queue item, if any.
    fn latest_for_source(
        &self,
        conn: &Connection,
        source_id: Uuid,
    ) -> Result<Option<CanonicalRecord>, DatabaseError>;

    /// All versions for a queue item, oldest first.
    fn versions_for_source(
        &self,
        conn: &Connection,
        source_id: Uuid,
    ) -> Result<Vec<CanonicalRecord>, DatabaseError>;
}

/// Vocabulary and keyword persistence.
pub trait KeywordStore: Send + Sync {
    /// The bundled vocabulary extended with admin-added terms.
    fn load_vocabulary(&self, conn: &Connection) -> Result<Vocabulary, DatabaseError>;

    /// Register an admin term so future extractions recognize it.
    fn add_term(&self, conn: &Connection, keyword: &Keyword) -> Result<(), DatabaseError>;

    fn insert_occurrences(
        &self,
        conn: &Connection,
        occurrences: &[KeywordOccurrence],
    ) -> Result<(), DatabaseError>;

    /// Replace the occurrences of an earlier version of the same record.
    fn delete_occurrences_for_record(
        &self,
        conn: &Connection,
        record_id: Uuid,
    ) -> Result<(), DatabaseError>;

    /// Current corpus statistics for relevance weighting.
    fn corpus_view(&self, conn: &Connection) -> Result<CorpusView, DatabaseError>;

    /// Count one more document containing each of `terms` (distinct terms
    /// with their in-document occurrence counts).
    fn bump_corpus(
        &self,
        conn: &Connection,
        terms: &[(String, i64)],
    ) -> Result<(), DatabaseError>;
}

/// Ledger of files that failed after every retry.
pub trait FailureLedger: Send + Sync {
    fn record_failure(&self, conn: &Connection, failure: &FailedFile)
        -> Result<(), DatabaseError>;

    fn list_failures(&self, conn: &Connection) -> Result<Vec<FailedFile>, DatabaseError>;
}
