//! The ingestor facade: every pipeline operation behind one type.
//!
//! Owns the reader registry, the profile registry, and the storage
//! backends. Callers hold the connection; the ingestor never opens one
//! itself, which keeps single-file use, batch runs, and tests on the
//! same code path.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::detect::detect_case;
use crate::keywords::extract_keywords;
use crate::mapping::map_record;
use crate::models::{
    CanonicalRecord, DetectionResult, FailedFile, Keyword, KeywordOccurrence, QueueItem,
    QueueStats, QueueStatus, RawTree, ReviewAction,
};
use crate::profiles::{CaseProfile, ProfileRegistry};
use crate::queue::{self, qualifies_for_auto_approval, ReviewError, SYSTEM_REVIEWER};

use super::config::IngestConfig;
use super::error::IngestError;
use super::readers::ReaderRegistry;
use super::store::{SqliteFailureLedger, SqliteKeywordStore, SqliteQueueStore, SqliteRecordStore};
use super::traits::{FailureLedger, KeywordStore, QueueStore, RecordStore};

/// What happened to one ingested file.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Confidence cleared the threshold; the record is already mapped.
    AutoApproved {
        item: QueueItem,
        record: CanonicalRecord,
        keywords: Vec<KeywordOccurrence>,
    },
    /// The file waits in the queue for a human decision.
    Queued { item: QueueItem },
}

impl IngestOutcome {
    pub fn item(&self) -> &QueueItem {
        match self {
            Self::AutoApproved { item, .. } => item,
            Self::Queued { item } => item,
        }
    }

    pub fn is_auto_approved(&self) -> bool {
        matches!(self, Self::AutoApproved { .. })
    }
}

/// Per-item outcome of a batch review. A failing item never aborts the
/// rest of the batch.
#[derive(Debug)]
pub struct BatchReviewResult {
    pub item_id: Uuid,
    pub outcome: Result<QueueItem, IngestError>,
}

impl BatchReviewResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

pub struct Ingestor {
    pub(super) readers: Arc<ReaderRegistry>,
    pub(super) registry: ProfileRegistry,
    pub(super) queue: Box<dyn QueueStore>,
    pub(super) records: Box<dyn RecordStore>,
    pub(super) keywords: Box<dyn KeywordStore>,
    pub(super) failures: Box<dyn FailureLedger>,
    pub(super) config: IngestConfig,
}

impl Ingestor {
    /// Ingestor with the builtin readers and the SQLite stores.
    pub fn new(registry: ProfileRegistry, config: IngestConfig) -> Self {
        Self {
            readers: Arc::new(ReaderRegistry::with_builtin()),
            registry,
            queue: Box::new(SqliteQueueStore),
            records: Box::new(SqliteRecordStore),
            keywords: Box::new(SqliteKeywordStore),
            failures: Box::new(SqliteFailureLedger),
            config,
        }
    }

    /// Swap in a custom reader registry, e.g. to add a site-specific
    /// export format.
    pub fn with_readers(mut self, readers: ReaderRegistry) -> Self {
        self.readers = Arc::new(readers);
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest one file: parse, detect, and either auto-approve (mapping
    /// immediately) or queue for review. Unparseable payloads are queued
    /// too, so a reviewer sees every file that arrived.
    pub fn detect_and_map(
        &self,
        conn: &Connection,
        filename: &str,
        format: &str,
        payload: &[u8],
    ) -> Result<IngestOutcome, IngestError> {
        let reader = self
            .readers
            .reader_for(format)
            .ok_or_else(|| IngestError::UnsupportedFormat {
                format: format.to_string(),
            })?;

        let tree = match reader.read(filename, payload) {
            Ok(tree) => tree,
            Err(IngestError::Unparseable { reason, .. }) => {
                return self.queue_unparseable(conn, filename, reader.format(), payload, reason);
            }
            Err(other) => return Err(other),
        };

        let detection = detect_case(&tree, &self.registry, self.config.detection_floor);
        let profile = detection
            .case_id
            .as_deref()
            .and_then(|id| self.registry.get(id));

        let auto = profile.is_some()
            && qualifies_for_auto_approval(detection.confidence, self.config.auto_approve_threshold);

        let item = build_item(filename, reader.format(), detection, auto);
        self.queue.enqueue(conn, &item, payload)?;

        if let (true, Some(profile)) = (auto, profile) {
            let (record, keywords) = self.map_and_store(conn, &item, &tree, profile, 1)?;
            info!(
                filename,
                case_id = %profile.profile_id,
                confidence = item.confidence,
                record_id = %record.record_id,
                "file auto-approved and mapped"
            );
            return Ok(IngestOutcome::AutoApproved {
                item,
                record,
                keywords,
            });
        }

        info!(
            filename,
            case_id = item.case_id.as_deref().unwrap_or("none"),
            confidence = item.confidence,
            "file queued for review"
        );
        Ok(IngestOutcome::Queued { item })
    }

    fn queue_unparseable(
        &self,
        conn: &Connection,
        filename: &str,
        format: &str,
        payload: &[u8],
        reason: String,
    ) -> Result<IngestOutcome, IngestError> {
        warn!(filename, %reason, "file is unparseable; queueing for review");
        let item = build_item(filename, format, DetectionResult::unparseable(reason), false);
        self.queue.enqueue(conn, &item, payload)?;
        Ok(IngestOutcome::Queued { item })
    }

    /// Decide one queued item.
    ///
    /// Approvals are validated before the decision is attempted: the item
    /// must be parseable and must resolve to a known profile, via the
    /// detected case, a stored override, or `profile_override` passed
    /// here. A passed override is persisted before the decision so the
    /// choice survives even a lost review race.
    pub fn review(
        &self,
        conn: &Connection,
        item_id: Uuid,
        action: ReviewAction,
        reviewer: &str,
        notes: Option<&str>,
        profile_override: Option<&str>,
    ) -> Result<QueueItem, IngestError> {
        let item = self
            .queue
            .get(conn, item_id)?
            .ok_or(ReviewError::NotFound { item_id })?;

        if let Some(profile_id) = profile_override {
            if self.registry.get(profile_id).is_none() {
                return Err(IngestError::UnknownProfile {
                    profile_id: profile_id.to_string(),
                });
            }
        }
        if action == ReviewAction::Approve {
            if item.detection.is_unparseable() {
                return Err(IngestError::ApprovedUnparseable { item_id });
            }
            let profile_id = profile_override
                .or_else(|| item.effective_profile())
                .ok_or(IngestError::MissingProfile { item_id })?;
            if self.registry.get(profile_id).is_none() {
                return Err(IngestError::UnknownProfile {
                    profile_id: profile_id.to_string(),
                });
            }
        }

        if let Some(profile_id) = profile_override {
            self.queue
                .set_profile_override(conn, item_id, Some(profile_id))?;
        }

        let updated = queue::review_item(
            self.queue.as_ref(),
            conn,
            item_id,
            action,
            reviewer,
            notes,
        )?;

        if updated.status != QueueStatus::Approved {
            return Ok(updated);
        }

        let profile = self.resolve_profile(&updated)?;
        let tree = self.reparse(conn, &updated)?;
        let previous = self.records.latest_for_source(conn, item_id)?;
        let version = previous.as_ref().map_or(1, |r| r.version + 1);
        let (record, _) = self.map_and_store(conn, &updated, &tree, profile, version)?;
        info!(
            item_id = %item_id,
            record_id = %record.record_id,
            version,
            profile_id = %profile.profile_id,
            "approved item mapped"
        );
        Ok(updated)
    }

    /// Apply one action to many items; every item gets its own result.
    pub fn batch_review(
        &self,
        conn: &Connection,
        item_ids: &[Uuid],
        action: ReviewAction,
        reviewer: &str,
        notes: Option<&str>,
    ) -> Vec<BatchReviewResult> {
        let results: Vec<BatchReviewResult> = item_ids
            .iter()
            .map(|&item_id| BatchReviewResult {
                item_id,
                outcome: self.review(conn, item_id, action, reviewer, notes, None),
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        info!(
            total = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            action = action.as_str(),
            "batch review finished"
        );
        results
    }

    /// Re-run mapping and extraction for an approved item, producing the
    /// next record version. The previous version's keyword occurrences
    /// are retired so each document is counted once.
    pub fn reprocess(
        &self,
        conn: &Connection,
        item_id: Uuid,
    ) -> Result<CanonicalRecord, IngestError> {
        let item = self
            .queue
            .get(conn, item_id)?
            .ok_or(ReviewError::NotFound { item_id })?;
        if item.status != QueueStatus::Approved {
            return Err(ReviewError::NotApproved {
                item_id,
                status: item.status,
            }
            .into());
        }

        let profile = self.resolve_profile(&item)?;
        let tree = self.reparse(conn, &item)?;
        let previous = self.records.latest_for_source(conn, item_id)?;
        let version = previous.as_ref().map_or(1, |r| r.version + 1);

        let record = map_record(&tree, profile, item_id, version);
        self.records.insert(conn, &record)?;
        if let Some(previous) = &previous {
            self.keywords
                .delete_occurrences_for_record(conn, previous.record_id)?;
        }
        if let Err(err) = self.extract_and_store(conn, &record, profile, previous.is_none()) {
            warn!(
                record_id = %record.record_id,
                %err,
                "keyword extraction failed; record kept without keywords"
            );
        }
        self.queue.bump_reprocess_count(conn, item_id)?;

        info!(
            item_id = %item_id,
            record_id = %record.record_id,
            version,
            "item reprocessed"
        );
        Ok(record)
    }

    /// Re-run keyword extraction for an existing record, replacing its
    /// occurrences. Unlike the mapping paths this propagates failures,
    /// because the caller asked for the keywords specifically.
    pub fn extract_keywords(
        &self,
        conn: &Connection,
        record_id: Uuid,
    ) -> Result<Vec<KeywordOccurrence>, IngestError> {
        let record = self
            .records
            .get(conn, record_id)?
            .ok_or(IngestError::RecordNotFound { record_id })?;
        let profile =
            self.registry
                .get(&record.profile_id)
                .ok_or_else(|| IngestError::UnknownProfile {
                    profile_id: record.profile_id.clone(),
                })?;

        self.keywords.delete_occurrences_for_record(conn, record_id)?;
        self.extract_and_store(conn, &record, profile, false)
    }

    /// Register a vocabulary term so future extractions recognize it.
    pub fn add_term(&self, conn: &Connection, keyword: &Keyword) -> Result<(), IngestError> {
        self.keywords.add_term(conn, keyword)?;
        info!(term = %keyword.canonical_term, "vocabulary term added");
        Ok(())
    }

    /// Remove a decided item; pending items must be reviewed first.
    pub fn delete(&self, conn: &Connection, item_id: Uuid) -> Result<(), IngestError> {
        Ok(queue::delete_item(self.queue.as_ref(), conn, item_id)?)
    }

    pub fn get_item(
        &self,
        conn: &Connection,
        item_id: Uuid,
    ) -> Result<Option<QueueItem>, IngestError> {
        Ok(self.queue.get(conn, item_id)?)
    }

    pub fn list(
        &self,
        conn: &Connection,
        status: Option<QueueStatus>,
    ) -> Result<Vec<QueueItem>, IngestError> {
        Ok(self.queue.list(conn, status)?)
    }

    /// Pending items, most doubtful first.
    pub fn list_pending(&self, conn: &Connection) -> Result<Vec<QueueItem>, IngestError> {
        Ok(self.queue.list_pending(conn)?)
    }

    pub fn stats(&self, conn: &Connection) -> Result<QueueStats, IngestError> {
        Ok(queue::queue_stats(self.queue.as_ref(), conn)?)
    }

    pub fn latest_record(
        &self,
        conn: &Connection,
        item_id: Uuid,
    ) -> Result<Option<CanonicalRecord>, IngestError> {
        Ok(self.records.latest_for_source(conn, item_id)?)
    }

    pub fn record_versions(
        &self,
        conn: &Connection,
        item_id: Uuid,
    ) -> Result<Vec<CanonicalRecord>, IngestError> {
        Ok(self.records.versions_for_source(conn, item_id)?)
    }

    pub fn list_failures(&self, conn: &Connection) -> Result<Vec<FailedFile>, IngestError> {
        Ok(self.failures.list_failures(conn)?)
    }

    fn resolve_profile(&self, item: &QueueItem) -> Result<&CaseProfile, IngestError> {
        let profile_id = item
            .effective_profile()
            .ok_or(IngestError::MissingProfile {
                item_id: item.item_id,
            })?;
        self.registry
            .get(profile_id)
            .ok_or_else(|| IngestError::UnknownProfile {
                profile_id: profile_id.to_string(),
            })
    }

    fn reparse(
        &self,
        conn: &Connection,
        item: &QueueItem,
    ) -> Result<RawTree, IngestError> {
        let payload = self
            .queue
            .payload(conn, item.item_id)?
            .ok_or(ReviewError::NotFound {
                item_id: item.item_id,
            })?;
        let reader =
            self.readers
                .reader_for(&item.format)
                .ok_or_else(|| IngestError::UnsupportedFormat {
                    format: item.format.clone(),
                })?;
        reader.read(&item.filename, &payload)
    }

    /// Insert the mapped record, then extract keywords. Extraction
    /// trouble downgrades to a warning: the record survives and the
    /// keywords can be recomputed later with [`Ingestor::extract_keywords`].
    fn map_and_store(
        &self,
        conn: &Connection,
        item: &QueueItem,
        tree: &RawTree,
        profile: &CaseProfile,
        version: i64,
    ) -> Result<(CanonicalRecord, Vec<KeywordOccurrence>), IngestError> {
        let record = map_record(tree, profile, item.item_id, version);
        self.records.insert(conn, &record)?;

        let keywords = match self.extract_and_store(conn, &record, profile, version == 1) {
            Ok(keywords) => keywords,
            Err(err) => {
                warn!(
                    record_id = %record.record_id,
                    %err,
                    "keyword extraction failed; record kept without keywords"
                );
                Vec::new()
            }
        };
        Ok((record, keywords))
    }

    /// Extract and persist occurrences. The corpus counts this document
    /// only when `first_version` is set; reruns must not inflate
    /// document frequency.
    fn extract_and_store(
        &self,
        conn: &Connection,
        record: &CanonicalRecord,
        profile: &CaseProfile,
        first_version: bool,
    ) -> Result<Vec<KeywordOccurrence>, IngestError> {
        let vocabulary = self.keywords.load_vocabulary(conn)?;
        let corpus = self.keywords.corpus_view(conn)?;
        let occurrences = extract_keywords(
            record,
            profile,
            &vocabulary,
            &corpus,
            self.config.cross_validation_boost,
        );

        self.keywords.insert_occurrences(conn, &occurrences)?;
        if first_version {
            self.keywords
                .bump_corpus(conn, &term_counts(&occurrences))?;
        }
        Ok(occurrences)
    }
}

/// Fresh queue item for one ingested file. Auto-approved items are born
/// decided: status, reviewer, and decision time are set at creation.
pub(super) fn build_item(
    filename: &str,
    format: &str,
    detection: DetectionResult,
    auto: bool,
) -> QueueItem {
    let now = timestamp();
    QueueItem {
        item_id: Uuid::new_v4(),
        filename: filename.to_string(),
        format: format.to_string(),
        case_id: detection.case_id.clone(),
        confidence: detection.confidence,
        detection,
        profile_override: None,
        status: if auto {
            QueueStatus::Approved
        } else {
            QueueStatus::Pending
        },
        reviewed_by: auto.then(|| SYSTEM_REVIEWER.to_string()),
        notes: None,
        created_at: now.clone(),
        decided_at: auto.then_some(now),
        reprocess_count: 0,
    }
}

/// Distinct canonical terms with their in-document occurrence counts.
pub(super) fn term_counts(occurrences: &[KeywordOccurrence]) -> Vec<(String, i64)> {
    let mut counts: std::collections::BTreeMap<&str, i64> = std::collections::BTreeMap::new();
    for occurrence in occurrences {
        *counts.entry(&occurrence.canonical_term).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(term, count)| (term.to_string(), count))
        .collect()
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository;
    use crate::db::sqlite::open_memory_database;
    use crate::models::{RawNode, RawTree};

    fn ingestor() -> Ingestor {
        Ingestor::new(ProfileRegistry::builtin().clone(), IngestConfig::default())
    }

    /// A fully populated single-session read: every expected field of
    /// `lidc_single_session` present, plus free text naming the profile's
    /// vocabulary terms.
    fn single_session_xml() -> Vec<u8> {
        br#"<LidcReadMessage>
  <ResponseHeader>
    <Version>1.8.1</Version>
    <MessageId>-1682660720</MessageId>
    <DateRequest>2005-11-03</DateRequest>
    <TimeRequest>12:08:30</TimeRequest>
    <StudyInstanceUID>1.3.6.1.4.1.14519.5.2.1.6279.6001.1</StudyInstanceUID>
    <SeriesInstanceUid>1.3.6.1.4.1.14519.5.2.1.6279.6001.2</SeriesInstanceUid>
  </ResponseHeader>
  <readingSession>
    <annotationVersion>3.12</annotationVersion>
    <servicingRadiologistID>anon-540461523</servicingRadiologistID>
    <unblindedReadNodule>
      <noduleID>Nodule 001</noduleID>
      <characteristics>
        <subtlety>5</subtlety>
        <internalStructure>1</internalStructure>
        <calcification>6</calcification>
        <sphericity>4</sphericity>
        <margin>3</margin>
        <lobulation>2</lobulation>
        <spiculation>4</spiculation>
        <texture>5</texture>
        <malignancy>4</malignancy>
      </characteristics>
      <roi>
        <imageZposition>-125.25</imageZposition>
        <imageSOP_UID>1.3.6.1.4.1.14519.5.2.1.6279.6001.3</imageSOP_UID>
      </roi>
    </unblindedReadNodule>
    <impression>Solid pulmonary nodule with marked spiculation, irregular margin,
      eccentric calcification; features concerning for malignancy.</impression>
  </readingSession>
</LidcReadMessage>"#
            .to_vec()
    }

    /// Four of the six header fields, nothing else. Scores in the
    /// review band for `core_attributes_only` and nowhere near auto.
    fn partial_header_xml() -> Vec<u8> {
        br#"<LidcReadMessage>
  <ResponseHeader>
    <Version>1.8.1</Version>
    <MessageId>1789</MessageId>
    <DateRequest>2005-11-03</DateRequest>
    <StudyInstanceUID>1.3.6.1.4.1.14519.5.2.1.6279.6001.1</StudyInstanceUID>
  </ResponseHeader>
</LidcReadMessage>"#
            .to_vec()
    }

    /// A single recognizable field; every profile scores under the floor.
    fn below_floor_xml() -> Vec<u8> {
        b"<Message><ResponseHeader><Version>1.8</Version></ResponseHeader></Message>".to_vec()
    }

    #[test]
    fn high_confidence_file_is_auto_approved() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let outcome = ingestor
            .detect_and_map(&conn, "LIDC-single-0042.xml", "xml", &single_session_xml())
            .unwrap();

        let (item, record, keywords) = match outcome {
            IngestOutcome::AutoApproved {
                item,
                record,
                keywords,
            } => (item, record, keywords),
            IngestOutcome::Queued { item } => {
                panic!("expected auto-approval, queued at {}", item.confidence)
            }
        };

        assert_eq!(item.status, QueueStatus::Approved);
        assert_eq!(item.reviewed_by.as_deref(), Some(SYSTEM_REVIEWER));
        assert!(item.decided_at.is_some());
        assert_eq!(item.case_id.as_deref(), Some("lidc_single_session"));
        assert!(item.confidence >= 0.75);

        assert_eq!(record.version, 1);
        assert_eq!(record.profile_id, "lidc_single_session");
        assert!(record.fields.contains_key("study/study_instance_uid"));
        assert!(record.fields.contains_key("nodule/characteristics/malignancy"));
        assert!(record.is_complete());

        assert!(!keywords.is_empty());
        let stored = repository::occurrences_for_record(&conn, &record.record_id).unwrap();
        assert_eq!(stored.len(), keywords.len());

        // First version enters the corpus exactly once.
        let (total, _) = repository::corpus_counts(&conn).unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn cross_validated_terms_carry_the_boost() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let outcome = ingestor
            .detect_and_map(&conn, "LIDC-single-0042.xml", "xml", &single_session_xml())
            .unwrap();
        let keywords = match outcome {
            IngestOutcome::AutoApproved { keywords, .. } => keywords,
            _ => panic!("expected auto-approval"),
        };

        // "malignancy" appears both as a coded characteristic and in the
        // impression text, so it must be corroborated.
        let malignancy: Vec<_> = keywords
            .iter()
            .filter(|k| k.canonical_term == "malignancy")
            .collect();
        assert!(!malignancy.is_empty());
        assert!(malignancy.iter().all(|k| k.cross_validated));

        // "subtlety" is coded only; never corroborated.
        let subtlety: Vec<_> = keywords
            .iter()
            .filter(|k| k.canonical_term == "subtlety")
            .collect();
        assert!(!subtlety.is_empty());
        assert!(subtlety.iter().all(|k| !k.cross_validated));
    }

    #[test]
    fn medium_confidence_file_queues_pending() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let outcome = ingestor
            .detect_and_map(&conn, "scan_0042.xml", "xml", &partial_header_xml())
            .unwrap();

        assert!(!outcome.is_auto_approved());
        let item = outcome.item();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.case_id.as_deref(), Some("core_attributes_only"));
        assert!(item.confidence >= 0.30 && item.confidence < 0.75);

        assert!(ingestor.latest_record(&conn, item.item_id).unwrap().is_none());
        let (total, _) = repository::corpus_counts(&conn).unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn below_floor_detection_queues_with_no_case() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let outcome = ingestor
            .detect_and_map(&conn, "scan_0099.xml", "xml", &below_floor_xml())
            .unwrap();

        let item = outcome.item();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.case_id, None);
        assert!(!item.detection.is_unparseable());
    }

    #[test]
    fn unreadable_file_queues_unparseable() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let outcome = ingestor
            .detect_and_map(&conn, "broken.xml", "xml", b"<LidcReadMessage><oops>")
            .unwrap();

        let item = outcome.item();
        assert_eq!(item.status, QueueStatus::Pending);
        assert!(item.detection.is_unparseable());
        assert_eq!(item.confidence, 0.0);
        assert_eq!(item.case_id, None);
        assert!(item.detection.failure_reason.is_some());
    }

    #[test]
    fn unknown_format_is_unsupported() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let err = ingestor
            .detect_and_map(&conn, "notes.txt", "notes.txt", b"free text")
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat { .. }));

        // Nothing was queued for the refused file.
        assert_eq!(ingestor.list(&conn, None).unwrap().len(), 0);
    }

    #[test]
    fn approve_pending_maps_record_with_partial_fields() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let item_id = ingestor
            .detect_and_map(&conn, "scan_0042.xml", "xml", &partial_header_xml())
            .unwrap()
            .item()
            .item_id;

        let updated = ingestor
            .review(
                &conn,
                item_id,
                ReviewAction::Approve,
                "dr_moreno",
                Some("header is genuine"),
                None,
            )
            .unwrap();

        assert_eq!(updated.status, QueueStatus::Approved);
        assert_eq!(updated.reviewed_by.as_deref(), Some("dr_moreno"));

        let record = ingestor.latest_record(&conn, item_id).unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.profile_id, "core_attributes_only");
        assert!(record.fields.contains_key("study/study_instance_uid"));
        // The series UID was absent from the file, so the record is
        // flagged partial rather than dropped.
        assert!(record
            .missing_required
            .contains("study/series_instance_uid"));
        assert!(!record.is_complete());
    }

    #[test]
    fn approve_with_override_maps_that_profile() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let item_id = ingestor
            .detect_and_map(&conn, "scan_0042.xml", "xml", &partial_header_xml())
            .unwrap()
            .item()
            .item_id;

        let updated = ingestor
            .review(
                &conn,
                item_id,
                ReviewAction::Approve,
                "dr_moreno",
                None,
                Some("with_reason_partial"),
            )
            .unwrap();

        assert_eq!(
            updated.profile_override.as_deref(),
            Some("with_reason_partial")
        );
        let record = ingestor.latest_record(&conn, item_id).unwrap().unwrap();
        assert_eq!(record.profile_id, "with_reason_partial");
    }

    #[test]
    fn unknown_override_profile_is_refused_before_deciding() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let item_id = ingestor
            .detect_and_map(&conn, "scan_0042.xml", "xml", &partial_header_xml())
            .unwrap()
            .item()
            .item_id;

        let err = ingestor
            .review(
                &conn,
                item_id,
                ReviewAction::Approve,
                "dr_moreno",
                None,
                Some("no_such_profile"),
            )
            .unwrap_err();
        assert!(matches!(err, IngestError::UnknownProfile { .. }));

        // The item is untouched and still reviewable.
        let item = ingestor.get_item(&conn, item_id).unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.profile_override, None);
    }

    #[test]
    fn approving_unparseable_directs_to_reject_or_delete() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let item_id = ingestor
            .detect_and_map(&conn, "broken.xml", "xml", b"not xml at all")
            .unwrap()
            .item()
            .item_id;

        let err = ingestor
            .review(&conn, item_id, ReviewAction::Approve, "dr_moreno", None, None)
            .unwrap_err();
        assert!(matches!(err, IngestError::ApprovedUnparseable { .. }));
        assert!(err.to_string().contains("reject or delete"));

        // Rejecting and then deleting is the sanctioned path.
        ingestor
            .review(&conn, item_id, ReviewAction::Reject, "dr_moreno", None, None)
            .unwrap();
        ingestor.delete(&conn, item_id).unwrap();
        assert!(ingestor.get_item(&conn, item_id).unwrap().is_none());
    }

    #[test]
    fn below_floor_approval_requires_an_override() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let item_id = ingestor
            .detect_and_map(&conn, "scan_0099.xml", "xml", &below_floor_xml())
            .unwrap()
            .item()
            .item_id;

        let err = ingestor
            .review(&conn, item_id, ReviewAction::Approve, "dr_moreno", None, None)
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingProfile { .. }));

        let updated = ingestor
            .review(
                &conn,
                item_id,
                ReviewAction::Approve,
                "dr_moreno",
                None,
                Some("core_attributes_only"),
            )
            .unwrap();
        assert_eq!(updated.status, QueueStatus::Approved);
        assert!(ingestor.latest_record(&conn, item_id).unwrap().is_some());
    }

    #[test]
    fn second_decision_is_already_decided() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let item_id = ingestor
            .detect_and_map(&conn, "scan_0042.xml", "xml", &partial_header_xml())
            .unwrap()
            .item()
            .item_id;

        ingestor
            .review(&conn, item_id, ReviewAction::Reject, "dr_moreno", None, None)
            .unwrap();
        let err = ingestor
            .review(&conn, item_id, ReviewAction::Approve, "dr_chen", None, None)
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Review(ReviewError::AlreadyDecided { .. })
        ));
    }

    #[test]
    fn reject_maps_nothing() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let item_id = ingestor
            .detect_and_map(&conn, "scan_0042.xml", "xml", &partial_header_xml())
            .unwrap()
            .item()
            .item_id;

        let updated = ingestor
            .review(
                &conn,
                item_id,
                ReviewAction::Reject,
                "dr_moreno",
                Some("header is synthetic"),
                None,
            )
            .unwrap();
        assert_eq!(updated.status, QueueStatus::Rejected);
        assert!(ingestor.latest_record(&conn, item_id).unwrap().is_none());
    }

    #[test]
    fn reprocess_creates_next_version_and_retires_old_keywords() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let outcome = ingestor
            .detect_and_map(&conn, "LIDC-single-0042.xml", "xml", &single_session_xml())
            .unwrap();
        let item_id = outcome.item().item_id;
        let first = match outcome {
            IngestOutcome::AutoApproved { record, .. } => record,
            _ => panic!("expected auto-approval"),
        };

        let second = ingestor.reprocess(&conn, item_id).unwrap();
        assert_eq!(second.version, 2);
        assert_ne!(second.record_id, first.record_id);

        let versions = ingestor.record_versions(&conn, item_id).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 1);
        assert_eq!(versions[1].version, 2);

        // Occurrences moved to the new version.
        assert!(repository::occurrences_for_record(&conn, &first.record_id)
            .unwrap()
            .is_empty());
        assert!(!repository::occurrences_for_record(&conn, &second.record_id)
            .unwrap()
            .is_empty());

        // Reprocessing does not recount the document.
        let (total, _) = repository::corpus_counts(&conn).unwrap();
        assert_eq!(total, 1);

        let item = ingestor.get_item(&conn, item_id).unwrap().unwrap();
        assert_eq!(item.reprocess_count, 1);
    }

    #[test]
    fn reprocess_refuses_undecided_items() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let item_id = ingestor
            .detect_and_map(&conn, "scan_0042.xml", "xml", &partial_header_xml())
            .unwrap()
            .item()
            .item_id;

        let err = ingestor.reprocess(&conn, item_id).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Review(ReviewError::NotApproved { .. })
        ));
    }

    #[test]
    fn extract_keywords_replaces_occurrences_in_place() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let outcome = ingestor
            .detect_and_map(&conn, "LIDC-single-0042.xml", "xml", &single_session_xml())
            .unwrap();
        let record = match outcome {
            IngestOutcome::AutoApproved { record, .. } => record,
            _ => panic!("expected auto-approval"),
        };

        let first = repository::occurrences_for_record(&conn, &record.record_id).unwrap();
        let reran = ingestor.extract_keywords(&conn, record.record_id).unwrap();
        let stored = repository::occurrences_for_record(&conn, &record.record_id).unwrap();

        assert_eq!(reran.len(), first.len());
        assert_eq!(stored.len(), first.len());

        // And the corpus was not double counted by the rerun.
        let (total, _) = repository::corpus_counts(&conn).unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn extract_keywords_unknown_record_errors() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();
        let err = ingestor
            .extract_keywords(&conn, Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, IngestError::RecordNotFound { .. }));
    }

    #[test]
    fn batch_review_isolates_failures() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let mut ids = Vec::new();
        for i in 0..4 {
            let filename = format!("scan_{i:04}.xml");
            let id = ingestor
                .detect_and_map(&conn, &filename, "xml", &partial_header_xml())
                .unwrap()
                .item()
                .item_id;
            ids.push(id);
        }
        ids.push(Uuid::new_v4());

        let results =
            ingestor.batch_review(&conn, &ids, ReviewAction::Approve, "dr_moreno", None);

        assert_eq!(results.len(), 5);
        assert_eq!(results.iter().filter(|r| r.succeeded()).count(), 4);
        let failed = results.iter().find(|r| !r.succeeded()).unwrap();
        assert!(matches!(
            failed.outcome.as_ref().unwrap_err(),
            IngestError::Review(ReviewError::NotFound { .. })
        ));

        // Each approved item got its own mapped record.
        for id in &ids[..4] {
            assert!(ingestor.latest_record(&conn, *id).unwrap().is_some());
        }
    }

    #[test]
    fn pending_listing_is_most_doubtful_first() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();

        let medium = ingestor
            .detect_and_map(&conn, "scan_0042.xml", "xml", &partial_header_xml())
            .unwrap()
            .item()
            .item_id;
        let floor = ingestor
            .detect_and_map(&conn, "scan_0099.xml", "xml", &below_floor_xml())
            .unwrap()
            .item()
            .item_id;

        let pending = ingestor.list_pending(&conn).unwrap();
        let ids: Vec<Uuid> = pending.iter().map(|i| i.item_id).collect();
        assert_eq!(ids, vec![floor, medium]);

        let stats = ingestor.stats(&conn).unwrap();
        assert_eq!(stats.total_pending, 2);
        assert_eq!(stats.low_confidence_pending, 1);
        assert_eq!(stats.medium_confidence_pending, 1);
    }

    #[test]
    fn custom_reader_joins_the_registry() {
        struct HeaderOnlyReader;

        impl crate::ingest::traits::TreeReader for HeaderOnlyReader {
            fn format(&self) -> &'static str {
                "hdr"
            }

            fn can_handle(&self, format: &str) -> bool {
                format.eq_ignore_ascii_case("hdr") || format.to_ascii_lowercase().ends_with(".hdr")
            }

            fn read(&self, filename: &str, payload: &[u8]) -> Result<RawTree, IngestError> {
                let text = String::from_utf8_lossy(payload);
                let mut root = RawNode::new("export");
                let mut header = RawNode::new("ResponseHeader");
                for line in text.lines() {
                    if let Some((key, value)) = line.split_once('=') {
                        header
                            .children
                            .push(RawNode::with_text(key.trim(), value.trim()));
                    }
                }
                root.children.push(header);
                Ok(RawTree::new(filename, root))
            }
        }

        let mut readers = ReaderRegistry::with_builtin();
        readers.register(Box::new(HeaderOnlyReader));
        let ingestor = ingestor().with_readers(readers);
        let conn = open_memory_database().unwrap();

        let payload = b"Version=1.8\nMessageId=77\nDateRequest=2005-11-03\nStudyInstanceUID=1.2.3";
        let outcome = ingestor
            .detect_and_map(&conn, "minimal_export.hdr", "hdr", payload)
            .unwrap();

        let item = outcome.item();
        assert_eq!(item.format, "hdr");
        assert_eq!(item.case_id.as_deref(), Some("core_attributes_only"));
    }
}
