//! Batch ingestion over a worker pool.
//!
//! Parsing, detection, and mapping are pure, so they fan out across
//! worker threads; all database writes stay on the calling thread, which
//! owns the connection. Workers pull files from a shared deque, push
//! finished work over a channel, and the caller persists each result as
//! it arrives.
//!
//! Vocabulary and corpus statistics are loaded once per batch. Files in
//! the same run score against that snapshot, so a term's document
//! frequency lags by at most one batch.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::DatabaseError;
use crate::detect::detect_case;
use crate::keywords::{extract_keywords, CorpusView, Vocabulary};
use crate::mapping::map_record;
use crate::models::{
    CanonicalRecord, DetectionResult, FailedFile, KeywordOccurrence, QueueItem, RawTree,
};
use crate::queue::qualifies_for_auto_approval;

use super::error::IngestError;
use super::readers::ReaderRegistry;
use super::runner::{build_item, term_counts, Ingestor};
use super::traits::FailureLedger;

/// One file handed to the batch: raw bytes plus how to read them.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    pub format: String,
    pub payload: Vec<u8>,
}

/// Progress callbacks emitted from the persisting thread, in completion
/// order.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started { file_count: usize },
    FileFinished { filename: String, approved: bool },
    FileFailed { filename: String, reason: String },
    Completed {
        approved: usize,
        queued: usize,
        failed: usize,
        duration_ms: u64,
    },
}

/// Outcome tally for one batch run. Every input file lands in exactly
/// one bucket: approved (record mapped), queued (awaiting review, which
/// includes unparseable files), or failed (in the failure ledger).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub approved: usize,
    pub queued: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn empty() -> Self {
        Self {
            total: 0,
            approved: 0,
            queued: 0,
            failed: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// Work finished by a parse worker, waiting for persistence.
struct FileWork {
    filename: String,
    payload: Arc<Vec<u8>>,
    result: WorkResult,
}

enum WorkResult {
    /// Cleared the auto-approval threshold; record and keywords mapped.
    Auto {
        item: QueueItem,
        record: CanonicalRecord,
        occurrences: Vec<KeywordOccurrence>,
        term_counts: Vec<(String, i64)>,
    },
    /// Needs review: low confidence, no match, or unparseable.
    Pending { item: QueueItem },
    /// Never reached the queue; goes straight to the failure ledger.
    Failed { reason: String },
}

/// Scan a directory for files some registered reader claims, sorted by
/// filename. Unclaimed files are skipped, not failed.
pub fn collect_source_files(
    readers: &ReaderRegistry,
    dir: &Path,
) -> Result<Vec<SourceFile>, IngestError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let reader = match readers.reader_for(&filename) {
            Some(reader) => reader,
            None => {
                debug!(%filename, "no reader claims file; skipped");
                continue;
            }
        };
        files.push(SourceFile {
            format: reader.format().to_string(),
            payload: std::fs::read(&path)?,
            filename,
        });
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

/// Run one batch. Returns the tally; only a cancellation before any work
/// starts or a failure loading the vocabulary snapshot aborts the run.
///
/// Cancellation mid-run is graceful: workers stop pulling new files,
/// already-parsed work is still persisted, and the unprocessed remainder
/// is reported in `errors`.
pub fn run_batch(
    ingestor: &Ingestor,
    conn: &Connection,
    files: Vec<SourceFile>,
    cancel: &AtomicBool,
    progress_fn: Option<&dyn Fn(BatchEvent)>,
) -> Result<BatchReport, IngestError> {
    if cancel.load(Ordering::Relaxed) {
        return Err(IngestError::Cancelled);
    }
    if files.is_empty() {
        return Ok(BatchReport::empty());
    }

    let started = Instant::now();
    let total = files.len();
    let worker_count = ingestor.config.worker_count.clamp(1, total);
    emit(progress_fn, BatchEvent::Started { file_count: total });
    info!(total, worker_count, "batch started");

    let vocabulary = Arc::new(ingestor.keywords.load_vocabulary(conn)?);
    let corpus = Arc::new(ingestor.keywords.corpus_view(conn)?);

    let pending = Mutex::new(VecDeque::from(files));
    let mut report = BatchReport::empty();
    report.total = total;

    std::thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<FileWork>();
        for _ in 0..worker_count {
            let tx = tx.clone();
            let vocabulary = Arc::clone(&vocabulary);
            let corpus = Arc::clone(&corpus);
            let pending = &pending;
            scope.spawn(move || {
                loop {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let file = {
                        let mut locked = match pending.lock() {
                            Ok(locked) => locked,
                            Err(_) => break,
                        };
                        locked.pop_front()
                    };
                    let file = match file {
                        Some(file) => file,
                        None => break,
                    };
                    let work = process_file(ingestor, &vocabulary, &corpus, file);
                    if tx.send(work).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        // Persist on this thread; the workers never touch the connection.
        for work in rx {
            persist_work(ingestor, conn, work, &mut report, progress_fn);
        }
    });

    let leftover = pending
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .len();
    if leftover > 0 {
        report
            .errors
            .push(format!("Cancelled with {leftover} files unprocessed"));
        warn!(leftover, "batch cancelled before finishing");
    }

    report.duration_ms = started.elapsed().as_millis() as u64;
    emit(
        progress_fn,
        BatchEvent::Completed {
            approved: report.approved,
            queued: report.queued,
            failed: report.failed,
            duration_ms: report.duration_ms,
        },
    );
    info!(
        approved = report.approved,
        queued = report.queued,
        failed = report.failed,
        duration_ms = report.duration_ms,
        "batch finished"
    );
    Ok(report)
}

/// Parse, detect, and (when auto-approvable) map one file. Pure with
/// respect to the database.
fn process_file(
    ingestor: &Ingestor,
    vocabulary: &Vocabulary,
    corpus: &CorpusView,
    file: SourceFile,
) -> FileWork {
    let payload = Arc::new(file.payload);
    let label = match ingestor.readers.reader_for(&file.format) {
        Some(reader) => reader.format(),
        None => {
            return FileWork {
                result: WorkResult::Failed {
                    reason: IngestError::UnsupportedFormat {
                        format: file.format,
                    }
                    .to_string(),
                },
                payload,
                filename: file.filename,
            };
        }
    };

    let parsed = parse_with_timeout(
        Arc::clone(&ingestor.readers),
        label,
        &file.filename,
        Arc::clone(&payload),
        ingestor.config.file_timeout_secs,
    );

    let result = match parsed {
        Ok(tree) => {
            let detection = detect_case(&tree, &ingestor.registry, ingestor.config.detection_floor);
            let profile = detection
                .case_id
                .as_deref()
                .and_then(|id| ingestor.registry.get(id));
            match profile {
                Some(profile)
                    if qualifies_for_auto_approval(
                        detection.confidence,
                        ingestor.config.auto_approve_threshold,
                    ) =>
                {
                    let item = build_item(&file.filename, label, detection, true);
                    let record = map_record(&tree, profile, item.item_id, 1);
                    let occurrences = extract_keywords(
                        &record,
                        profile,
                        vocabulary,
                        corpus,
                        ingestor.config.cross_validation_boost,
                    );
                    let counts = term_counts(&occurrences);
                    WorkResult::Auto {
                        item,
                        record,
                        occurrences,
                        term_counts: counts,
                    }
                }
                _ => WorkResult::Pending {
                    item: build_item(&file.filename, label, detection, false),
                },
            }
        }
        Err(IngestError::Unparseable { reason, .. }) => WorkResult::Pending {
            item: build_item(
                &file.filename,
                label,
                DetectionResult::unparseable(reason),
                false,
            ),
        },
        Err(IngestError::Timeout { seconds, .. }) => WorkResult::Pending {
            item: build_item(
                &file.filename,
                label,
                DetectionResult::unparseable(format!("parse exceeded the {seconds}s budget")),
                false,
            ),
        },
        Err(other) => WorkResult::Failed {
            reason: other.to_string(),
        },
    };

    FileWork {
        result,
        payload,
        filename: file.filename,
    }
}

/// Parse on a disposable thread so a pathological file cannot stall its
/// worker. On timeout the thread is abandoned; it exits on its own once
/// the parse returns.
fn parse_with_timeout(
    readers: Arc<ReaderRegistry>,
    format: &str,
    filename: &str,
    payload: Arc<Vec<u8>>,
    timeout_secs: u64,
) -> Result<RawTree, IngestError> {
    let (tx, rx) = mpsc::channel();
    let format = format.to_string();
    let owned_filename = filename.to_string();
    std::thread::spawn(move || {
        let result = match readers.reader_for(&format) {
            Some(reader) => reader.read(&owned_filename, &payload),
            None => Err(IngestError::UnsupportedFormat { format }),
        };
        let _ = tx.send(result);
    });

    match rx.recv_timeout(Duration::from_secs(timeout_secs)) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(IngestError::Timeout {
            filename: filename.to_string(),
            seconds: timeout_secs,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(IngestError::Unparseable {
            filename: filename.to_string(),
            reason: "reader thread panicked".to_string(),
        }),
    }
}

fn persist_work(
    ingestor: &Ingestor,
    conn: &Connection,
    work: FileWork,
    report: &mut BatchReport,
    progress_fn: Option<&dyn Fn(BatchEvent)>,
) {
    let attempts = ingestor.config.store_retries;
    let backoff = Duration::from_millis(ingestor.config.store_retry_backoff_ms);

    match work.result {
        WorkResult::Failed { reason } => {
            fail_file(
                ingestor.failures.as_ref(),
                conn,
                report,
                progress_fn,
                &work.filename,
                reason,
                1,
            );
        }
        WorkResult::Pending { item } => {
            match with_retries(attempts, backoff, || {
                ingestor.queue.enqueue(conn, &item, &work.payload)
            }) {
                Ok(()) => {
                    report.queued += 1;
                    emit(
                        progress_fn,
                        BatchEvent::FileFinished {
                            filename: work.filename,
                            approved: false,
                        },
                    );
                }
                Err(err) => fail_file(
                    ingestor.failures.as_ref(),
                    conn,
                    report,
                    progress_fn,
                    &work.filename,
                    err.to_string(),
                    attempts as i64,
                ),
            }
        }
        WorkResult::Auto {
            item,
            record,
            occurrences,
            term_counts,
        } => {
            if let Err(err) = with_retries(attempts, backoff, || {
                ingestor.queue.enqueue(conn, &item, &work.payload)
            }) {
                fail_file(
                    ingestor.failures.as_ref(),
                    conn,
                    report,
                    progress_fn,
                    &work.filename,
                    err.to_string(),
                    attempts as i64,
                );
                return;
            }
            report.approved += 1;

            if let Err(err) = with_retries(attempts, backoff, || {
                ingestor.records.insert(conn, &record)
            }) {
                // The item is approved but has no record yet; reprocess
                // recovers it.
                warn!(
                    filename = %work.filename,
                    item_id = %item.item_id,
                    %err,
                    "approved item stored without its record"
                );
                report.errors.push(format!(
                    "{}: approved but record not stored ({err}); reprocess item {}",
                    work.filename, item.item_id
                ));
            } else if let Err(err) = with_retries(attempts, backoff, || {
                ingestor
                    .keywords
                    .delete_occurrences_for_record(conn, record.record_id)?;
                ingestor.keywords.insert_occurrences(conn, &occurrences)?;
                ingestor.keywords.bump_corpus(conn, &term_counts)
            }) {
                warn!(
                    record_id = %record.record_id,
                    %err,
                    "keyword persistence failed; record kept without keywords"
                );
            }

            emit(
                progress_fn,
                BatchEvent::FileFinished {
                    filename: work.filename,
                    approved: true,
                },
            );
        }
    }
}

fn fail_file(
    ledger: &dyn FailureLedger,
    conn: &Connection,
    report: &mut BatchReport,
    progress_fn: Option<&dyn Fn(BatchEvent)>,
    filename: &str,
    reason: String,
    attempts: i64,
) {
    warn!(filename, %reason, "file failed; recording in the ledger");
    let failure = FailedFile::new(filename, reason.clone(), attempts);
    if let Err(err) = ledger.record_failure(conn, &failure) {
        warn!(filename, %err, "failure ledger write failed");
    }
    report.failed += 1;
    report.errors.push(format!("{filename}: {reason}"));
    emit(
        progress_fn,
        BatchEvent::FileFailed {
            filename: filename.to_string(),
            reason,
        },
    );
}

/// Run `op` up to `attempts` times with a fixed pause between tries.
fn with_retries<F>(attempts: u32, backoff: Duration, mut op: F) -> Result<(), DatabaseError>
where
    F: FnMut() -> Result<(), DatabaseError>,
{
    for attempt in 1..attempts {
        match op() {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!(attempt, %err, "store write failed; retrying");
                std::thread::sleep(backoff);
            }
        }
    }
    op()
}

fn emit(progress_fn: Option<&dyn Fn(BatchEvent)>, event: BatchEvent) {
    if let Some(callback) = progress_fn {
        callback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository;
    use crate::db::sqlite::open_memory_database;
    use crate::ingest::config::IngestConfig;
    use crate::ingest::traits::TreeReader;
    use crate::models::{QueueStatus, RawNode, RawTree};
    use crate::profiles::ProfileRegistry;
    use std::cell::RefCell;

    fn ingestor() -> Ingestor {
        Ingestor::new(ProfileRegistry::builtin().clone(), IngestConfig::default())
    }

    fn auto_file(filename: &str) -> SourceFile {
        SourceFile {
            filename: filename.to_string(),
            format: "xml".to_string(),
            payload: br#"<LidcReadMessage>
  <ResponseHeader>
    <Version>1.8.1</Version>
    <MessageId>1789</MessageId>
    <DateRequest>2005-11-03</DateRequest>
    <TimeRequest>12:08:30</TimeRequest>
    <StudyInstanceUID>1.3.6.1.4.1.14519.5.1</StudyInstanceUID>
    <SeriesInstanceUid>1.3.6.1.4.1.14519.5.2</SeriesInstanceUid>
  </ResponseHeader>
  <readingSession>
    <annotationVersion>3.12</annotationVersion>
    <servicingRadiologistID>anon-1</servicingRadiologistID>
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
    </unblindedReadNodule>
    <impression>Pulmonary nodule with spiculation, irregular margin,
      calcification; concerning for malignancy.</impression>
  </readingSession>
</LidcReadMessage>"#
                .to_vec(),
        }
    }

    fn review_file(filename: &str) -> SourceFile {
        SourceFile {
            filename: filename.to_string(),
            format: "xml".to_string(),
            payload: br#"<LidcReadMessage>
  <ResponseHeader>
    <Version>1.8.1</Version>
    <MessageId>1789</MessageId>
    <DateRequest>2005-11-03</DateRequest>
    <StudyInstanceUID>1.3.6.1.4.1.14519.5.1</StudyInstanceUID>
  </ResponseHeader>
</LidcReadMessage>"#
                .to_vec(),
        }
    }

    fn broken_file(filename: &str) -> SourceFile {
        SourceFile {
            filename: filename.to_string(),
            format: "xml".to_string(),
            payload: b"<LidcReadMessage><oops>".to_vec(),
        }
    }

    #[test]
    fn mixed_batch_lands_every_file_in_one_bucket() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();
        let cancel = AtomicBool::new(false);
        let events: RefCell<Vec<BatchEvent>> = RefCell::new(Vec::new());
        let on_event = |event: BatchEvent| events.borrow_mut().push(event);

        let files = vec![
            auto_file("LIDC-single-0001.xml"),
            review_file("scan_0002.xml"),
            broken_file("scan_0003.xml"),
        ];
        let report = run_batch(&ingestor, &conn, files, &cancel, Some(&on_event)).unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.approved, 1);
        assert_eq!(report.queued, 2);
        assert_eq!(report.failed, 0);
        assert!(report.errors.is_empty());

        let all = repository::list_queue_items(&conn, None).unwrap();
        assert_eq!(all.len(), 3);
        let approved = repository::list_queue_items(&conn, Some(QueueStatus::Approved)).unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].filename, "LIDC-single-0001.xml");

        // The approved file has its record and corpus entry.
        let record = repository::latest_record_for_source(&conn, &approved[0].item_id)
            .unwrap()
            .unwrap();
        assert_eq!(record.version, 1);
        let (total, _) = repository::corpus_counts(&conn).unwrap();
        assert_eq!(total, 1);

        // The broken file is queued as unparseable, not failed.
        let pending = repository::list_pending_queue_items(&conn).unwrap();
        let broken = pending
            .iter()
            .find(|i| i.filename == "scan_0003.xml")
            .unwrap();
        assert!(broken.detection.is_unparseable());
        assert!(repository::list_failed_files(&conn).unwrap().is_empty());

        let events = events.into_inner();
        assert!(matches!(events[0], BatchEvent::Started { file_count: 3 }));
        assert!(matches!(events.last(), Some(BatchEvent::Completed { .. })));
        let finished = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::FileFinished { .. }))
            .count();
        assert_eq!(finished, 3);
    }

    #[test]
    fn empty_batch_short_circuits() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();
        let cancel = AtomicBool::new(false);

        let report = run_batch(&ingestor, &conn, Vec::new(), &cancel, None).unwrap();
        assert_eq!(report, BatchReport::empty());
    }

    #[test]
    fn cancelled_before_start_runs_nothing() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();
        let cancel = AtomicBool::new(true);

        let err = run_batch(
            &ingestor,
            &conn,
            vec![review_file("scan_0001.xml")],
            &cancel,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::Cancelled));
        assert!(repository::list_queue_items(&conn, None).unwrap().is_empty());
    }

    #[test]
    fn unclaimed_format_lands_in_the_failure_ledger() {
        let conn = open_memory_database().unwrap();
        let ingestor = ingestor();
        let cancel = AtomicBool::new(false);

        let files = vec![SourceFile {
            filename: "notes.txt".to_string(),
            format: "txt".to_string(),
            payload: b"free text".to_vec(),
        }];
        let report = run_batch(&ingestor, &conn, files, &cancel, None).unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.queued, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("notes.txt"));

        let failures = repository::list_failed_files(&conn).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].filename, "notes.txt");
        assert!(repository::list_queue_items(&conn, None).unwrap().is_empty());
    }

    #[test]
    fn slow_parse_is_queued_as_unparseable() {
        struct StallingReader;

        impl TreeReader for StallingReader {
            fn format(&self) -> &'static str {
                "slow"
            }

            fn can_handle(&self, format: &str) -> bool {
                format == "slow"
            }

            fn read(&self, filename: &str, _payload: &[u8]) -> Result<RawTree, IngestError> {
                std::thread::sleep(Duration::from_secs(5));
                Ok(RawTree::new(filename, RawNode::new("never")))
            }
        }

        let mut readers = ReaderRegistry::with_builtin();
        readers.register(Box::new(StallingReader));
        let ingestor = Ingestor::new(
            ProfileRegistry::builtin().clone(),
            IngestConfig {
                file_timeout_secs: 1,
                ..IngestConfig::default()
            },
        )
        .with_readers(readers);

        let conn = open_memory_database().unwrap();
        let cancel = AtomicBool::new(false);
        let files = vec![SourceFile {
            filename: "molasses.slow".to_string(),
            format: "slow".to_string(),
            payload: b"anything".to_vec(),
        }];

        let report = run_batch(&ingestor, &conn, files, &cancel, None).unwrap();

        assert_eq!(report.queued, 1);
        assert_eq!(report.failed, 0);
        let pending = repository::list_pending_queue_items(&conn).unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].detection.is_unparseable());
        assert!(pending[0]
            .detection
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("budget"));
    }

    #[test]
    fn collect_source_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_scan.xml"), b"<a/>").unwrap();
        std::fs::write(dir.path().join("a_scan.XML"), b"<a/>").unwrap();
        std::fs::write(dir.path().join("export.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();

        let readers = ReaderRegistry::with_builtin();
        let files = collect_source_files(&readers, dir.path()).unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a_scan.XML", "b_scan.xml", "export.json"]);
        assert_eq!(files[0].format, "xml");
        assert_eq!(files[2].format, "json");
    }

    #[test]
    fn single_worker_config_still_processes_everything() {
        let conn = open_memory_database().unwrap();
        let ingestor = Ingestor::new(
            ProfileRegistry::builtin().clone(),
            IngestConfig {
                worker_count: 1,
                ..IngestConfig::default()
            },
        );
        let cancel = AtomicBool::new(false);

        let files = vec![
            review_file("scan_0001.xml"),
            review_file("scan_0002.xml"),
            review_file("scan_0003.xml"),
        ];
        let report = run_batch(&ingestor, &conn, files, &cancel, None).unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.queued, 3);
        assert_eq!(
            repository::list_queue_items(&conn, Some(QueueStatus::Pending))
                .unwrap()
                .len(),
            3
        );
    }
}
