//! File ingestion pipeline.
//!
//! Takes raw annotation exports from bytes on disk to reviewed canonical
//! records:
//!
//! ```text
//! readers -> detect -> queue -> (review) -> mapping -> keywords
//! ```
//!
//! The `Ingestor` facade owns the readers, the profile registry, and the
//! storage trait objects; `batch` fans single-file ingestion out over a
//! worker pool. Every file ends in exactly one place: an auto-approved
//! record, a queue item awaiting review, or the failure ledger.

pub mod error;
pub mod config;
pub mod traits;
pub mod readers;
pub mod store;
pub mod runner;
pub mod batch;

pub use error::IngestError;
pub use config::IngestConfig;
pub use traits::*;
pub use readers::{JsonTreeReader, ReaderRegistry, XmlTreeReader};
pub use store::{SqliteFailureLedger, SqliteKeywordStore, SqliteQueueStore, SqliteRecordStore};
pub use runner::{BatchReviewResult, IngestOutcome, Ingestor};
pub use batch::{collect_source_files, run_batch, BatchEvent, BatchReport, SourceFile};
