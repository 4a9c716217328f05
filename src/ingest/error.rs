//! Ingestion-specific error types.
//!
//! Separate from ReviewError so queue review logic stays usable without
//! pulling in readers, mapping, or the batch pipeline.

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::keywords::VocabularyError;
use crate::queue::ReviewError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    #[error("Vocabulary error: {0}")]
    Vocabulary(#[from] VocabularyError),

    #[error("File {filename} could not be parsed: {reason}")]
    Unparseable { filename: String, reason: String },

    #[error("No reader accepts format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Unknown profile: {profile_id}")]
    UnknownProfile { profile_id: String },

    #[error(
        "Queue item {item_id} has no usable profile; set a profile override before approving"
    )]
    MissingProfile { item_id: Uuid },

    #[error("Queue item {item_id} is unparseable; reject or delete it instead of approving")]
    ApprovedUnparseable { item_id: Uuid },

    #[error("Canonical record not found: {record_id}")]
    RecordNotFound { record_id: Uuid },

    #[error("File {filename} exceeded the {seconds}s parse budget")]
    Timeout { filename: String, seconds: u64 },

    #[error("Batch cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
