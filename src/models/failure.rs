//! Ledger entries for files the pipeline gave up on.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A file that still failed after its last retry. Unparseable files do
/// not land here; they become queue items the reviewer can reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub failure_id: Uuid,
    pub filename: String,
    pub reason: String,
    /// Total attempts made, including the first.
    pub attempts: i64,
    pub failed_at: String,
}

impl FailedFile {
    pub fn new(filename: impl Into<String>, reason: impl Into<String>, attempts: i64) -> Self {
        Self {
            failure_id: Uuid::new_v4(),
            filename: filename.into(),
            reason: reason.into(),
            attempts,
            failed_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_id_and_timestamp() {
        let failure = FailedFile::new("scan_007.xml", "io error: permission denied", 3);
        assert_eq!(failure.filename, "scan_007.xml");
        assert_eq!(failure.attempts, 3);
        assert!(!failure.failed_at.is_empty());
    }
}
