//! Result types returned by [`crate::ingest::ingest`].

use crate::error::FileError;
use crate::ledger::Decision;
use crate::store::FileHandle;
use serde::{Deserialize, Serialize};

/// What happened to one submitted file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    /// Name as uploaded.
    pub original_name: String,
    /// `{user_key}_{original}.txt`, the name recorded in the ledger.
    pub artifact_name: String,
    /// Ledger decision; `None` only if the file never reached the ledger check.
    pub decision: Option<Decision>,
    /// Stored copy of the PDF in the originals root.
    pub pdf: Option<FileHandle>,
    /// Stored text artifact in the to-process root.
    pub text: Option<FileHandle>,
    /// Set when the file was accepted but could not be converted.
    pub error: Option<FileError>,
}

impl FileOutcome {
    pub(crate) fn new(original_name: &str, artifact_name: String) -> Self {
        Self {
            original_name: original_name.to_string(),
            artifact_name,
            decision: None,
            pdf: None,
            text: None,
            error: None,
        }
    }

    /// Both copies stored and the ledger updated for this file.
    pub fn is_stored(&self) -> bool {
        self.error.is_none() && self.pdf.is_some() && self.text.is_some()
    }

    /// Message for the submitter.
    pub fn message(&self) -> String {
        match (&self.error, self.decision) {
            (Some(e), _) => format!("Failed: {e}"),
            (None, Some(d)) => d.message().to_string(),
            (None, None) => "Not processed.".to_string(),
        }
    }
}

/// Counters for one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionStats {
    pub total_files: usize,
    pub accepted: usize,
    pub denied: usize,
    pub failed: usize,
    /// Ledger rows after the write (or as read, if nothing was written).
    pub ledger_rows: usize,
    pub total_duration_ms: u64,
}

/// Full result of a submission that did not fail fatally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub user_key: String,
    pub files: Vec<FileOutcome>,
    /// The ledger file, if it was written.
    pub ledger: Option<FileHandle>,
    pub stats: IngestionStats,
}
