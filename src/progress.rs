//! Progress-callback trait for per-file ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IntakeConfigBuilder::progress_callback`] to follow a
//! submission as each file is checked, extracted and uploaded. The CLI uses
//! it to drive a terminal progress bar; a web front-end could forward the
//! events to the browser instead.

use crate::ledger::Decision;
use std::sync::Arc;

/// Called by [`crate::ingest::ingest`] as it works through a submission.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Files are processed sequentially, but the trait is
/// `Send + Sync` so one callback can be shared between concurrent submissions.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once after validation, before the ledger is read.
    fn on_submission_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is checked against the ledger.
    ///
    /// `index` is 1-based.
    fn on_file_start(&self, index: usize, total_files: usize, file_name: &str) {
        let _ = (index, total_files, file_name);
    }

    /// Called when a file was accepted and both its copies are stored, or
    /// when it was denied (`decision` tells which).
    fn on_file_complete(&self, index: usize, total_files: usize, file_name: &str, decision: Decision) {
        let _ = (index, total_files, file_name, decision);
    }

    /// Called when a file could not be processed; the batch continues.
    fn on_file_error(&self, index: usize, total_files: usize, file_name: &str, error: &str) {
        let _ = (index, total_files, file_name, error);
    }

    /// Called once the ledger write finished.
    fn on_ledger_written(&self, ledger_rows: usize) {
        let _ = ledger_rows;
    }

    /// Called once at the end of a submission that did not fail fatally.
    fn on_submission_complete(&self, total_files: usize, accepted: usize) {
        let _ = (total_files, accepted);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IntakeConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
