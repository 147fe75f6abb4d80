//! Error types for the pdf-intake library.
//!
//! Three layers of failure, each with its own type:
//!
//! * [`IntakeError`] — **Fatal** for a submission: bad input, credentials the
//!   store rejects, a ledger that cannot be read, a ledger write that ran out
//!   of conflict retries. Returned as `Err(IntakeError)` from
//!   [`crate::ingest::ingest`].
//!
//! * [`StoreError`] — everything the remote store can report. Most variants
//!   surface through [`IntakeError::Store`]; [`StoreError::Conflict`] is the
//!   one transient signal that the ledger write retries on.
//!
//! * [`FileError`] — **Non-fatal**: one file of a batch could not be turned
//!   into text. Stored inside [`crate::output::FileOutcome`] so the other
//!   files of the same submission still go through.

use thiserror::Error;

/// All fatal errors returned by the ingestion workflow.
#[derive(Debug, Error)]
pub enum IntakeError {
    // ── Session errors ────────────────────────────────────────────────────
    /// The store rejected our credentials on every attempt.
    #[error("Authentication with the file store failed after {attempts} attempts: {detail}")]
    AuthenticationFailed { attempts: u32, detail: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// The submission did not pass validation; no store I/O was attempted.
    #[error("Submission rejected: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),

    // ── Ledger errors ─────────────────────────────────────────────────────
    /// The stored ledger is missing a required column or holds an unknown status.
    #[error("Ledger is malformed: {0}")]
    MalformedLedger(String),

    // ── Store errors ──────────────────────────────────────────────────────
    /// A remote store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IntakeError {
    /// Message suitable for the person who submitted the form.
    ///
    /// Store internals are hidden; the wording tells the user whether trying
    /// again makes sense.
    pub fn user_message(&self) -> String {
        match self {
            IntakeError::Validation(issues) => join_issues(issues),
            IntakeError::AuthenticationFailed { .. } => {
                "The document store is unavailable right now. Please try again later.".into()
            }
            IntakeError::Store(StoreError::MaxRetriesExceeded { .. }) => {
                "Your files were uploaded but the submission register is busy. \
                 Please submit again in a few minutes."
                    .into()
            }
            IntakeError::Store(_) | IntakeError::MalformedLedger(_) => {
                "The upload could not be completed. Please try again.".into()
            }
            IntakeError::InvalidConfig(_) => {
                "The uploader is misconfigured. Please contact the administrator.".into()
            }
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One reason a submission failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ValidationIssue {
    #[error("enter a valid email address")]
    InvalidEmail,

    #[error("check that your password is correct")]
    WrongPassword,

    #[error("attach at least one PDF file")]
    NoFiles,
}

/// Errors reported by a [`crate::store::StoreBackend`] or the
/// [`crate::store::RemoteStore`] protocols built on top of it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file changed remotely since we last read its metadata.
    #[error("Write conflict on '{name}': the remote version changed")]
    Conflict { name: String },

    /// A referenced file or folder does not exist.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Credentials were rejected (HTTP 401/403).
    #[error("Store rejected credentials: {detail}")]
    Unauthorized { detail: String },

    /// Any other non-success HTTP status.
    #[error("Store returned HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    /// The request never produced a response (DNS, TLS, timeout, …).
    #[error("Store request failed: {0}")]
    Transport(String),

    /// A tabular file exists but is not valid CSV.
    #[error("File '{name}' is not valid CSV: {detail}")]
    MalformedTabular { name: String, detail: String },

    /// Every attempt of a conflict-retried write hit a conflict.
    ///
    /// The caller must not assume the data was persisted.
    #[error("Gave up writing '{name}' after {attempts} conflicting attempts")]
    MaxRetriesExceeded { name: String, attempts: u32 },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => StoreError::Http {
                status: status.as_u16(),
                detail: e.to_string(),
            },
            None => StoreError::Transport(e.to_string()),
        }
    }
}

/// Failure to turn PDF bytes into text blocks.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ExtractionError {
    /// The bytes do not start with the `%PDF` magic.
    #[error("not a PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// The document is encrypted.
    #[error("PDF is password protected")]
    PasswordProtected,

    /// pdfium could not parse the document.
    #[error("PDF is corrupt: {detail}")]
    Corrupt { detail: String },

    /// The pdfium library could not be bound or the worker panicked.
    #[error("text extraction failed: {0}")]
    Internal(String),
}

/// A non-fatal error for a single submitted file.
///
/// The rest of the batch continues; the file's ledger change is discarded.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    #[error("{file}: {source}")]
    Extraction {
        file: String,
        #[source]
        source: ExtractionError,
    },
}
