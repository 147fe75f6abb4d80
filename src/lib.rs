//! # pdf-intake
//!
//! Accept PDF submissions into a shared remote folder tree, one submission
//! per researcher, with the extracted text ready for downstream processing.
//!
//! A submission is an email, a shared password and one or more PDFs. Each
//! accepted PDF is stored in the submitter's folder, its text is extracted
//! in reading order (multi-column layouts included) and stored next to it,
//! and a CSV ledger in the store records who submitted what. Once a
//! submission is marked `Ready` by downstream processing, the same email is
//! denied; until then, resubmitting overwrites the previous upload.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Submission (email, password, PDFs)
//!  │
//!  ├─ 1. Validate  email pattern, shared secret, at least one file
//!  ├─ 2. Ledger    read workListFile.csv from the store (absent = empty)
//!  ├─ 3. Decide    new / overwrite / denied, per file
//!  ├─ 4. Extract   pdfium text segments → Ward column clustering → text
//!  ├─ 5. Store     {user}_{name} + {user}_{name}.txt in per-user folders
//!  └─ 6. Ledger    single write-back, retried on version conflicts
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_intake::{
//!     ingest, DriveBackend, FolderIds, IntakeConfig, PdfiumExtractor, RemoteStore,
//!     Submission, UploadedFile,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IntakeConfig::builder(FolderIds::new("originals-id", "to-process-id"), "s3cret")
//!         .build()?;
//!     let backend = DriveBackend::new(std::env::var("GOOGLE_DRIVE_TOKEN")?, Duration::from_secs(60))?;
//!     let store = RemoteStore::connect(backend, &config.auth).await?;
//!
//!     let submission = Submission {
//!         email: "jane.doe@example.org".into(),
//!         password: "s3cret".into(),
//!         files: vec![UploadedFile::new("report.pdf", std::fs::read("report.pdf")?)],
//!     };
//!     let report = ingest(&store, &PdfiumExtractor, &submission, &config).await?;
//!     for file in &report.files {
//!         println!("{}: {}", file.original_name, file.message());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-intake` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when embedding the library in a web service:
//! ```toml
//! pdf-intake = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod layout;
pub mod ledger;
pub mod output;
pub mod progress;
pub mod store;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AuthPolicy, FolderIds, IntakeConfig, IntakeConfigBuilder, RetryPolicy};
pub use error::{ExtractionError, FileError, IntakeError, StoreError, ValidationIssue};
pub use extract::{extract_text, PdfiumExtractor, TextExtractor};
pub use ingest::{ingest, Submission, UploadedFile};
pub use layout::{ColumnReconstructor, TextBlock, DEFAULT_COLUMN_THRESHOLD};
pub use ledger::{evaluate_and_apply, Decision, Ledger, LedgerRecord, Status};
pub use output::{FileOutcome, IngestionReport, IngestionStats};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::drive::DriveBackend;
pub use store::memory::MemoryBackend;
pub use store::{FileHandle, FolderId, RemoteStore, StoreBackend};
