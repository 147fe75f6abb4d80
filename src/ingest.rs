//! The end-to-end "accept one submission" operation.
//!
//! ```text
//! Submission
//!  │
//!  ├─ 1. Validate   email pattern, shared secret, at least one file
//!  ├─ 2. Ledger     fetch fresh from the to-process root (absent = empty)
//!  ├─ 3. Per file   decide on a ledger copy → extract text → store PDF + text
//!  │                → commit the ledger copy
//!  └─ 4. Ledger     one conflict-retried write if anything was accepted
//! ```
//!
//! A file whose text cannot be extracted is reported in its
//! [`FileOutcome`] and leaves no trace in the store or the ledger. Any store
//! error inside the loop ends the submission; files uploaded before it stay
//! where they are, and resubmitting is safe because every write replaces
//! the file of the same name.

use crate::config::IntakeConfig;
use crate::error::{FileError, IntakeError, StoreError};
use crate::extract::{extract_text, TextExtractor};
use crate::layout::ColumnReconstructor;
use crate::ledger::{self, Ledger, Status};
use crate::output::{FileOutcome, IngestionReport, IngestionStats};
use crate::store::{FolderId, RemoteStore, StoreBackend};
use crate::validate::validate_submission;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

const PDF_MIME: &str = "application/pdf";
const TEXT_MIME: &str = "text/plain";

/// One uploaded file.
#[derive(Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Everything a submitter sends through the form.
#[derive(Clone)]
pub struct Submission {
    pub email: String,
    pub password: String,
    pub files: Vec<UploadedFile>,
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("files", &self.files)
            .finish()
    }
}

/// The user's folders under both roots, created on first use.
struct UserFolders {
    originals: FolderId,
    to_process: FolderId,
}

/// Accept one submission.
///
/// # Returns
/// `Ok(IngestionReport)` whenever the submission was processed, even if
/// every file was denied or failed extraction (see `report.files`).
///
/// # Errors
/// * [`IntakeError::Validation`] before any store I/O;
/// * [`IntakeError::MalformedLedger`] if the stored ledger cannot be read;
/// * [`IntakeError::Store`] for store failures, including
///   [`StoreError::MaxRetriesExceeded`] on the final ledger write. In that
///   case the files of this submission are already stored.
pub async fn ingest<B, E>(
    store: &RemoteStore<B>,
    extractor: &E,
    submission: &Submission,
    config: &IntakeConfig,
) -> Result<IngestionReport, IntakeError>
where
    B: StoreBackend,
    E: TextExtractor + ?Sized,
{
    let total_start = Instant::now();
    let email = submission.email.trim();
    let total = submission.files.len();

    // ── Step 1: Validate ─────────────────────────────────────────────────
    let issues = validate_submission(email, &submission.password, &config.shared_password, total);
    if !issues.is_empty() {
        info!("Submission rejected: {} validation issue(s)", issues.len());
        return Err(IntakeError::Validation(issues));
    }

    let user_key = ledger::user_key(email);
    info!("Starting submission for '{}' with {} file(s)", user_key, total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_submission_start(total);
    }

    // ── Step 2: Fetch ledger ─────────────────────────────────────────────
    let mut ledger = fetch_ledger(store, config).await?;
    debug!("Ledger has {} record(s)", ledger.len());

    let clean_first = config.clean_previous_uploads
        && ledger.find(email).is_some_and(|r| r.status != Status::Ready);

    // ── Step 3: Per-file processing ──────────────────────────────────────
    let reconstructor = ColumnReconstructor::new(config.column_threshold);
    let mut folders: Option<UserFolders> = None;
    let mut files = Vec::with_capacity(total);
    let mut stats = IngestionStats {
        total_files: total,
        ..Default::default()
    };

    for (i, file) in submission.files.iter().enumerate() {
        let index = i + 1;
        if let Some(ref cb) = config.progress_callback {
            cb.on_file_start(index, total, &file.name);
        }

        let artifact = ledger::artifact_name(email, &file.name);
        let mut outcome = FileOutcome::new(&file.name, artifact.clone());

        let (decision, candidate) = ledger::evaluate_and_apply(ledger.clone(), email, &artifact);
        outcome.decision = Some(decision);

        if !decision.is_accepted() {
            info!("'{}': {}", file.name, decision);
            stats.denied += 1;
            if let Some(ref cb) = config.progress_callback {
                cb.on_file_complete(index, total, &file.name, decision);
            }
            files.push(outcome);
            continue;
        }

        let text = match extract_text(extractor, &reconstructor, &file.bytes).await {
            Ok(text) => text,
            Err(source) => {
                let error = FileError::Extraction {
                    file: file.name.clone(),
                    source,
                };
                warn!("Skipping '{}': {}", file.name, error);
                stats.failed += 1;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_file_error(index, total, &file.name, &error.to_string());
                }
                outcome.error = Some(error);
                files.push(outcome);
                continue;
            }
        };
        debug!("'{}': extracted {} chars", file.name, text.len());

        let user = match folders {
            Some(ref user) => user,
            None => &*folders.insert(prepare_user_folders(store, config, &user_key, clean_first).await?),
        };

        let pdf_name = ledger::stored_pdf_name(email, &file.name);
        outcome.pdf = Some(
            store
                .write_file(&user.originals, &pdf_name, PDF_MIME, file.bytes.clone())
                .await?,
        );
        outcome.text = Some(
            store
                .write_file(&user.to_process, &artifact, TEXT_MIME, text.into_bytes())
                .await?,
        );

        ledger = candidate;
        stats.accepted += 1;
        info!("'{}': {}", file.name, decision);
        if let Some(ref cb) = config.progress_callback {
            cb.on_file_complete(index, total, &file.name, decision);
        }
        files.push(outcome);
    }

    // ── Step 4: Write ledger ─────────────────────────────────────────────
    let ledger_handle = if stats.accepted > 0 {
        let handle = store
            .write_tabular_with_retry(
                &config.folders.to_process,
                &config.ledger_file_name,
                &ledger.to_table(),
                &config.ledger_retry,
            )
            .await?;
        if let Some(ref cb) = config.progress_callback {
            cb.on_ledger_written(ledger.len());
        }
        Some(handle)
    } else {
        debug!("Nothing accepted; ledger left untouched");
        None
    };

    stats.ledger_rows = ledger.len();
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Submission for '{}' done: {} accepted, {} denied, {} failed in {}ms",
        user_key, stats.accepted, stats.denied, stats.failed, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_submission_complete(total, stats.accepted);
    }

    Ok(IngestionReport {
        user_key,
        files,
        ledger: ledger_handle,
        stats,
    })
}

async fn fetch_ledger<B: StoreBackend>(
    store: &RemoteStore<B>,
    config: &IntakeConfig,
) -> Result<Ledger, IntakeError> {
    match store
        .read_tabular(&config.folders.to_process, &config.ledger_file_name)
        .await
    {
        Ok(Some(table)) => Ledger::from_table(&table),
        Ok(None) => Ok(Ledger::default()),
        Err(StoreError::NotFound { what }) => {
            info!("Ledger not found ({}); starting empty", what);
            Ok(Ledger::default())
        }
        Err(e) => Err(e.into()),
    }
}

async fn prepare_user_folders<B: StoreBackend>(
    store: &RemoteStore<B>,
    config: &IntakeConfig,
    user_key: &str,
    clean_first: bool,
) -> Result<UserFolders, StoreError> {
    let roots = &config.folders;
    if clean_first {
        info!("Removing previous uploads of '{}'", user_key);
        store.delete_folder_if_exists(&roots.originals, user_key).await?;
        store.delete_folder_if_exists(&roots.to_process, user_key).await?;
    }
    Ok(UserFolders {
        originals: store.ensure_folder(&roots.originals, user_key).await?,
        to_process: store.ensure_folder(&roots.to_process, user_key).await?,
    })
}
