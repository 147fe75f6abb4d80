//! Configuration for the ingestion workflow.
//!
//! Every knob lives in [`IntakeConfig`], built via [`IntakeConfigBuilder`].
//! The config is cheap to clone and carries no live connections; the store
//! handle is passed to [`crate::ingest::ingest`] separately.

use crate::error::IntakeError;
use crate::layout::DEFAULT_COLUMN_THRESHOLD;
use crate::progress::ProgressCallback;
use crate::store::FolderId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Upper bound for [`RetryPolicy::max_attempts`]; `2^16` backoff units is
/// already far beyond any sensible wait.
const MAX_LEDGER_ATTEMPTS: u32 = 16;

/// The two root folders every submission is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderIds {
    /// Root holding one folder per user with the original PDFs.
    pub originals: FolderId,
    /// Root holding one folder per user with the text artifacts, plus the ledger.
    pub to_process: FolderId,
}

impl FolderIds {
    pub fn new(originals: impl Into<String>, to_process: impl Into<String>) -> Self {
        Self {
            originals: FolderId::new(originals),
            to_process: FolderId::new(to_process),
        }
    }
}

/// Conflict-retry budget for the ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up with `MaxRetriesExceeded`. Default: 3.
    pub max_attempts: u32,
    /// Base of the exponential backoff; attempt `k` waits `2^k` units. Default: 1 s.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

/// Retry budget for establishing the store session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
    /// Default: 3.
    pub max_attempts: u32,
    /// Fixed delay between attempts. Default: 2 s.
    pub delay: Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Configuration for accepting submissions.
///
/// # Example
/// ```rust
/// use pdf_intake::{FolderIds, IntakeConfig};
///
/// let config = IntakeConfig::builder(FolderIds::new("orig-root", "proc-root"), "s3cret")
///     .ledger_file_name("workListFile.csv")
///     .ledger_max_attempts(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.ledger_retry.max_attempts, 5);
/// ```
#[derive(Clone)]
pub struct IntakeConfig {
    /// Root folders for originals and text artifacts.
    pub folders: FolderIds,

    /// Name of the ledger CSV inside the to-process root. Default: `workListFile.csv`.
    pub ledger_file_name: String,

    /// Shared secret every submitter must type.
    pub shared_password: String,

    /// Conflict-retry budget for the single ledger write per submission.
    pub ledger_retry: RetryPolicy,

    /// Session retry budget used by [`crate::store::RemoteStore::connect`].
    pub auth: AuthPolicy,

    /// Ward-distance cut for column detection, in PDF points. Default: 50.
    pub column_threshold: f64,

    /// Delete the user's previous folders before a resubmission that is
    /// allowed to overwrite. Default: true.
    ///
    /// Without this, files from an earlier submission with different names
    /// would stay next to the new ones.
    pub clean_previous_uploads: bool,

    /// Receives per-file events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for IntakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeConfig")
            .field("folders", &self.folders)
            .field("ledger_file_name", &self.ledger_file_name)
            .field("shared_password", &"<redacted>")
            .field("ledger_retry", &self.ledger_retry)
            .field("auth", &self.auth)
            .field("column_threshold", &self.column_threshold)
            .field("clean_previous_uploads", &self.clean_previous_uploads)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn IngestProgressCallback>"),
            )
            .finish()
    }
}

impl IntakeConfig {
    /// Create a builder; folders and the shared secret have no sensible default.
    pub fn builder(folders: FolderIds, shared_password: impl Into<String>) -> IntakeConfigBuilder {
        IntakeConfigBuilder {
            config: Self {
                folders,
                ledger_file_name: "workListFile.csv".to_string(),
                shared_password: shared_password.into(),
                ledger_retry: RetryPolicy::default(),
                auth: AuthPolicy::default(),
                column_threshold: DEFAULT_COLUMN_THRESHOLD,
                clean_previous_uploads: true,
                progress_callback: None,
            },
        }
    }
}

/// Builder for [`IntakeConfig`].
#[derive(Debug)]
pub struct IntakeConfigBuilder {
    config: IntakeConfig,
}

impl IntakeConfigBuilder {
    pub fn ledger_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.ledger_file_name = name.into();
        self
    }

    pub fn ledger_max_attempts(mut self, n: u32) -> Self {
        self.config.ledger_retry.max_attempts = n;
        self
    }

    pub fn ledger_backoff_unit(mut self, unit: Duration) -> Self {
        self.config.ledger_retry.backoff_unit = unit;
        self
    }

    pub fn auth_max_attempts(mut self, n: u32) -> Self {
        self.config.auth.max_attempts = n;
        self
    }

    pub fn auth_delay(mut self, delay: Duration) -> Self {
        self.config.auth.delay = delay;
        self
    }

    pub fn column_threshold(mut self, threshold: f64) -> Self {
        self.config.column_threshold = threshold;
        self
    }

    pub fn clean_previous_uploads(mut self, v: bool) -> Self {
        self.config.clean_previous_uploads = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IntakeConfig, IntakeError> {
        let c = &self.config;
        if c.folders.originals.as_str().is_empty() || c.folders.to_process.as_str().is_empty() {
            return Err(IntakeError::InvalidConfig("folder ids must not be empty".into()));
        }
        if c.folders.originals == c.folders.to_process {
            return Err(IntakeError::InvalidConfig(
                "originals and to-process folders must differ".into(),
            ));
        }
        if c.ledger_file_name.trim().is_empty() {
            return Err(IntakeError::InvalidConfig("ledger file name must not be empty".into()));
        }
        if c.shared_password.is_empty() {
            return Err(IntakeError::InvalidConfig("shared password must not be empty".into()));
        }
        if !(1..=MAX_LEDGER_ATTEMPTS).contains(&c.ledger_retry.max_attempts) {
            return Err(IntakeError::InvalidConfig(format!(
                "ledger attempts must be 1–{MAX_LEDGER_ATTEMPTS}, got {}",
                c.ledger_retry.max_attempts
            )));
        }
        if c.auth.max_attempts == 0 {
            return Err(IntakeError::InvalidConfig("auth attempts must be ≥ 1".into()));
        }
        if !c.column_threshold.is_finite() || c.column_threshold < 0.0 {
            return Err(IntakeError::InvalidConfig(format!(
                "column threshold must be a non-negative number, got {}",
                c.column_threshold
            )));
        }
        Ok(self.config)
    }
}
