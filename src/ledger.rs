//! The submission ledger and its one-record-per-email policy.
//!
//! The ledger is a CSV file (`file_name,email,status`) shared by every
//! submission. It is always fetched fresh from the store, changed in memory
//! by [`evaluate_and_apply`], and written back once per submission.

use crate::error::IntakeError;
use crate::store::Table;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Column order written to the store.
pub const LEDGER_COLUMNS: [&str; 3] = ["file_name", "email", "status"];

/// Processing state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Waiting for downstream processing; the user may still resubmit.
    Process,
    /// Processing finished; further submissions are refused.
    Ready,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Process => "Process",
            Status::Ready => "Ready",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Process" => Ok(Status::Process),
            "Ready" => Ok(Status::Ready),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// One row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub file_name: String,
    pub email: String,
    pub status: Status,
}

impl LedgerRecord {
    pub fn user_key(&self) -> String {
        user_key(&self.email)
    }
}

/// Ordered collection of records keyed by email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    records: Vec<LedgerRecord>,
}

impl Ledger {
    pub fn new(records: Vec<LedgerRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[LedgerRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The authoritative record for `email` (the first one, if the stored
    /// file was edited by hand and holds duplicates).
    pub fn find(&self, email: &str) -> Option<&LedgerRecord> {
        self.records.iter().find(|r| r.email == email)
    }

    fn position(&self, email: &str) -> Option<usize> {
        self.records.iter().position(|r| r.email == email)
    }

    /// Build a ledger from a stored table.
    ///
    /// Columns are located by header name; extra columns are ignored.
    pub fn from_table(table: &Table) -> Result<Self, IntakeError> {
        let col = |name: &str| {
            table
                .column(name)
                .ok_or_else(|| IntakeError::MalformedLedger(format!("missing column '{name}'")))
        };
        let (file_col, email_col, status_col) = (col("file_name")?, col("email")?, col("status")?);

        let mut records = Vec::with_capacity(table.rows.len());
        for (i, row) in table.rows.iter().enumerate() {
            let cell = |c: usize| row.get(c).map(String::as_str).unwrap_or_default();
            let status = cell(status_col)
                .parse::<Status>()
                .map_err(|e| IntakeError::MalformedLedger(format!("row {}: {e}", i + 1)))?;
            records.push(LedgerRecord {
                file_name: cell(file_col).to_string(),
                email: cell(email_col).to_string(),
                status,
            });
        }

        let ledger = Self { records };
        ledger.warn_on_duplicates();
        Ok(ledger)
    }

    /// Encode with the canonical `file_name,email,status` header.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(LEDGER_COLUMNS);
        table.rows = self
            .records
            .iter()
            .map(|r| vec![r.file_name.clone(), r.email.clone(), r.status.to_string()])
            .collect();
        table
    }

    fn warn_on_duplicates(&self) {
        for (i, record) in self.records.iter().enumerate() {
            if self.records[..i].iter().any(|r| r.email == record.email) {
                warn!(
                    "Ledger has a duplicate row for {} (row {}); the first row is used",
                    record.email,
                    i + 1
                );
            }
        }
    }
}

/// Outcome of checking one upload against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    AcceptedNew,
    AcceptedOverwrite,
    Denied,
}

impl Decision {
    pub fn is_accepted(self) -> bool {
        !matches!(self, Decision::Denied)
    }

    /// Human-readable status shown to the submitter.
    pub fn message(self) -> &'static str {
        match self {
            Decision::AcceptedNew => "Accepted: new record.",
            Decision::AcceptedOverwrite => "Accepted: overwrite of previous submission.",
            Decision::Denied => "Denied: service already provided.",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Apply the one-submission-per-user policy.
///
/// * a `Ready` record denies the upload and leaves the ledger untouched;
/// * any other record is overwritten in place with `candidate_file_name`
///   and reset to `Process`;
/// * no record appends a new `Process` row.
///
/// `email` must already be format-validated.
pub fn evaluate_and_apply(
    mut ledger: Ledger,
    email: &str,
    candidate_file_name: &str,
) -> (Decision, Ledger) {
    match ledger.position(email) {
        Some(i) if ledger.records[i].status == Status::Ready => (Decision::Denied, ledger),
        Some(i) => {
            let record = &mut ledger.records[i];
            record.file_name = candidate_file_name.to_string();
            record.status = Status::Process;
            (Decision::AcceptedOverwrite, ledger)
        }
        None => {
            ledger.records.push(LedgerRecord {
                file_name: candidate_file_name.to_string(),
                email: email.to_string(),
                status: Status::Process,
            });
            (Decision::AcceptedNew, ledger)
        }
    }
}

/// Deterministic per-user key: the email's local part with every character
/// outside `[A-Za-z0-9]` removed.
pub fn user_key(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    local.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Name of the stored copy of an uploaded PDF: `{user_key}_{original}`.
pub fn stored_pdf_name(email: &str, original_file_name: &str) -> String {
    format!("{}_{}", user_key(email), original_file_name)
}

/// Name of the extracted text artifact: `{user_key}_{original}.txt`.
pub fn artifact_name(email: &str, original_file_name: &str) -> String {
    format!("{}.txt", stored_pdf_name(email, original_file_name))
}
