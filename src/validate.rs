//! Input checks run before any store I/O.

use crate::error::ValidationIssue;
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$").expect("valid email regex")
});

/// Whether `email` looks like `local@domain.tld`.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Check a submission's fields and return every problem found.
///
/// An empty result means the submission may proceed.
pub fn validate_submission(
    email: &str,
    password: &str,
    shared_password: &str,
    file_count: usize,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if !is_valid_email(email) {
        issues.push(ValidationIssue::InvalidEmail);
    }
    if password != shared_password {
        issues.push(ValidationIssue::WrongPassword);
    }
    if file_count == 0 {
        issues.push(ValidationIssue::NoFiles);
    }
    issues
}
