//! In-memory tabular data and its CSV encoding.
//!
//! The store reads and writes tables without knowing what the columns mean;
//! [`crate::ledger::Ledger`] converts to and from this shape.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// MIME types accepted as "a CSV file" when locating a table.
pub const CSV_MIME_TYPES: &[&str] = &["text/csv", "application/vnd.ms-excel"];

/// MIME type used when writing a table.
pub const CSV_MIME: &str = "text/csv";

/// A header row plus string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Position of a column by exact header name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Parse UTF-8 CSV with a header row.
    ///
    /// `name` is only used in error messages. Short rows are padded with
    /// empty cells so every row has one cell per header.
    pub fn from_csv(name: &str, bytes: &[u8]) -> Result<Self, StoreError> {
        let malformed = |detail: String| StoreError::MalformedTabular {
            name: name.to_string(),
            detail,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| malformed(e.to_string()))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| malformed(e.to_string()))?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            if row.len() > headers.len() {
                return Err(malformed(format!(
                    "row {} has {} cells but the header has {}",
                    rows.len() + 1,
                    row.len(),
                    headers.len()
                )));
            }
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    /// Encode as comma-delimited UTF-8 CSV, header first.
    pub fn to_csv(&self) -> Result<Vec<u8>, StoreError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .and_then(|_| self.rows.iter().try_for_each(|row| writer.write_record(row)))
            .map_err(|e| StoreError::MalformedTabular {
                name: "<in-memory table>".into(),
                detail: e.to_string(),
            })?;
        writer.into_inner().map_err(|e| StoreError::MalformedTabular {
            name: "<in-memory table>".into(),
            detail: e.to_string(),
        })
    }
}
