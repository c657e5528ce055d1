//! CSV interchange.
//!
//! Three files describe the whole cargo state: items, containers and the
//! arrangement (which box each item occupies). Readers are lenient per row:
//! a bad row is reported with its number and skipped, the rest still loads.
//! Structural problems (unreadable input, missing headers) fail the import.

pub mod arrangement;
pub mod containers;
pub mod items;

use std::io::Read;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stowage_core::DomainError;

pub use arrangement::{read_arrangement, write_arrangement, ArrangementRow};
pub use containers::{read_containers, write_containers};
pub use items::{read_items, write_items, ItemRow};

#[derive(Debug, Error)]
pub enum InterchangeError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing column '{0}'")]
    MissingColumn(&'static str),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// A rejected row. `row` counts data rows from 1 (the header is not counted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

/// Summary of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: usize,
    pub errors: Vec<RowError>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parsed rows plus the rows that could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub rows: Vec<(usize, T)>,
    pub errors: Vec<RowError>,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            errors: Vec::new(),
        }
    }
}

pub(crate) fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input)
}

/// Fail early when a required header is absent, instead of reporting the
/// same problem once per row.
pub(crate) fn require_columns<R: Read>(
    reader: &mut csv::Reader<R>,
    required: &[&'static str],
) -> Result<(), InterchangeError> {
    let headers = reader.headers()?;
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(InterchangeError::MissingColumn(column));
        }
    }
    Ok(())
}

/// Deserialize every row with serde, converting each with `convert`.
pub(crate) fn parse_rows<R, Raw, T>(
    mut reader: csv::Reader<R>,
    convert: impl Fn(Raw) -> Result<T, String>,
) -> Parsed<T>
where
    R: Read,
    Raw: serde::de::DeserializeOwned,
{
    let mut parsed = Parsed::default();
    for (n, result) in reader.deserialize::<Raw>().enumerate() {
        let row = n + 1;
        match result.map_err(|e| e.to_string()).and_then(&convert) {
            Ok(value) => parsed.rows.push((row, value)),
            Err(message) => parsed.errors.push(RowError::new(row, message)),
        }
    }
    parsed
}

/// Empty cells and `N/A` mean "not set".
pub(crate) fn optional(cell: Option<String>) -> Option<String> {
    cell.filter(|c| {
        let c = c.trim();
        !c.is_empty() && !c.eq_ignore_ascii_case("n/a")
    })
}
