//! I/O error types for encounter-io.

use std::path::PathBuf;

use encounter_model::ModelError;
use encounter_survey::SurveyError;

/// Errors from CSV parsing, record validation, and result serialization.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the CSV file contains a header but zero data rows.
    #[error("empty dataset (no data rows) in {path}")]
    EmptyDataset {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when a required column is absent from the header.
    #[error("missing required column \"{column}\" in {path}")]
    MissingColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// Name of the absent column.
        column: &'static str,
    },

    /// Returned when a data row has a different number of columns than the header.
    #[error("inconsistent row length in {path}: row {row_index} (id {id}) has {got} columns, expected {expected}")]
    InconsistentRowLength {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Identifier of the offending row.
        id: String,
        /// Expected number of columns (from header).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when a cell is NaN, Inf, or otherwise not a finite float.
    #[error("non-finite value in {path}: row {row_index}, column \"{column}\", raw value \"{raw}\"")]
    NonFiniteValue {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Column name.
        column: String,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when the detection flag is not `true`, `false`, `1`, or `0`.
    #[error("invalid detection flag in {path}: row {row_index}, raw value \"{raw}\"")]
    InvalidDetected {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// The raw string value.
        raw: String,
    },

    /// Returned when a year or day of year is missing or not an integer.
    #[error("invalid {column} in {path}: row {row_index}, raw value \"{raw}\"")]
    InvalidDate {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Column name.
        column: &'static str,
        /// The raw string value.
        raw: String,
    },

    /// Returned when a row's location or date is rejected.
    #[error("invalid record in {path} at row {row_index}")]
    InvalidRecord {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Underlying validation error.
        source: SurveyError,
    },

    /// Returned when the same identifier appears more than once.
    #[error("duplicate ID \"{id}\" in {path}: first at row {first_row}, again at row {second_row}")]
    DuplicateId {
        /// Path to the CSV file.
        path: PathBuf,
        /// The duplicated identifier.
        id: String,
        /// Zero-based row index of the first occurrence.
        first_row: usize,
        /// Zero-based row index of the second occurrence.
        second_row: usize,
    },

    /// Propagated from survey data construction.
    #[error(transparent)]
    Survey(#[from] SurveyError),

    /// Propagated from prediction grid construction.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Returned when the experiment name contains characters outside `[a-zA-Z0-9_-]`.
    #[error("invalid experiment name \"{name}\": must match [a-zA-Z0-9_-]+")]
    InvalidExperimentName {
        /// The invalid name.
        name: String,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a result file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a result cannot be encoded as JSON.
    #[error("cannot encode {path} as JSON")]
    SerializeJson {
        /// Path of the intended file.
        path: PathBuf,
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// Returned when the surface CSV cannot be written.
    #[error("cannot write CSV {path}")]
    CsvWrite {
        /// Path of the intended file.
        path: PathBuf,
        /// Underlying CSV error.
        source: csv::Error,
    },
}
