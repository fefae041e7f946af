#![deny(unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # ingest-ir
//!
//! Format-neutral representation shared by every importer.
//!
//! This crate holds the scalar value model, the tagged record tree used for
//! JSON and XML documents, the record flattener, the date ambiguity resolver
//! and the types that make up the import contract.

/// Import contract types returned by every adapter.
pub mod contract;
/// Date parsing with month-first/day-first ambiguity detection.
pub mod dates;
/// Record flattening into underscore-joined column names.
pub mod flatten;
/// Header cleanup and de-duplication.
pub mod headers;
/// Column type inference from observed values.
pub mod infer;
/// Tagged object/array/scalar tree.
pub mod tree;
/// Scalar values and logical column types.
pub mod value;

pub use contract::{
    IDENTITY_COLUMN, ImportResult, ImportedRow, RowKeyStrategy, SchemaColumn, SourceType,
};
pub use dates::{DateReading, from_excel_serial, parse_date_text, parse_timestamp_text};
pub use flatten::{DEFAULT_MAX_DEPTH, flatten_record};
pub use headers::{normalize_headers, synthesize_headers};
pub use infer::{Classified, ColumnProfile, classify_text, text_to_value};
pub use tree::Node;
pub use value::{ColumnType, DATE_FORMAT, TIMESTAMP_FORMAT, Value};

use std::fmt;

use thiserror::Error;

/// Coarse error categories shared by every crate in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing source, sheet, table or row.
    NotFound,
    /// Content violates the expected grammar.
    FormatInvalid,
    /// Pre-parse size guard tripped.
    SizeExceeded,
    /// Disallowed keyword, override string or unfiltered large-table query.
    ValidationRejected,
    /// Write-back cannot be applied to the destination.
    WriteConflict,
    /// I/O or storage failure.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::FormatInvalid => "format_invalid",
            Self::SizeExceeded => "size_exceeded",
            Self::ValidationRejected => "validation_rejected",
            Self::WriteConflict => "write_conflict",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur when working with the IR
#[derive(Error, Debug)]
pub enum Error {
    #[error("Record path '{path}' not found: {reason}")]
    PathNotFound { path: String, reason: String },

    #[error("Invalid record path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

impl Error {
    /// Build a path-not-found error with the requested path.
    pub fn path_not_found(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PathNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build an invalid-path error with input path and reason.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::FormatInvalid
    }
}

/// Crate-local result type for IR operations.
pub type Result<T> = std::result::Result<T, Error>;
