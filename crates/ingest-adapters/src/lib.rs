//! # ingest-adapters
//!
//! Format adapters that turn a source into rows in the tabular store.
//!
//! Every adapter implements [`SourceAdapter`] and is looked up by its
//! [`SourceType`] tag in an [`AdapterRegistry`]. An import reads and types the
//! whole source first and only then hands the rows to
//! [`TabularStore::load`](ingest_store::TabularStore::load), so a failing
//! source never disturbs the active import.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ingest_adapters::{AdapterRegistry, ImportRequest};
//! use ingest_ir::SourceType;
//! use ingest_store::TabularStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = TabularStore::open_in_memory().await?;
//! let registry = AdapterRegistry::with_defaults();
//! let adapter = registry.get(SourceType::Delimited)?;
//! let result = adapter.import(&store, &ImportRequest::file("orders.csv")).await?;
//! println!("{} rows", result.row_count);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod adapter;
pub mod database;
pub mod delimited;
pub mod edi;
pub mod fixed_width;
pub mod json;
pub mod request;
pub mod sniff;
pub mod spreadsheet;
mod tabulate;
pub mod xml;

pub use adapter::{AdapterRegistry, SourceAdapter, SourceMetadata};
pub use database::{DatabaseAdapter, TableSummary, list_tables};
pub use delimited::{DelimitedAdapter, Dialect};
pub use edi::EdiAdapter;
pub use fixed_width::FixedWidthAdapter;
pub use json::{JsonAdapter, import_records};
pub use request::{ColumnSpan, FormatOptions, ImportLimits, ImportRequest, SourceInput};
pub use sniff::{GuessedColumn, SniffedLines, guess_fixed_width_columns, sniff_file};
pub use spreadsheet::{SpreadsheetAdapter, list_sheets};
pub use xml::XmlAdapter;

use ingest_ir::{ErrorKind, SourceType};
use thiserror::Error;

/// Errors raised while reading and loading a source.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("{what} is {size} bytes, over the {limit} byte limit")]
    SizeExceeded { what: String, size: u64, limit: u64 },

    #[error("Invalid {source_type} content: {details}")]
    Format {
        source_type: SourceType,
        details: String,
    },

    #[error("Import rejected: {reason}")]
    Rejected { reason: String },

    #[error(
        "Table '{table}' has {count} rows. Add a WHERE clause to filter (tables > {threshold} rows require filters). Example: SELECT * FROM {table} WHERE created_at > '2026-01-01'"
    )]
    LargeTable {
        table: String,
        count: u64,
        threshold: u64,
    },

    #[error("No adapter registered for {0}")]
    Unregistered(SourceType),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Invalid delimited text: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error(transparent)]
    Path(#[from] ingest_ir::Error),

    #[error(transparent)]
    Edi(#[from] ingest_edi::Error),

    #[error(transparent)]
    Store(#[from] ingest_store::Error),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn format(source_type: SourceType, details: impl Into<String>) -> Self {
        Self::Format {
            source_type,
            details: details.into(),
        }
    }

    pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::SizeExceeded { .. } => ErrorKind::SizeExceeded,
            Self::Format { .. }
            | Self::Json(_)
            | Self::Xml(_)
            | Self::Csv(_)
            | Self::Spreadsheet(_) => ErrorKind::FormatInvalid,
            Self::Rejected { .. } | Self::LargeTable { .. } | Self::Unregistered(_) => {
                ErrorKind::ValidationRejected
            }
            Self::Path(err) => err.kind(),
            Self::Edi(err) => err.kind(),
            Self::Store(err) => err.kind(),
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            Self::Io { .. } => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
