//! # ingest-writeback
//!
//! Persists a row outcome (tracking number, ship time, ...) back to the
//! representation the row was imported from.
//!
//! File destinations are never edited in place. The new content is written to
//! a temporary file in the same directory and renamed over the original, so a
//! failure at any point leaves the original file intact.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod atomic;
pub mod companion;
pub mod database;
pub mod delimited;
pub mod request;
pub mod spreadsheet;
mod target;

pub use atomic::{replace_file, replace_file_with};
pub use companion::companion_path;
pub use request::{SHIPPED_AT_COLUMN, WriteBackOutcome, WriteBackRequest};
pub use target::{Applied, WriteTarget, apply};

use std::path::Path;

use ingest_ir::ErrorKind;
use thiserror::Error;

/// Errors raised while writing an outcome back.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Write-back conflict: {reason}")]
    Conflict { reason: String },

    #[error("Cannot rewrite delimited file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Cannot read workbook: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Cannot write workbook: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to replace {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Adapter(#[from] ingest_adapters::Error),

    #[error(transparent)]
    Store(#[from] ingest_store::Error),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::WriteConflict,
            Self::Csv(_) | Self::Spreadsheet(_) => ErrorKind::FormatInvalid,
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            Self::Xlsx(_) | Self::Io { .. } | Self::Persist { .. } => ErrorKind::Internal,
            Self::Adapter(err) => err.kind(),
            Self::Store(err) => err.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
