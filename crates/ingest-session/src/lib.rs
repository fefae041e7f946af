//! # ingest-session
//!
//! [`IngestSession`] owns the tabular store and the active import, and is the
//! one place callers go through: imports, schema and row queries, checksums,
//! type overrides and write-back.
//!
//! There is no ambient state. A session is created empty, each successful
//! import replaces the active one, and a failed import leaves the previous
//! import exactly as it was.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ingest_adapters::FormatOptions;
//! use ingest_session::{IngestConfig, IngestSession};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = IngestSession::open(IngestConfig::default()).await?;
//! let result = session.import_file("orders.csv", FormatOptions::new()).await?;
//! println!("{} rows", result.row_count);
//! let row = session.get_row(1).await?;
//! println!("{}", row.checksum);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod config;
mod origin;
pub mod session;
pub mod views;
mod writeback;

pub use config::IngestConfig;
pub use origin::Origin;
pub use session::{IngestSession, source_type_for_path};
pub use views::{
    ChecksumVerification, CommodityImport, Description, FilterResult, RowChecksum, RowView,
};

use ingest_ir::ErrorKind;
use thiserror::Error;

/// Errors surfaced by session entrypoints.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Request rejected: {reason}")]
    Rejected { reason: String },

    #[error("Write-back conflict: {reason}")]
    Conflict { reason: String },

    #[error("Invalid configuration{}: {source}", in_path(.path))]
    Config {
        path: Option<String>,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Adapter(#[from] ingest_adapters::Error),

    #[error(transparent)]
    Store(#[from] ingest_store::Error),

    #[error(transparent)]
    WriteBack(#[from] ingest_writeback::Error),
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

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Taxonomy category, delegated to the wrapped error where there is one.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Rejected { .. } | Self::Config { .. } => ErrorKind::ValidationRejected,
            Self::Conflict { .. } => ErrorKind::WriteConflict,
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            Self::Io { .. } => ErrorKind::Internal,
            Self::Adapter(err) => err.kind(),
            Self::Store(err) => err.kind(),
            Self::WriteBack(err) => err.kind(),
        }
    }
}

fn in_path(path: &Option<String>) -> String {
    path.as_deref().map(|path| format!(" in {path}")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_delegates_to_wrapped_errors() {
        let err: Error = ingest_store::Error::NoActiveImport.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err: Error = ingest_writeback::Error::conflict("join").into();
        assert_eq!(err.kind(), ErrorKind::WriteConflict);
        let err: Error = ingest_adapters::Error::rejected("DELETE").into();
        assert_eq!(err.kind(), ErrorKind::ValidationRejected);
    }
}
