//! # ingest-store
//!
//! The single active tabular store behind every import, plus the pieces that
//! guard access to it and to relational sources.
//!
//! The store is an in-process libsql database holding one fixed-name table.
//! Each import rebuilds that table inside one transaction and swaps it in, so
//! a failed load leaves the previous import untouched. Reads decode the libsql
//! storage values back into [`ingest_ir::Value`]s using the import's schema and
//! any active type overrides.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod checksum;
pub mod commodities;
mod convert;
pub mod overrides;
pub mod source;
pub mod sql;
pub mod store;

pub use checksum::{row_checksum, schema_signature};
pub use commodities::{COMMODITIES_TABLE, Commodity, CommodityLine};
pub use convert::native_value;
pub use overrides::TypeOverride;
pub use source::{AccessMode, DatabaseLocator, FetchedRows, RemoteSource, ordered_query};
pub use sql::{
    FromTarget, TableRef, ensure_read_only, ensure_safe_predicate, has_where_clause,
    primary_from_target, quote_identifier, select_aliases,
};
pub use store::{FilterPage, QueryOutput, Record, TABLE_NAME, TabularStore};

use ingest_ir::ErrorKind;
use thiserror::Error;

/// Errors raised by the store, the SQL guards and source attachment.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("No data imported; run an import first")]
    NoActiveImport,

    #[error("Query rejected: {reason}")]
    Rejected { reason: String },

    #[error("Invalid type override '{type_name}' for column '{column}'")]
    InvalidOverride { column: String, type_name: String },

    #[error("Query failed: {source}")]
    InvalidQuery {
        statement: String,
        #[source]
        source: libsql::Error,
    },

    #[error("Load error: {details}")]
    Load { details: String },

    #[error("Libsql error during {context}: {source}")]
    Libsql {
        context: String,
        #[source]
        source: libsql::Error,
    },

    #[error("SQL error executing `{statement}`: {source}")]
    Sql {
        statement: String,
        #[source]
        source: libsql::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
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

    pub(crate) fn libsql(context: impl Into<String>) -> impl FnOnce(libsql::Error) -> Self {
        let context = context.into();
        move |source| Self::Libsql { context, source }
    }

    pub(crate) fn sql(statement: &str) -> impl FnOnce(libsql::Error) -> Self + '_ {
        move |source| Self::Sql {
            statement: statement.to_string(),
            source,
        }
    }

    pub(crate) fn invalid_query(statement: &str) -> impl FnOnce(libsql::Error) -> Self + '_ {
        move |source| Self::InvalidQuery {
            statement: statement.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::NoActiveImport => ErrorKind::NotFound,
            Self::Config { .. }
            | Self::Rejected { .. }
            | Self::InvalidOverride { .. }
            | Self::InvalidQuery { .. } => ErrorKind::ValidationRejected,
            Self::Load { .. } | Self::Libsql { .. } | Self::Sql { .. } | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
