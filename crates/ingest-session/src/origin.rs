//! Where the active import came from.

use std::path::PathBuf;

use ingest_adapters::{FormatOptions, ImportRequest, SourceInput};
use ingest_ir::{ImportResult, SourceType};
use serde::Serialize;

/// Origin of the active import, enough to find it again for write-back.
///
/// Database credentials are never kept: write-back asks for the locator again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    File {
        path: PathBuf,
        #[serde(skip)]
        options: FormatOptions,
        #[serde(skip_serializing_if = "Option::is_none")]
        sheet: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        record_path: Option<String>,
    },
    Inline {
        name: String,
    },
    /// Records handed over in memory, tagged by the caller.
    Records {
        label: String,
    },
    Database {
        /// Redacted locator
        source: String,
        query: String,
    },
}

impl Origin {
    pub(crate) fn of(request: &ImportRequest) -> Self {
        match &request.input {
            SourceInput::File(path) => Self::File {
                path: path.clone(),
                options: request.options.clone(),
                sheet: request.options.sheet.clone(),
                record_path: request.options.record_path.clone(),
            },
            SourceInput::Inline { name, .. } => Self::Inline { name: name.clone() },
            SourceInput::Database { locator, query } => Self::Database {
                source: locator.redacted(),
                query: query.clone(),
            },
        }
    }
}

/// The import currently held by a session.
#[derive(Debug, Clone)]
pub(crate) struct ActiveImport {
    pub(crate) source_type: SourceType,
    pub(crate) origin: Origin,
    pub(crate) result: ImportResult,
}
