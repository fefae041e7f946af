//! What to import and how to read it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ingest_ir::{DEFAULT_MAX_DEPTH, SourceType};
use ingest_store::DatabaseLocator;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default pre-parse limit for whole-document formats (50 MiB).
pub const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 50 * 1024 * 1024;

/// Default row count above which unfiltered table queries are rejected.
pub const DEFAULT_LARGE_TABLE_THRESHOLD: u64 = 10_000;

/// Where the source bytes come from.
#[derive(Clone)]
pub enum SourceInput {
    File(PathBuf),
    /// In-memory document; `name` is used for messages and extension hints.
    Inline { name: String, bytes: Vec<u8> },
    Database {
        locator: DatabaseLocator,
        query: String,
    },
}

impl fmt::Debug for SourceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Inline { name, bytes } => f
                .debug_struct("Inline")
                .field("name", name)
                .field("len", &bytes.len())
                .finish(),
            Self::Database { locator, query } => f
                .debug_struct("Database")
                .field("locator", locator)
                .field("query", query)
                .finish(),
        }
    }
}

/// A `[start, end)` character span of a fixed-width column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpan {
    pub start: usize,
    pub end: usize,
}

impl ColumnSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn width(self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

impl FromStr for ColumnSpan {
    type Err = String;

    /// Parses `start:end` or `start-end`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (start, end) = s
            .split_once([':', '-'])
            .ok_or_else(|| format!("expected start:end, got '{s}'"))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid offset '{part}' in '{s}'"))
        };
        Ok(Self::new(parse(start)?, parse(end)?))
    }
}

/// Per-format reading options. Adapters ignore the fields they do not use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    /// Forces the adapter when routing by file extension.
    pub format: Option<SourceType>,
    /// Field delimiter; detected when absent.
    pub delimiter: Option<char>,
    pub quote: Option<char>,
    pub has_header: bool,
    /// Sheet name; the first sheet when absent.
    pub sheet: Option<String>,
    /// Slash-separated path to the record collection.
    pub record_path: Option<String>,
    pub col_specs: Vec<ColumnSpan>,
    pub column_names: Option<Vec<String>>,
    pub row_key_columns: Option<Vec<String>>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            format: None,
            delimiter: None,
            quote: None,
            has_header: true,
            sheet: None,
            record_path: None,
            col_specs: Vec::new(),
            column_names: None,
            row_key_columns: None,
        }
    }
}

impl FormatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: SourceType) -> Self {
        self.format = Some(format);
        self
    }

    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn quote(mut self, quote: char) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn without_header(self) -> Self {
        self.has_header(false)
    }

    pub fn sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn record_path(mut self, path: impl Into<String>) -> Self {
        self.record_path = Some(path.into());
        self
    }

    pub fn col_specs(mut self, specs: Vec<ColumnSpan>) -> Self {
        self.col_specs = specs;
        self
    }

    pub fn column_names(mut self, names: Vec<String>) -> Self {
        self.column_names = Some(names);
        self
    }

    pub fn row_key_columns(mut self, columns: Vec<String>) -> Self {
        self.row_key_columns = Some(columns);
        self
    }
}

/// Resource limits applied while importing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportLimits {
    pub max_document_bytes: u64,
    pub large_table_threshold: u64,
    pub flatten_max_depth: usize,
    /// Non-null cells per column sampled for spreadsheet typing.
    pub type_sample_size: usize,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            large_table_threshold: DEFAULT_LARGE_TABLE_THRESHOLD,
            flatten_max_depth: DEFAULT_MAX_DEPTH,
            type_sample_size: 100,
        }
    }
}

/// One import call: the input plus how to read it.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub input: SourceInput,
    pub options: FormatOptions,
    pub limits: ImportLimits,
}

impl ImportRequest {
    pub fn new(input: SourceInput) -> Self {
        Self {
            input,
            options: FormatOptions::default(),
            limits: ImportLimits::default(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(SourceInput::File(path.into()))
    }

    pub fn inline(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(SourceInput::Inline {
            name: name.into(),
            bytes: bytes.into(),
        })
    }

    pub fn database(locator: DatabaseLocator, query: impl Into<String>) -> Self {
        Self::new(SourceInput::Database {
            locator,
            query: query.into(),
        })
    }

    #[must_use]
    pub fn with_options(mut self, options: FormatOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: ImportLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.input {
            SourceInput::File(path) => Some(path),
            _ => None,
        }
    }

    /// File name or inline name, used for extension hints.
    pub fn name(&self) -> Option<String> {
        match &self.input {
            SourceInput::File(path) => Some(path.display().to_string()),
            SourceInput::Inline { name, .. } => Some(name.clone()),
            SourceInput::Database { .. } => None,
        }
    }

    /// Lower-cased extension of the file or inline name.
    pub fn extension(&self) -> Option<String> {
        let name = self.name()?;
        Path::new(&name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }

    /// Read the document bytes, refusing anything over `limit` before parsing.
    pub(crate) async fn read_bytes(&self, limit: Option<u64>) -> Result<Vec<u8>> {
        match &self.input {
            SourceInput::File(path) => {
                let metadata = match tokio::fs::metadata(path).await {
                    Ok(metadata) => metadata,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        return Err(Error::not_found(format!("File '{}'", path.display())));
                    }
                    Err(err) => return Err(Error::io(path)(err)),
                };
                if !metadata.is_file() {
                    return Err(Error::not_found(format!("File '{}'", path.display())));
                }
                check_size(&path.display().to_string(), metadata.len(), limit)?;
                tokio::fs::read(path).await.map_err(Error::io(path))
            }
            SourceInput::Inline { name, bytes } => {
                check_size(name, bytes.len() as u64, limit)?;
                Ok(bytes.clone())
            }
            SourceInput::Database { .. } => {
                Err(Error::rejected("a database source has no document to read"))
            }
        }
    }
}

fn check_size(what: &str, size: u64, limit: Option<u64>) -> Result<()> {
    match limit {
        Some(limit) if size > limit => Err(Error::SizeExceeded {
            what: what.to_string(),
            size,
            limit,
        }),
        _ => Ok(()),
    }
}
