//! Import contract types.
//!
//! Every adapter produces an [`ImportResult`] describing the rows it loaded.
//! Rows are addressed by their 1-based `source_row_num`, kept in a hidden
//! identity column that never appears in a [`SchemaColumn`] list.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::value::{ColumnType, Value};

/// Name of the hidden identity column in the tabular store.
pub const IDENTITY_COLUMN: &str = "_source_row_num";

/// Format tag of an import source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Delimited,
    Spreadsheet,
    FixedWidth,
    Json,
    Xml,
    Database,
    Edi,
}

impl SourceType {
    pub const ALL: [SourceType; 7] = [
        Self::Delimited,
        Self::Spreadsheet,
        Self::FixedWidth,
        Self::Json,
        Self::Xml,
        Self::Database,
        Self::Edi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delimited => "delimited",
            Self::Spreadsheet => "spreadsheet",
            Self::FixedWidth => "fixed_width",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Database => "database",
            Self::Edi => "edi",
        }
    }

    /// Whether the source is a file that write-back rewrites in place.
    pub fn is_file_backed(self) -> bool {
        !matches!(self, Self::Database)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "delimited" | "csv" | "tsv" => Ok(Self::Delimited),
            "spreadsheet" | "excel" | "xlsx" => Ok(Self::Spreadsheet),
            "fixed_width" | "fwf" => Ok(Self::FixedWidth),
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            "database" | "db" => Ok(Self::Database),
            "edi" | "x12" | "edifact" => Ok(Self::Edi),
            other => Err(format!("unknown source type '{other}'")),
        }
    }
}

/// One column of the imported schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SchemaColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            warnings: Vec::new(),
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// How a database import resolved its deterministic row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKeyStrategy {
    Explicit,
    #[serde(rename = "auto_pk")]
    AutoPrimaryKey,
    AutoUnique,
    #[default]
    None,
}

impl RowKeyStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::AutoPrimaryKey => "auto_pk",
            Self::AutoUnique => "auto_unique",
            Self::None => "none",
        }
    }
}

impl fmt::Display for RowKeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportResult {
    pub row_count: usize,
    pub columns: Vec<SchemaColumn>,
    pub warnings: Vec<String>,
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deterministic_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_key_columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_key_strategy: Option<RowKeyStrategy>,
}

impl ImportResult {
    pub fn new(source_type: SourceType, row_count: usize, columns: Vec<SchemaColumn>) -> Self {
        Self {
            row_count,
            columns,
            warnings: Vec::new(),
            source_type,
            deterministic_ready: None,
            row_key_columns: None,
            row_key_strategy: None,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// Attach the database row-key resolution outcome.
    pub fn with_row_key(mut self, strategy: RowKeyStrategy, columns: Vec<String>) -> Self {
        self.deterministic_ready = Some(strategy != RowKeyStrategy::None);
        self.row_key_columns = Some(columns);
        self.row_key_strategy = Some(strategy);
        self
    }

    pub fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// A row ready for loading: identity plus values aligned with the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedRow {
    pub source_row_num: u64,
    pub values: Vec<Value>,
}

impl ImportedRow {
    pub fn new(source_row_num: u64, values: Vec<Value>) -> Self {
        Self {
            source_row_num,
            values,
        }
    }
}
