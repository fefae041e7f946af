//! Read-time column type overrides.
//!
//! An override never touches stored data. It is validated against a fixed
//! type-name grammar and rendered as one of a handful of fixed SQL
//! expressions, so the caller's text never reaches the generated SQL.

use std::sync::LazyLock;

use ingest_ir::ColumnType;
use regex::Regex;
use serde::Serialize;

use crate::{Error, Result};

static TYPE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(VARCHAR|TEXT|STRING|INTEGER|INT|BIGINT|SMALLINT|DOUBLE|FLOAT|REAL|DECIMAL|NUMERIC|DATE|TIMESTAMP|DATETIME|BOOLEAN|BOOL)(\((\d+)(,\s*(\d+))?\))?$",
    )
    .expect("valid type override regex")
});

/// Largest scale accepted for `DECIMAL(p, s)`.
const MAX_SCALE: u32 = 18;

/// A validated type substitution for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeOverride {
    pub column: String,
    /// Canonical upper-case type name as accepted.
    pub type_name: String,
    pub target: ColumnType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

impl TypeOverride {
    /// Validate `type_name` for `column`.
    pub fn parse(column: &str, type_name: &str) -> Result<Self> {
        let invalid = || Error::InvalidOverride {
            column: column.to_string(),
            type_name: type_name.to_string(),
        };

        let trimmed = type_name.trim();
        let caps = TYPE_NAME.captures(trimmed).ok_or_else(invalid)?;
        let base = caps
            .get(1)
            .map(|m| m.as_str().to_ascii_uppercase())
            .ok_or_else(invalid)?;

        let target = match base.as_str() {
            "VARCHAR" | "TEXT" | "STRING" => ColumnType::Text,
            "INTEGER" | "INT" | "BIGINT" | "SMALLINT" => ColumnType::Integer,
            "DOUBLE" | "FLOAT" | "REAL" | "DECIMAL" | "NUMERIC" => ColumnType::Float,
            "DATE" => ColumnType::Date,
            "TIMESTAMP" | "DATETIME" => ColumnType::Timestamp,
            _ => ColumnType::Boolean,
        };

        let scale = match (base.as_str(), caps.get(5)) {
            ("DECIMAL" | "NUMERIC", Some(scale)) => {
                let scale: u32 = scale.as_str().parse().map_err(|_| invalid())?;
                if scale > MAX_SCALE {
                    return Err(invalid());
                }
                Some(scale)
            }
            _ => None,
        };

        Ok(Self {
            column: column.to_string(),
            type_name: trimmed.to_ascii_uppercase(),
            target,
            scale,
        })
    }

    /// SQL expression reading `column_sql` (already quoted) as the target type.
    pub fn expression(&self, column_sql: &str) -> String {
        match self.target {
            ColumnType::Text => format!("CAST({column_sql} AS TEXT)"),
            ColumnType::Integer => format!("CAST({column_sql} AS INTEGER)"),
            ColumnType::Float => match self.scale {
                Some(scale) => format!("ROUND(CAST({column_sql} AS REAL), {scale})"),
                None => format!("CAST({column_sql} AS REAL)"),
            },
            ColumnType::Date => format!("date({column_sql})"),
            ColumnType::Timestamp => format!("datetime({column_sql})"),
            ColumnType::Boolean => format!(
                "CASE WHEN {column_sql} IS NULL THEN NULL \
                 WHEN lower(CAST({column_sql} AS TEXT)) IN ('1', 'true', 't', 'yes', 'y') THEN 1 \
                 ELSE 0 END"
            ),
        }
    }
}
