//! Serializable results of the query entrypoints.

use ingest_ir::{RowKeyStrategy, SchemaColumn, SourceType};
use ingest_store::{Record, TypeOverride};
use serde::Serialize;

use crate::origin::Origin;

/// Schema and metadata of the active import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    pub source_type: SourceType,
    pub row_count: u64,
    pub column_count: usize,
    pub columns: Vec<SchemaColumn>,
    pub overrides: Vec<TypeOverride>,
    pub origin: Origin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deterministic_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_key_columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_key_strategy: Option<RowKeyStrategy>,
    /// SHA-256 over column names, types and nullability
    pub schema_signature: String,
    pub warnings: Vec<String>,
}

/// One row with its checksum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowView {
    pub row_number: u64,
    pub data: Record,
    pub checksum: String,
}

impl From<Record> for RowView {
    fn from(record: Record) -> Self {
        Self {
            row_number: record.source_row_num,
            checksum: record.checksum(),
            data: record,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterResult {
    pub rows: Vec<RowView>,
    pub total_count: u64,
    pub limit: u64,
    pub offset: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowChecksum {
    pub row_number: u64,
    pub checksum: String,
}

/// Outcome of comparing a stored row against an expected digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumVerification {
    pub valid: bool,
    pub row_number: u64,
    pub expected: String,
    pub actual: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_ir::Value;

    #[test]
    fn test_row_view_carries_record_checksum() {
        let record = Record {
            source_row_num: 4,
            fields: vec![("id".to_string(), Value::Integer(1))],
        };
        let expected = record.checksum();
        let view = RowView::from(record);
        assert_eq!(view.row_number, 4);
        assert_eq!(view.checksum, expected);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["data"]["id"], 1);
    }
}

/// Outcome of loading commodity lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommodityImport {
    pub row_count: usize,
    pub table_name: &'static str,
}
