//! JSON documents.
//!
//! Without a record path the records are the top-level array, else the first
//! key holding a list of objects, else the whole document as one record.

use async_trait::async_trait;
use ingest_ir::{ImportResult, Node, SourceType, flatten_record};
use ingest_store::TabularStore;
use tracing::debug;

use crate::adapter::SourceAdapter;
use crate::request::ImportRequest;
use crate::tabulate::Table;
use crate::{Error, Result};

pub(crate) const NO_RECORDS: &str = "No records found";

/// Locate the record collection in a parsed JSON tree.
pub fn discover_records(root: Node, record_path: Option<&str>) -> Result<Vec<Node>> {
    if let Some(path) = record_path.filter(|path| !path.trim().is_empty()) {
        let found = root.resolve_path(path)?.clone();
        if matches!(found, Node::Scalar(_)) {
            return Err(Error::format(
                SourceType::Json,
                format!("record path '{path}' points to a scalar value"),
            ));
        }
        return Ok(found.into_records());
    }

    match root {
        Node::Array(_) => Ok(root.into_records()),
        Node::Object(_) => {
            if let Some((key, items)) = root.first_object_list_key() {
                debug!(key, records = items.len(), "Discovered JSON record list");
                return Ok(items.to_vec());
            }
            Ok(vec![root])
        }
        Node::Scalar(_) => Err(Error::format(
            SourceType::Json,
            "document is a single scalar value",
        )),
    }
}

/// Flatten discovered records and type them into a table.
pub(crate) fn records_table(records: &[Node], max_depth: usize) -> Table {
    let flat = records
        .iter()
        .map(|record| flatten_record(record, max_depth))
        .collect();
    let table = Table::from_records(flat);
    if records.is_empty() {
        table.with_warning(NO_RECORDS)
    } else {
        table
    }
}

/// Load records handed over in memory, typed the way JSON records are.
/// Every record must be an object.
pub async fn import_records(
    store: &TabularStore,
    records: Vec<serde_json::Value>,
    max_depth: usize,
) -> Result<ImportResult> {
    let mut nodes = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        if !record.is_object() {
            return Err(Error::rejected(format!("record {} is not an object", index + 1)));
        }
        nodes.push(Node::from_json(record));
    }
    records_table(&nodes, max_depth).load(store, SourceType::Json).await
}

/// JSON adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAdapter;

#[async_trait]
impl SourceAdapter for JsonAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Json
    }

    async fn import(&self, store: &TabularStore, request: &ImportRequest) -> Result<ImportResult> {
        let bytes = request
            .read_bytes(Some(request.limits.max_document_bytes))
            .await?;
        let parsed: serde_json::Value = serde_json::from_slice(&bytes)?;
        let records = discover_records(
            Node::from_json(parsed),
            request.options.record_path.as_deref(),
        )?;
        records_table(&records, request.limits.flatten_max_depth)
            .load(store, SourceType::Json)
            .await
    }
}
