//! X12 and EDIFACT documents, one row per normalized order.

use async_trait::async_trait;
use ingest_edi::{NormalizedOrder, parse_document};
use ingest_ir::{ImportResult, ImportedRow, SourceType};
use ingest_store::TabularStore;
use tracing::info;

use crate::adapter::SourceAdapter;
use crate::json::NO_RECORDS;
use crate::request::ImportRequest;
use crate::Result;

/// EDI adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdiAdapter;

#[async_trait]
impl SourceAdapter for EdiAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Edi
    }

    async fn import(&self, store: &TabularStore, request: &ImportRequest) -> Result<ImportResult> {
        let bytes = request
            .read_bytes(Some(request.limits.max_document_bytes))
            .await?;
        let document = parse_document(&bytes)?;

        let columns = NormalizedOrder::schema();
        let rows: Vec<ImportedRow> = document
            .orders
            .iter()
            .zip(1u64..)
            .map(|(order, row_num)| ImportedRow::new(row_num, order.to_values()))
            .collect();
        let row_count = store.load(&columns, &rows).await?;
        info!(
            source_type = "edi",
            standard = %document.standard,
            rows = row_count,
            "Import complete"
        );

        let warnings = if rows.is_empty() {
            vec![NO_RECORDS.to_string()]
        } else {
            Vec::new()
        };
        Ok(ImportResult::new(SourceType::Edi, row_count, columns).with_warnings(warnings))
    }
}
