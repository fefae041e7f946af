//! The session context and its import and query entrypoints.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ingest_adapters::{
    AdapterRegistry, FormatOptions, GuessedColumn, ImportRequest, SniffedLines, TableSummary,
};
use ingest_ir::{ImportResult, SourceType, Value};
use ingest_store::{
    COMMODITIES_TABLE, Commodity, CommodityLine, DatabaseLocator, QueryOutput, TabularStore,
    TypeOverride, schema_signature,
};
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::origin::{ActiveImport, Origin};
use crate::views::{
    ChecksumVerification, CommodityImport, Description, FilterResult, RowChecksum, RowView,
};
use crate::{Error, Result};

/// Largest `column_samples` request.
pub const MAX_COLUMN_SAMPLES: u64 = 20;
const DEFAULT_COLUMN_SAMPLES: u64 = 5;

/// Adapter for a file, chosen from its extension.
pub fn source_type_for_path(path: &Path) -> Option<SourceType> {
    let extension = path.extension()?.to_string_lossy().to_ascii_lowercase();
    match extension.as_str() {
        "csv" | "tsv" | "psv" | "txt" => Some(SourceType::Delimited),
        "xlsx" | "xlsm" | "xls" | "ods" => Some(SourceType::Spreadsheet),
        "json" => Some(SourceType::Json),
        "xml" => Some(SourceType::Xml),
        "edi" | "x12" | "edifact" => Some(SourceType::Edi),
        "fwf" | "dat" => Some(SourceType::FixedWidth),
        _ => None,
    }
}

/// Owns the store and the active import.
#[derive(Debug)]
pub struct IngestSession {
    config: IngestConfig,
    registry: AdapterRegistry,
    pub(crate) store: TabularStore,
    pub(crate) active: Option<ActiveImport>,
}

impl IngestSession {
    /// An empty session with the built-in adapters.
    pub async fn open(config: IngestConfig) -> Result<Self> {
        Self::with_registry(config, AdapterRegistry::with_defaults()).await
    }

    pub async fn with_registry(config: IngestConfig, registry: AdapterRegistry) -> Result<Self> {
        Ok(Self {
            config,
            registry,
            store: TabularStore::open_in_memory().await?,
            active: None,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn has_active_import(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn active(&self) -> Result<&ActiveImport> {
        self.active.as_ref().ok_or(Error::Store(ingest_store::Error::NoActiveImport))
    }

    /// Import with the adapter registered for `source_type`.
    ///
    /// The session's limits replace whatever limits `request` carries. On
    /// failure the previous import stays active.
    pub async fn import(&mut self, source_type: SourceType, request: ImportRequest) -> Result<ImportResult> {
        let adapter = self.registry.get(source_type)?;
        let request = request.with_limits(self.config.import_limits());
        let loaded = adapter.import(&self.store, &request).await;
        self.activate(source_type, Origin::of(&request), loaded)
    }

    /// Import records supplied by the caller, such as rows fetched from a
    /// storefront API. Each record must be a JSON object; nested values are
    /// flattened as in JSON imports. On failure the previous import stays
    /// active.
    pub async fn import_records(
        &mut self,
        records: Vec<serde_json::Value>,
        source_label: impl Into<String>,
    ) -> Result<ImportResult> {
        let label = source_label.into();
        if label.trim().is_empty() {
            return Err(Error::rejected("records need a source label"));
        }
        let max_depth = self.config.flatten_max_depth;
        let loaded = ingest_adapters::import_records(&self.store, records, max_depth).await;
        self.activate(SourceType::Json, Origin::Records { label }, loaded)
    }

    fn activate(
        &mut self,
        source_type: SourceType,
        origin: Origin,
        loaded: ingest_adapters::Result<ImportResult>,
    ) -> Result<ImportResult> {
        let result = match loaded {
            Ok(result) => result,
            Err(err) => {
                warn!(source_type = %source_type, error = %err, "Import failed; previous import kept");
                return Err(err.into());
            }
        };

        info!(
            source_type = %source_type,
            rows = result.row_count,
            columns = result.columns.len(),
            warnings = result.warnings.len(),
            "Import activated"
        );
        self.active = Some(ActiveImport {
            source_type,
            origin,
            result: result.clone(),
        });
        Ok(result)
    }

    /// Import a file, routed by `options.format` or else by extension.
    pub async fn import_file(&mut self, path: impl Into<PathBuf>, options: FormatOptions) -> Result<ImportResult> {
        let path = path.into();
        let source_type = match options.format {
            Some(format) => format,
            None => source_type_for_path(&path).ok_or_else(|| {
                Error::rejected(format!(
                    "cannot tell the format of '{}' from its extension; set a format",
                    path.display()
                ))
            })?,
        };
        self.import(source_type, ImportRequest::file(path).with_options(options)).await
    }

    pub async fn import_database(
        &mut self,
        locator: DatabaseLocator,
        query: impl Into<String>,
        row_key_columns: Option<Vec<String>>,
    ) -> Result<ImportResult> {
        let mut options = FormatOptions::new();
        options.row_key_columns = row_key_columns;
        let request = ImportRequest::database(locator, query).with_options(options);
        self.import(SourceType::Database, request).await
    }

    /// Drop the active import, its overrides and any commodity lines.
    pub async fn clear(&mut self) -> Result<()> {
        self.store.clear().await?;
        self.active = None;
        info!("Session cleared");
        Ok(())
    }

    /// Replace the commodity lines kept next to the active import.
    pub async fn import_commodities(&self, commodities: &[Commodity]) -> Result<CommodityImport> {
        let row_count = self.store.load_commodities(commodities).await?;
        Ok(CommodityImport {
            row_count,
            table_name: COMMODITIES_TABLE,
        })
    }

    /// Commodity lines per order id; orders without lines are omitted.
    pub async fn get_commodities_bulk(&self, order_ids: &[i64]) -> Result<BTreeMap<i64, Vec<CommodityLine>>> {
        Ok(self.store.commodities_for(order_ids).await?)
    }

    pub fn list_sheets(&self, path: &Path) -> Result<Vec<String>> {
        Ok(ingest_adapters::list_sheets(path)?)
    }

    pub async fn sniff_file(&self, path: &Path, num_lines: Option<usize>, offset: usize) -> Result<SniffedLines> {
        let lines = self.config.sniff_lines(num_lines);
        Ok(ingest_adapters::sniff_file(path, lines, offset).await?)
    }

    /// Guess fixed-width spans from the first lines of `path`.
    pub async fn guess_fixed_width_columns(&self, path: &Path) -> Result<Option<Vec<GuessedColumn>>> {
        let sniffed = self.sniff_file(path, None, 0).await?;
        Ok(ingest_adapters::guess_fixed_width_columns(&sniffed.lines))
    }

    pub async fn list_tables(&self, locator: &DatabaseLocator) -> Result<Vec<TableSummary>> {
        Ok(ingest_adapters::list_tables(locator, self.config.large_table_threshold).await?)
    }

    pub async fn describe(&self) -> Result<Description> {
        let active = self.active()?;
        let adapter = self.registry.get(active.source_type)?;
        let metadata = adapter.describe_current(&self.store).await?;
        let result = &active.result;
        Ok(Description {
            source_type: metadata.source_type,
            row_count: metadata.row_count,
            column_count: metadata.column_count,
            schema_signature: schema_signature(&metadata.columns),
            columns: metadata.columns,
            overrides: self.store.overrides().await,
            origin: active.origin.clone(),
            deterministic_ready: result.deterministic_ready,
            row_key_columns: result.row_key_columns.clone(),
            row_key_strategy: result.row_key_strategy,
            warnings: result.warnings.clone(),
        })
    }

    /// Row by identity number.
    pub async fn get_row(&self, row_number: u64) -> Result<RowView> {
        self.active()?;
        self.store
            .get_row(row_number)
            .await?
            .map(RowView::from)
            .ok_or_else(|| Error::not_found(format!("Row {row_number}")))
    }

    /// Rows matching `predicate` (`?` placeholders bound to `params`), in identity order.
    pub async fn get_rows_by_filter(
        &self,
        predicate: &str,
        params: &[Value],
        limit: Option<u64>,
        offset: u64,
    ) -> Result<FilterResult> {
        self.active()?;
        let limit = self.config.page_limit(limit);
        let page = self.store.filter(predicate, params, limit, offset).await?;
        let returned = page.rows.len() as u64;
        Ok(FilterResult {
            has_more: page.offset + returned < page.total_count,
            rows: page.rows.into_iter().map(RowView::from).collect(),
            total_count: page.total_count,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// Guarded read-only SQL over the active table.
    pub async fn query(&self, sql: &str) -> Result<QueryOutput> {
        self.active()?;
        Ok(self.store.query(sql).await?)
    }

    /// Distinct non-null values of `column`, at most [`MAX_COLUMN_SAMPLES`].
    pub async fn column_samples(&self, column: &str, limit: Option<u64>) -> Result<Vec<Value>> {
        self.active()?;
        let limit = limit.unwrap_or(DEFAULT_COLUMN_SAMPLES).clamp(1, MAX_COLUMN_SAMPLES);
        Ok(self.store.column_samples(column, limit).await?)
    }

    pub async fn override_column_type(&self, column: &str, type_name: &str) -> Result<TypeOverride> {
        self.active()?;
        Ok(self.store.set_override(column, type_name).await?)
    }

    /// Returns how many overrides were dropped.
    pub async fn clear_overrides(&self) -> usize {
        self.store.clear_overrides().await
    }

    /// Checksums for identities `start..=end`; missing identities are skipped.
    pub async fn compute_checksums(&self, start: u64, end: u64) -> Result<Vec<RowChecksum>> {
        self.active()?;
        if start == 0 || start > end {
            return Err(Error::rejected(format!("invalid row range {start}..={end}")));
        }
        let records = self.store.rows_between(start, end).await?;
        debug!(start, end, rows = records.len(), "Computed checksums");
        Ok(records
            .into_iter()
            .map(|record| RowChecksum {
                row_number: record.source_row_num,
                checksum: record.checksum(),
            })
            .collect())
    }

    pub async fn verify_checksum(&self, row_number: u64, expected: &str) -> Result<ChecksumVerification> {
        let row = self.get_row(row_number).await?;
        let expected = expected.trim().to_ascii_lowercase();
        Ok(ChecksumVerification {
            valid: row.checksum == expected,
            row_number,
            expected,
            actual: row.checksum,
        })
    }
}
