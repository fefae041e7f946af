//! Relational sources reached through libsql.
//!
//! The source is attached read-only for one import and detached when the
//! import returns. When a row key resolves, identities follow ascending key
//! order so re-running the same query reproduces the same numbering.

use async_trait::async_trait;
use ingest_ir::{ImportResult, RowKeyStrategy, SourceType, normalize_headers};
use ingest_store::{
    AccessMode, DatabaseLocator, FromTarget, RemoteSource, TableRef, TabularStore,
    ensure_read_only, has_where_clause, ordered_query, primary_from_target,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::adapter::SourceAdapter;
use crate::request::{ImportRequest, SourceInput};
use crate::tabulate::Table;
use crate::{Error, Result};

pub(crate) const NO_ROW_KEY: &str = "no deterministic row key; identity follows arrival order";

/// A table in a source database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub row_count: u64,
    /// Unfiltered imports of this table would be rejected.
    pub requires_filter: bool,
}

/// Tables with their sizes, flagging the ones above `threshold`.
pub async fn list_tables(locator: &DatabaseLocator, threshold: u64) -> Result<Vec<TableSummary>> {
    let source = RemoteSource::attach(locator, AccessMode::ReadOnly).await?;
    let mut summaries = Vec::new();
    for name in source.list_tables().await? {
        let row_count = source.count_rows(&TableRef::new(name.clone())).await?;
        summaries.push(TableSummary {
            name,
            row_count,
            requires_filter: row_count > threshold,
        });
    }
    Ok(summaries)
}

/// A resolved row key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey {
    pub strategy: RowKeyStrategy,
    pub columns: Vec<String>,
}

impl RowKey {
    fn none() -> Self {
        Self {
            strategy: RowKeyStrategy::None,
            columns: Vec::new(),
        }
    }
}

/// Map `wanted` onto the output spelling, or `None` when any is missing.
fn match_output(wanted: &[String], output: &[String]) -> Option<Vec<String>> {
    wanted
        .iter()
        .map(|name| {
            output
                .iter()
                .find(|column| column.eq_ignore_ascii_case(name))
                .cloned()
        })
        .collect()
}

/// Caller columns, then the primary key, then a unique index, then none.
pub async fn resolve_row_key(
    source: &RemoteSource,
    target: &FromTarget,
    output: &[String],
    requested: Option<&[String]>,
) -> Result<RowKey> {
    if let Some(requested) = requested.filter(|columns| !columns.is_empty()) {
        let columns = match_output(requested, output).ok_or_else(|| {
            Error::rejected(format!(
                "row key columns [{}] are not all in the query output [{}]",
                requested.join(", "),
                output.join(", ")
            ))
        })?;
        return Ok(RowKey {
            strategy: RowKeyStrategy::Explicit,
            columns,
        });
    }

    let Some(table) = target.table() else {
        return Ok(RowKey::none());
    };

    match source.primary_key_columns(table).await {
        Ok(pk) if !pk.is_empty() => {
            if let Some(columns) = match_output(&pk, output) {
                return Ok(RowKey {
                    strategy: RowKeyStrategy::AutoPrimaryKey,
                    columns,
                });
            }
        }
        Ok(_) => {}
        Err(err) => warn!(table = %table, error = %err, "Primary key introspection failed"),
    }

    match source.unique_key_columns(table).await {
        Ok(Some(unique)) => {
            if let Some(columns) = match_output(&unique, output) {
                return Ok(RowKey {
                    strategy: RowKeyStrategy::AutoUnique,
                    columns,
                });
            }
        }
        Ok(None) => {}
        Err(err) => warn!(table = %table, error = %err, "Unique index introspection failed"),
    }

    Ok(RowKey::none())
}

/// Reject unfiltered reads of a large plain table. A failing count is ignored.
async fn check_large_table(source: &RemoteSource, query: &str, threshold: u64) -> Result<()> {
    if has_where_clause(query) {
        return Ok(());
    }
    let FromTarget::Table(table) = primary_from_target(query) else {
        return Ok(());
    };
    match source.count_rows(&table).await {
        Ok(count) if count > threshold => Err(Error::LargeTable {
            table: table.to_string(),
            count,
            threshold,
        }),
        Ok(_) => Ok(()),
        Err(err) => {
            warn!(table = %table, error = %err, "Row count for large-table check failed");
            Ok(())
        }
    }
}

/// Database adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseAdapter;

#[async_trait]
impl SourceAdapter for DatabaseAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Database
    }

    async fn import(&self, store: &TabularStore, request: &ImportRequest) -> Result<ImportResult> {
        let SourceInput::Database { locator, query } = &request.input else {
            return Err(Error::rejected("database import needs a locator and a query"));
        };
        let query = ensure_read_only(query)?;

        let (key, fetched) = {
            let source = RemoteSource::attach(locator, AccessMode::ReadOnly).await?;
            debug!(source = %source.label(), "Attached database source");
            check_large_table(&source, &query, request.limits.large_table_threshold).await?;

            let output = source.output_columns(&query).await?;
            let target = primary_from_target(&query);
            let key = resolve_row_key(
                &source,
                &target,
                &output,
                request.options.row_key_columns.as_deref(),
            )
            .await?;
            let fetched = source
                .fetch(&ordered_query(&query, &key.columns), Vec::new())
                .await?;
            (key, fetched)
        };

        let headers = normalize_headers(&fetched.columns);
        let rows = fetched.rows.into_iter().zip(1u64..).map(|(values, n)| (n, values)).collect();
        let mut table = Table::from_value_rows(headers, rows, None);
        if key.strategy == RowKeyStrategy::None {
            table = table.with_warning(NO_ROW_KEY);
        }
        debug!(strategy = %key.strategy, key = ?key.columns, "Resolved row key");

        let result = table.load(store, SourceType::Database).await?;
        Ok(result.with_row_key(key.strategy, key.columns))
    }
}
