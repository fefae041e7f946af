//! Write-back entrypoint.

use chrono::Utc;
use ingest_ir::{SourceType, Value};
use ingest_store::{DatabaseLocator, Record};
use ingest_writeback::request::SHIPPED_AT_COLUMN;
use ingest_writeback::{WriteBackOutcome, WriteBackRequest, WriteTarget, apply};
use tracing::info;

use crate::origin::{ActiveImport, Origin};
use crate::session::IngestSession;
use crate::{Error, Result};

const REFERENCE_FIELD: &str = "po_number";

fn reference_id(record: &Record) -> String {
    record
        .get(REFERENCE_FIELD)
        .and_then(Value::to_text)
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| record.source_row_num.to_string())
}

/// Stored value of a key column, matched by exact then case-insensitive name.
fn key_value(record: &Record, column: &str) -> Option<Value> {
    record.get(column).cloned().or_else(|| {
        record
            .fields
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(column.trim()))
            .map(|(_, value)| value.clone())
    })
}

fn target_for(active: &ActiveImport, record: &Record, locator: Option<&DatabaseLocator>) -> Result<WriteTarget> {
    match &active.origin {
        Origin::File {
            path, options, sheet, ..
        } => Ok(match active.source_type {
            SourceType::Delimited => WriteTarget::Delimited {
                path: path.clone(),
                options: options.clone(),
            },
            SourceType::Spreadsheet => WriteTarget::Spreadsheet {
                path: path.clone(),
                sheet: sheet.clone(),
                reference_id: reference_id(record),
            },
            _ => WriteTarget::Companion {
                path: path.clone(),
                reference_id: reference_id(record),
            },
        }),
        Origin::Inline { name } | Origin::Records { label: name } => Err(Error::conflict(format!(
            "'{name}' was imported from memory; there is no file to write back to"
        ))),
        Origin::Database { query, .. } => {
            let locator = locator.ok_or_else(|| {
                Error::conflict("database write-back needs the database locator again")
            })?;
            let strategy = active.result.row_key_strategy.unwrap_or_default();
            let columns = active.result.row_key_columns.clone().unwrap_or_default();
            let mut key = Vec::with_capacity(columns.len());
            for column in columns {
                let value = key_value(record, &column).ok_or_else(|| {
                    Error::conflict(format!("key column '{column}' is not in the imported row"))
                })?;
                key.push((column, value));
            }
            Ok(WriteTarget::Database {
                locator: locator.clone(),
                query: query.clone(),
                strategy,
                key,
            })
        }
    }
}

impl IngestSession {
    /// Persist an outcome for one row to where the row came from, then
    /// mirror it into the active import.
    ///
    /// `locator` is only needed when the active import came from a database.
    pub async fn write_back(
        &mut self,
        request: &WriteBackRequest,
        locator: Option<&DatabaseLocator>,
    ) -> Result<WriteBackOutcome> {
        let active = self.active()?;
        // Keys and references come from stored values; overrides only shape reads.
        let record = self
            .store
            .get_stored_row(request.row_number)
            .await?
            .ok_or_else(|| Error::not_found(format!("Row {}", request.row_number)))?;

        let target = target_for(active, &record, locator)?;
        let columns = request.outcome_columns(Utc::now());
        let applied = apply(&target, request.row_number, &columns).await?;

        let updates: Vec<(String, Value)> = columns
            .iter()
            .map(|(column, value)| (column.clone(), Value::Text(value.clone())))
            .collect();
        let mut columns_added = applied.columns_added;
        for column in self.store.update_row(request.row_number, &updates).await? {
            if !columns_added.contains(&column) {
                columns_added.push(column);
            }
        }

        let (fields, shipped_at): (Vec<_>, Vec<_>) = columns
            .into_iter()
            .partition(|(column, _)| column != SHIPPED_AT_COLUMN);
        let outcome = WriteBackOutcome {
            row_number: request.row_number,
            fields,
            shipped_at: shipped_at.into_iter().map(|(_, value)| value).next().unwrap_or_default(),
            destination: applied.destination,
            columns_added,
        };
        info!(
            row = outcome.row_number,
            destination = %outcome.destination,
            added = outcome.columns_added.len(),
            "Write-back complete"
        );
        Ok(outcome)
    }
}
