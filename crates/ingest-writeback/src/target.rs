//! Routing an outcome to the destination its rows came from.

use std::path::PathBuf;

use ingest_adapters::FormatOptions;
use ingest_ir::{RowKeyStrategy, Value};
use ingest_store::DatabaseLocator;
use serde::Serialize;
use tracing::info;

use crate::Result;
use crate::companion::append_outcome;
use crate::database::{DatabaseTarget, write_database};
use crate::delimited::write_delimited;
use crate::spreadsheet::{supports_in_place, write_workbook};

/// Destination of a write-back.
#[derive(Debug, Clone)]
pub enum WriteTarget {
    /// Rewrite the header and the target record of a delimited file.
    Delimited { path: PathBuf, options: FormatOptions },
    /// Rebuild an `.xlsx`/`.xlsm` workbook, or fall back to a companion file.
    Spreadsheet {
        path: PathBuf,
        sheet: Option<String>,
        reference_id: String,
    },
    /// Append to `<stem>_results.csv` beside `path`.
    Companion { path: PathBuf, reference_id: String },
    /// Keyed `UPDATE` of the table the rows were imported from.
    Database {
        locator: DatabaseLocator,
        query: String,
        strategy: RowKeyStrategy,
        key: Vec<(String, Value)>,
    },
}

/// Where an outcome landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Applied {
    pub destination: String,
    pub columns_added: Vec<String>,
}

/// Persist `outcome` for data row `row_number` at `target`.
pub async fn apply(target: &WriteTarget, row_number: u64, outcome: &[(String, String)]) -> Result<Applied> {
    let applied = match target {
        WriteTarget::Delimited { path, options } => Applied {
            destination: path.display().to_string(),
            columns_added: write_delimited(path, options, row_number, outcome)?,
        },
        WriteTarget::Spreadsheet { path, sheet, .. } if supports_in_place(path) => Applied {
            destination: path.display().to_string(),
            columns_added: write_workbook(path, sheet.as_deref(), row_number, outcome)?,
        },
        WriteTarget::Spreadsheet {
            path, reference_id, ..
        }
        | WriteTarget::Companion { path, reference_id } => {
            let (companion, columns_added) = append_outcome(path, row_number, reference_id, outcome)?;
            Applied {
                destination: companion.display().to_string(),
                columns_added,
            }
        }
        WriteTarget::Database {
            locator,
            query,
            strategy,
            key,
        } => {
            let target = DatabaseTarget {
                locator,
                query,
                strategy: *strategy,
                key: key.clone(),
            };
            Applied {
                destination: write_database(&target, outcome).await?,
                columns_added: Vec::new(),
            }
        }
    };
    info!(
        destination = %applied.destination,
        row = row_number,
        added = applied.columns_added.len(),
        "Write-back applied"
    );
    Ok(applied)
}
