//! Database write-back: a keyed `UPDATE` against the imported table.

use ingest_ir::{RowKeyStrategy, Value};
use ingest_store::{
    AccessMode, DatabaseLocator, FromTarget, RemoteSource, primary_from_target, quote_identifier,
    select_aliases,
};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Where and how to update one database row.
#[derive(Debug, Clone)]
pub struct DatabaseTarget<'a> {
    pub locator: &'a DatabaseLocator,
    /// The query the rows were imported with.
    pub query: &'a str,
    pub strategy: RowKeyStrategy,
    /// Key columns paired with the row's stored values.
    pub key: Vec<(String, Value)>,
}

/// `UPDATE <table> SET c = ?, .. WHERE k = ? AND ..`
pub fn update_statement(table: &str, set_columns: &[&str], key_columns: &[&str]) -> String {
    let set: Vec<String> = set_columns
        .iter()
        .map(|column| format!("{} = ?", quote_identifier(column)))
        .collect();
    let predicate: Vec<String> = key_columns
        .iter()
        .map(|column| format!("{} = ?", quote_identifier(column)))
        .collect();
    format!("UPDATE {table} SET {} WHERE {}", set.join(", "), predicate.join(" AND "))
}

/// Update the row identified by `target.key` with `outcome`. Returns the
/// table name written.
pub async fn write_database(target: &DatabaseTarget<'_>, outcome: &[(String, String)]) -> Result<String> {
    let table = match primary_from_target(target.query) {
        FromTarget::Table(table) => table,
        FromTarget::Join => {
            return Err(Error::conflict("import query joins several tables; no single table to update"));
        }
        FromTarget::Subquery => {
            return Err(Error::conflict("import query reads from a subquery; no single table to update"));
        }
        FromTarget::Missing => {
            return Err(Error::conflict("import query has no FROM table to update"));
        }
    };
    if target.strategy == RowKeyStrategy::None || target.key.is_empty() {
        return Err(Error::conflict(format!(
            "rows imported from '{table}' have no deterministic key; cannot address the row to update"
        )));
    }
    if let Some((column, _)) = target.key.iter().find(|(_, value)| value.is_null()) {
        return Err(Error::conflict(format!("key column '{column}' is null for this row")));
    }
    let aliases = select_aliases(target.query);
    if let Some((column, _)) = target
        .key
        .iter()
        .find(|(column, _)| aliases.iter().any(|alias| alias.eq_ignore_ascii_case(column)))
    {
        return Err(Error::conflict(format!(
            "key column '{column}' is an alias in the import query; select the key under its table name"
        )));
    }

    let source = RemoteSource::attach(target.locator, AccessMode::ReadWrite).await?;
    let existing = source.table_columns(&table).await?;
    let resolve = |column: &str| {
        existing
            .iter()
            .find(|name| name.eq_ignore_ascii_case(column))
            .cloned()
    };

    let mut missing = Vec::new();
    let mut set_columns = Vec::new();
    for (column, _) in outcome {
        match resolve(column) {
            Some(name) => set_columns.push(name),
            None => missing.push(column.clone()),
        }
    }
    if !missing.is_empty() {
        warn!(table = %table, ?missing, "Write-back columns missing from table");
        return Err(Error::conflict(format!(
            "table '{table}' has no column(s) {}; add them before writing back",
            missing.join(", ")
        )));
    }

    let mut key_columns = Vec::with_capacity(target.key.len());
    for (column, _) in &target.key {
        let name = resolve(column).ok_or_else(|| {
            Error::conflict(format!("key column '{column}' is not a column of table '{table}'"))
        })?;
        key_columns.push(name);
    }
    let key_refs: Vec<&str> = key_columns.iter().map(String::as_str).collect();
    let set_refs: Vec<&str> = set_columns.iter().map(String::as_str).collect();
    let sql = update_statement(&table.quoted(), &set_refs, &key_refs);
    let params: Vec<Value> = outcome
        .iter()
        .map(|(_, value)| Value::Text(value.clone()))
        .chain(target.key.iter().map(|(_, value)| value.clone()))
        .collect();

    let affected = source.execute(&sql, params).await?;
    if affected == 0 {
        return Err(Error::not_found(format!("Row with key {} in '{table}'", describe_key(&target.key))));
    }
    debug!(table = %table, affected, "Database write-back");
    Ok(table.to_string())
}

fn describe_key(key: &[(String, Value)]) -> String {
    key.iter()
        .map(|(column, value)| format!("{column}={}", value.to_text().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join(", ")
}
