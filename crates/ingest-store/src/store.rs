//! The active tabular store.
//!
//! One in-memory libsql database holds exactly one table, [`TABLE_NAME`],
//! keyed by the identity column. Loads build a staging table inside a single
//! transaction and rename it over the live one, so either the new import
//! becomes visible as a whole or the previous one stays untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use ingest_ir::{ColumnType, IDENTITY_COLUMN, ImportedRow, SchemaColumn, Value};
use libsql::{Builder, Connection, Database, params_from_iter};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::checksum::row_checksum;
use crate::commodities::drop_commodities;
use crate::convert::{from_libsql, native_value, storage_type, to_libsql};
use crate::overrides::TypeOverride;
use crate::sql::{ensure_read_only, ensure_safe_predicate, quote_identifier};
use crate::{Error, Result};

/// Name of the single table holding the active import.
pub const TABLE_NAME: &str = "imported_data";

const STAGING_TABLE: &str = "imported_data_staging";

/// Bound on bind parameters per INSERT statement.
const MAX_PARAMS: usize = 900;

/// One stored row as read back, with overrides applied unless read raw.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub source_row_num: u64,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn checksum(&self) -> String {
        row_checksum(self.fields.iter().map(|(name, value)| (name.as_str(), value)))
    }

    /// Field values as a JSON object in schema order; the identity is not included.
    pub fn to_json(&self) -> JsonValue {
        let mut object = Map::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            object.insert(name.clone(), value.to_json());
        }
        JsonValue::Object(object)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// A page of rows matching a filter.
#[derive(Debug, Clone, Serialize)]
pub struct FilterPage {
    pub rows: Vec<Record>,
    pub total_count: u64,
    pub limit: u64,
    pub offset: u64,
}

/// Result of an ad-hoc read query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct ActiveTable {
    columns: Vec<SchemaColumn>,
    overrides: BTreeMap<String, TypeOverride>,
}

/// How one column is selected and decoded on the read path.
struct ReadColumn {
    name: String,
    expression: String,
    column_type: ColumnType,
}

impl ActiveTable {
    fn new(columns: Vec<SchemaColumn>) -> Self {
        Self {
            columns,
            overrides: BTreeMap::new(),
        }
    }

    fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|column| column.name == name)
    }

    fn read_column(&self, column: &SchemaColumn) -> ReadColumn {
        match self.overrides.get(&column.name) {
            Some(over) => ReadColumn {
                name: column.name.clone(),
                expression: over.expression(&quote_identifier(&column.name)),
                column_type: over.target,
            },
            None => stored_column(column),
        }
    }

    fn plan(&self) -> Vec<ReadColumn> {
        self.columns.iter().map(|column| self.read_column(column)).collect()
    }

    /// Read plan that ignores overrides.
    fn stored_plan(&self) -> Vec<ReadColumn> {
        self.columns.iter().map(stored_column).collect()
    }
}

fn stored_column(column: &SchemaColumn) -> ReadColumn {
    ReadColumn {
        name: column.name.clone(),
        expression: quote_identifier(&column.name),
        column_type: column.column_type,
    }
}

fn select_list(plan: &[ReadColumn]) -> String {
    let mut parts = vec![quote_identifier(IDENTITY_COLUMN)];
    parts.extend(
        plan.iter()
            .map(|column| format!("{} AS {}", column.expression, quote_identifier(&column.name))),
    );
    parts.join(", ")
}

fn column_index(idx: usize) -> i32 {
    i32::try_from(idx).unwrap_or(i32::MAX)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// The process-wide tabular store
pub struct TabularStore {
    // Keep the Database alive for the lifetime of the connection.
    _database: Database,
    connection: Connection,
    active: RwLock<Option<ActiveTable>>,
}

impl fmt::Debug for TabularStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabularStore").field("table", &TABLE_NAME).finish_non_exhaustive()
    }
}

impl TabularStore {
    /// Open an empty in-memory store.
    pub async fn open_in_memory() -> Result<Self> {
        let database = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(Error::libsql("open store"))?;
        let connection = database.connect().map_err(Error::libsql("connect store"))?;
        connection
            .busy_timeout(Duration::from_secs(5))
            .map_err(Error::libsql("set busy timeout"))?;
        Ok(Self {
            _database: database,
            connection,
            active: RwLock::new(None),
        })
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Hold off loads and row updates while another table is rewritten.
    pub(crate) async fn exclusive(&self) -> RwLockWriteGuard<'_, Option<ActiveTable>> {
        self.active.write().await
    }

    pub async fn is_loaded(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Replace the active table with `rows`. Overrides are reset.
    pub async fn load(&self, columns: &[SchemaColumn], rows: &[ImportedRow]) -> Result<usize> {
        if let Some(row) = rows.iter().find(|row| row.values.len() != columns.len()) {
            return Err(Error::Load {
                details: format!(
                    "row {} has {} values for {} columns",
                    row.source_row_num,
                    row.values.len(),
                    columns.len()
                ),
            });
        }

        let mut active = self.active.write().await;
        let tx = self
            .connection
            .transaction()
            .await
            .map_err(Error::libsql("begin load"))?;
        let built = build_and_swap(&tx, columns, rows).await;
        if let Err(err) = built {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback of failed load failed");
            }
            return Err(err);
        }
        tx.commit().await.map_err(Error::libsql("commit load"))?;

        *active = Some(ActiveTable::new(columns.to_vec()));
        info!(rows = rows.len(), columns = columns.len(), "Store table replaced");
        Ok(rows.len())
    }

    /// Drop the active table, its overrides and any commodity lines.
    pub async fn clear(&self) -> Result<()> {
        let mut active = self.active.write().await;
        let sql = format!("DROP TABLE IF EXISTS {}", quote_identifier(TABLE_NAME));
        self.connection.execute(&sql, ()).await.map_err(Error::sql(&sql))?;
        drop_commodities(&self.connection).await?;
        *active = None;
        debug!("Store cleared");
        Ok(())
    }

    /// Stored schema, excluding the identity column.
    pub async fn columns(&self) -> Result<Vec<SchemaColumn>> {
        let active = self.active.read().await;
        let table = active.as_ref().ok_or(Error::NoActiveImport)?;
        Ok(table.columns.clone())
    }

    pub async fn overrides(&self) -> Vec<TypeOverride> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|table| table.overrides.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn row_count(&self) -> Result<u64> {
        let active = self.active.read().await;
        active.as_ref().ok_or(Error::NoActiveImport)?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(TABLE_NAME));
        self.count(&sql, Vec::new()).await
    }

    /// Fetch one row by identity number.
    pub async fn get_row(&self, row_number: u64) -> Result<Option<Record>> {
        let active = self.active.read().await;
        let table = active.as_ref().ok_or(Error::NoActiveImport)?;
        self.fetch_row(row_number, &table.plan()).await
    }

    /// Fetch one row as stored, with no override applied.
    pub async fn get_stored_row(&self, row_number: u64) -> Result<Option<Record>> {
        let active = self.active.read().await;
        let table = active.as_ref().ok_or(Error::NoActiveImport)?;
        self.fetch_row(row_number, &table.stored_plan()).await
    }

    async fn fetch_row(&self, row_number: u64, plan: &[ReadColumn]) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            select_list(plan),
            quote_identifier(TABLE_NAME),
            quote_identifier(IDENTITY_COLUMN)
        );
        let mut records = self
            .records(&sql, vec![libsql::Value::Integer(to_i64(row_number))], plan)
            .await?;
        Ok(records.pop())
    }

    /// Rows with identity numbers in `start..=end`, in identity order.
    pub async fn rows_between(&self, start: u64, end: u64) -> Result<Vec<Record>> {
        let active = self.active.read().await;
        let table = active.as_ref().ok_or(Error::NoActiveImport)?;
        let plan = table.plan();
        let identity = quote_identifier(IDENTITY_COLUMN);
        let sql = format!(
            "SELECT {} FROM {} WHERE {identity} BETWEEN ? AND ? ORDER BY {identity}",
            select_list(&plan),
            quote_identifier(TABLE_NAME),
        );
        let params = vec![
            libsql::Value::Integer(to_i64(start)),
            libsql::Value::Integer(to_i64(end)),
        ];
        self.records(&sql, params, &plan).await
    }

    /// Rows matching a guarded predicate with `?` placeholders bound to `params`.
    pub async fn filter(
        &self,
        predicate: &str,
        params: &[Value],
        limit: u64,
        offset: u64,
    ) -> Result<FilterPage> {
        let predicate = ensure_safe_predicate(predicate)?;
        let active = self.active.read().await;
        let table = active.as_ref().ok_or(Error::NoActiveImport)?;
        let plan = table.plan();

        let where_sql = if predicate.is_empty() {
            String::new()
        } else {
            format!(" WHERE ({predicate})")
        };
        let bound: Vec<libsql::Value> = params.iter().map(to_libsql).collect();

        let count_sql = format!("SELECT COUNT(*) FROM {}{where_sql}", quote_identifier(TABLE_NAME));
        let total_count = self.count(&count_sql, bound.clone()).await?;

        let sql = format!(
            "SELECT {} FROM {}{where_sql} ORDER BY {} LIMIT {limit} OFFSET {offset}",
            select_list(&plan),
            quote_identifier(TABLE_NAME),
            quote_identifier(IDENTITY_COLUMN),
        );
        let rows = self.records(&sql, bound, &plan).await?;
        debug!(matched = total_count, returned = rows.len(), "Filter query");
        Ok(FilterPage {
            rows,
            total_count,
            limit,
            offset,
        })
    }

    /// Distinct non-null values of one column, in ascending order.
    pub async fn column_samples(&self, column: &str, limit: u64) -> Result<Vec<Value>> {
        let active = self.active.read().await;
        let table = active.as_ref().ok_or(Error::NoActiveImport)?;
        let schema_column = table
            .column(column)
            .ok_or_else(|| Error::not_found(format!("Column '{column}'")))?;
        let read = table.read_column(schema_column);
        let sql = format!(
            "SELECT DISTINCT {expr} FROM {} WHERE {expr} IS NOT NULL ORDER BY 1 LIMIT {limit}",
            quote_identifier(TABLE_NAME),
            expr = read.expression,
        );

        let mut rows = self.connection.query(&sql, ()).await.map_err(Error::sql(&sql))?;
        let mut samples = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::sql(&sql))? {
            let value = row.get_value(0).map_err(Error::sql(&sql))?;
            samples.push(from_libsql(value, read.column_type));
        }
        Ok(samples)
    }

    /// Run a guarded read-only query against the store.
    pub async fn query(&self, sql: &str) -> Result<QueryOutput> {
        let cleaned = ensure_read_only(sql)?;
        let active = self.active.read().await;
        let table = active.as_ref().ok_or(Error::NoActiveImport)?;

        self.set_query_only(true).await?;
        let result = self.read_query(&cleaned, table).await;
        let reset = self.set_query_only(false).await;
        let output = result?;
        reset?;
        debug!(rows = output.row_count, "Ad-hoc query");
        Ok(output)
    }

    /// Record a read-time type override for an existing column.
    pub async fn set_override(&self, column: &str, type_name: &str) -> Result<TypeOverride> {
        let mut active = self.active.write().await;
        let table = active.as_mut().ok_or(Error::NoActiveImport)?;
        if table.column(column).is_none() {
            return Err(Error::not_found(format!("Column '{column}'")));
        }
        let parsed = TypeOverride::parse(column, type_name)?;
        table.overrides.insert(column.to_string(), parsed.clone());
        debug!(column, type_name = %parsed.type_name, "Type override set");
        Ok(parsed)
    }

    /// Remove every override; returns how many were active.
    pub async fn clear_overrides(&self) -> usize {
        let mut active = self.active.write().await;
        active
            .as_mut()
            .map(|table| std::mem::take(&mut table.overrides).len())
            .unwrap_or_default()
    }

    /// Set field values on one row, adding missing columns as nullable text.
    /// Returns the names of the columns that were added.
    pub async fn update_row(&self, row_number: u64, updates: &[(String, Value)]) -> Result<Vec<String>> {
        if updates.iter().any(|(name, _)| name == IDENTITY_COLUMN) {
            return Err(Error::rejected("the identity column cannot be updated"));
        }
        if updates.is_empty() {
            return Ok(Vec::new());
        }

        let mut active = self.active.write().await;
        let table = active.as_mut().ok_or(Error::NoActiveImport)?;
        let mut added = Vec::new();
        for (name, _) in updates {
            if table.column(name).is_none() && !added.contains(name) {
                added.push(name.clone());
            }
        }

        let tx = self
            .connection
            .transaction()
            .await
            .map_err(Error::libsql("begin row update"))?;
        let applied = apply_update(&tx, row_number, updates, &added).await;
        match applied {
            Ok(()) => tx.commit().await.map_err(Error::libsql("commit row update"))?,
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback of failed row update failed");
                }
                return Err(err);
            }
        }

        table
            .columns
            .extend(added.iter().map(|name| SchemaColumn::new(name, ColumnType::Text)));
        debug!(row_number, added = added.len(), "Stored row updated");
        Ok(added)
    }

    async fn set_query_only(&self, enabled: bool) -> Result<()> {
        let sql = if enabled {
            "PRAGMA query_only = ON"
        } else {
            "PRAGMA query_only = OFF"
        };
        self.connection.execute(sql, ()).await.map_err(Error::sql(sql))?;
        Ok(())
    }

    async fn read_query(&self, sql: &str, table: &ActiveTable) -> Result<QueryOutput> {
        let mut rows = self
            .connection
            .query(sql, ())
            .await
            .map_err(Error::invalid_query(sql))?;

        let mut keep = Vec::new();
        let mut columns = Vec::new();
        for idx in 0..rows.column_count() {
            let name = rows.column_name(idx).unwrap_or_default().to_string();
            if name == IDENTITY_COLUMN {
                continue;
            }
            let column_type = table.column(&name).map(|column| column.column_type);
            keep.push((idx, column_type));
            columns.push(name);
        }

        let mut output = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::invalid_query(sql))? {
            let mut values = Vec::with_capacity(keep.len());
            for (idx, column_type) in &keep {
                let raw = row.get_value(*idx).map_err(Error::invalid_query(sql))?;
                values.push(match column_type {
                    Some(column_type) => from_libsql(raw, *column_type),
                    None => native_value(raw),
                });
            }
            output.push(values);
        }

        Ok(QueryOutput {
            row_count: output.len(),
            columns,
            rows: output,
        })
    }

    async fn count(&self, sql: &str, params: Vec<libsql::Value>) -> Result<u64> {
        let mut rows = self
            .connection
            .query(sql, params_from_iter(params))
            .await
            .map_err(Error::invalid_query(sql))?;
        let row = rows.next().await.map_err(Error::invalid_query(sql))?;
        match row.map(|row| row.get_value(0)).transpose().map_err(Error::sql(sql))? {
            Some(libsql::Value::Integer(count)) => Ok(u64::try_from(count).unwrap_or_default()),
            _ => Ok(0),
        }
    }

    async fn records(
        &self,
        sql: &str,
        params: Vec<libsql::Value>,
        plan: &[ReadColumn],
    ) -> Result<Vec<Record>> {
        let mut rows = self
            .connection
            .query(sql, params_from_iter(params))
            .await
            .map_err(Error::invalid_query(sql))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::sql(sql))? {
            let source_row_num = match row.get_value(0).map_err(Error::sql(sql))? {
                libsql::Value::Integer(id) => u64::try_from(id).unwrap_or_default(),
                _ => 0,
            };
            let mut fields = Vec::with_capacity(plan.len());
            for (idx, column) in plan.iter().enumerate() {
                let raw = row.get_value(column_index(idx + 1)).map_err(Error::sql(sql))?;
                fields.push((column.name.clone(), from_libsql(raw, column.column_type)));
            }
            records.push(Record {
                source_row_num,
                fields,
            });
        }
        Ok(records)
    }
}

async fn execute(connection: &Connection, sql: &str) -> Result<u64> {
    connection.execute(sql, ()).await.map_err(Error::sql(sql))
}

async fn build_and_swap(
    connection: &Connection,
    columns: &[SchemaColumn],
    rows: &[ImportedRow],
) -> Result<()> {
    let staging = quote_identifier(STAGING_TABLE);
    execute(connection, &format!("DROP TABLE IF EXISTS {staging}")).await?;

    let mut definitions = vec![format!("{} INTEGER PRIMARY KEY", quote_identifier(IDENTITY_COLUMN))];
    definitions.extend(columns.iter().map(|column| {
        format!(
            "{} {}",
            quote_identifier(&column.name),
            storage_type(column.column_type)
        )
    }));
    execute(
        connection,
        &format!("CREATE TABLE {staging} ({})", definitions.join(", ")),
    )
    .await?;

    let width = columns.len() + 1;
    let mut names = vec![quote_identifier(IDENTITY_COLUMN)];
    names.extend(columns.iter().map(|column| quote_identifier(&column.name)));
    let column_list = names.join(", ");
    let placeholders = format!("({})", vec!["?"; width].join(", "));

    for batch in rows.chunks((MAX_PARAMS / width).max(1)) {
        let sql = format!(
            "INSERT INTO {staging} ({column_list}) VALUES {}",
            vec![placeholders.as_str(); batch.len()].join(", ")
        );
        let mut params = Vec::with_capacity(batch.len() * width);
        for row in batch {
            let id = i64::try_from(row.source_row_num).map_err(|_| Error::Load {
                details: format!("row number {} is out of range", row.source_row_num),
            })?;
            params.push(libsql::Value::Integer(id));
            params.extend(row.values.iter().map(to_libsql));
        }
        connection
            .execute(&sql, params_from_iter(params))
            .await
            .map_err(Error::sql(&sql))?;
    }

    let live = quote_identifier(TABLE_NAME);
    execute(connection, &format!("DROP TABLE IF EXISTS {live}")).await?;
    execute(connection, &format!("ALTER TABLE {staging} RENAME TO {live}")).await?;
    Ok(())
}

async fn apply_update(
    connection: &Connection,
    row_number: u64,
    updates: &[(String, Value)],
    added: &[String],
) -> Result<()> {
    let live = quote_identifier(TABLE_NAME);
    for name in added {
        execute(
            connection,
            &format!("ALTER TABLE {live} ADD COLUMN {} TEXT", quote_identifier(name)),
        )
        .await?;
    }

    let assignments: Vec<String> = updates
        .iter()
        .map(|(name, _)| format!("{} = ?", quote_identifier(name)))
        .collect();
    let sql = format!(
        "UPDATE {live} SET {} WHERE {} = ?",
        assignments.join(", "),
        quote_identifier(IDENTITY_COLUMN)
    );
    let mut params: Vec<libsql::Value> = updates.iter().map(|(_, value)| to_libsql(value)).collect();
    params.push(libsql::Value::Integer(to_i64(row_number)));

    let changed = connection
        .execute(&sql, params_from_iter(params))
        .await
        .map_err(Error::sql(&sql))?;
    if changed == 0 {
        return Err(Error::not_found(format!("Row {row_number}")));
    }
    Ok(())
}
