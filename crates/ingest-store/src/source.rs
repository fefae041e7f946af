//! Short-lived attachment to a relational source.
//!
//! A [`RemoteSource`] lives for one import or one write-back call and is
//! dropped right after, so neither the connection nor the credentials outlive
//! the call that needed them.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use ingest_ir::Value;
use libsql::{Builder, Connection, Database, params_from_iter};
use serde::Deserialize;
use tracing::debug;

use crate::convert::native_value;
use crate::sql::{TableRef, quote_identifier};
use crate::{Error, Result};

/// Where a relational source lives. Never logged in full.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseLocator {
    pub url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl DatabaseLocator {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            url: path.into(),
            auth_token: None,
        }
    }

    pub fn remote(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: Some(auth_token.into()),
        }
    }

    pub fn is_remote(&self) -> bool {
        let url = self.url.trim();
        url.starts_with("libsql://") || url.starts_with("https://") || url.starts_with("http://")
    }

    /// Location with any query string or user info removed.
    pub fn redacted(&self) -> String {
        let url = self.url.trim();
        let without_query = url.split(['?', '#']).next().unwrap_or_default();
        match without_query.split_once("://") {
            Some((scheme, rest)) => {
                let host = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
                format!("{scheme}://{host}")
            }
            None => without_query.to_string(),
        }
    }

    fn local_path(&self) -> &str {
        let url = self.url.trim();
        url.strip_prefix("file:").unwrap_or(url)
    }
}

impl fmt::Debug for DatabaseLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseLocator")
            .field("url", &self.redacted())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Whether the attachment may modify the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Rows fetched from a source with their native values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// An open connection to a relational source
pub struct RemoteSource {
    _database: Database,
    connection: Connection,
    label: String,
    mode: AccessMode,
}

impl fmt::Debug for RemoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSource")
            .field("label", &self.label)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl RemoteSource {
    /// Open `locator`. Local files must already exist; remote URLs need a token.
    pub async fn attach(locator: &DatabaseLocator, mode: AccessMode) -> Result<Self> {
        let url = locator.url.trim();
        if url.is_empty() {
            return Err(Error::Config {
                details: "database url must be provided".to_string(),
            });
        }

        let database = if locator.is_remote() {
            let token = locator.auth_token.clone().ok_or_else(|| Error::Config {
                details: "auth_token is required for remote databases".to_string(),
            })?;
            Builder::new_remote(url.to_string(), token)
                .build()
                .await
                .map_err(Error::libsql("open remote database"))?
        } else {
            let path = locator.local_path();
            if !Path::new(path).exists() {
                return Err(Error::not_found(format!("Database '{path}'")));
            }
            Builder::new_local(path)
                .build()
                .await
                .map_err(Error::libsql("open local database"))?
        };

        let connection = database.connect().map_err(Error::libsql("connect database"))?;
        if !locator.is_remote() {
            connection
                .busy_timeout(Duration::from_secs(5))
                .map_err(Error::libsql("set busy timeout"))?;
            if mode == AccessMode::ReadOnly {
                let pragma = "PRAGMA query_only = ON";
                connection.execute(pragma, ()).await.map_err(Error::sql(pragma))?;
            }
        }

        let label = locator.redacted();
        debug!(source = %label, ?mode, "Attached database source");
        Ok(Self {
            _database: database,
            connection,
            label,
            mode,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Output column names of `query`, without reading any rows.
    pub async fn output_columns(&self, query: &str) -> Result<Vec<String>> {
        let sql = format!("SELECT * FROM ({query}) LIMIT 0");
        let rows = self
            .connection
            .query(&sql, ())
            .await
            .map_err(Error::invalid_query(&sql))?;
        Ok((0..rows.column_count())
            .map(|idx| rows.column_name(idx).unwrap_or_default().to_string())
            .collect())
    }

    /// Primary-key columns in key order; empty when there is none.
    pub async fn primary_key_columns(&self, table: &TableRef) -> Result<Vec<String>> {
        let info = self.fetch(&table.pragma("table_info"), Vec::new()).await?;
        let name_idx = position(&info.columns, "name");
        let pk_idx = position(&info.columns, "pk");
        let (Some(name_idx), Some(pk_idx)) = (name_idx, pk_idx) else {
            return Ok(Vec::new());
        };

        let mut keyed: Vec<(i64, String)> = info
            .rows
            .iter()
            .filter_map(|row| match (&row[pk_idx], &row[name_idx]) {
                (Value::Integer(pk), Value::Text(name)) if *pk > 0 => Some((*pk, name.clone())),
                _ => None,
            })
            .collect();
        keyed.sort_by_key(|(pk, _)| *pk);
        Ok(keyed.into_iter().map(|(_, name)| name).collect())
    }

    /// Columns of the first unique, non-partial index over plain columns.
    pub async fn unique_key_columns(&self, table: &TableRef) -> Result<Option<Vec<String>>> {
        let indexes = self.fetch(&table.pragma("index_list"), Vec::new()).await?;
        let (Some(name_idx), Some(unique_idx)) = (
            position(&indexes.columns, "name"),
            position(&indexes.columns, "unique"),
        ) else {
            return Ok(None);
        };
        let partial_idx = position(&indexes.columns, "partial");

        for row in &indexes.rows {
            let unique = matches!(row[unique_idx], Value::Integer(1));
            let partial = partial_idx.is_some_and(|idx| matches!(row[idx], Value::Integer(1)));
            let Value::Text(index_name) = &row[name_idx] else {
                continue;
            };
            if !unique || partial {
                continue;
            }

            let index = TableRef {
                schema: table.schema.clone(),
                name: index_name.clone(),
            };
            let info = self.fetch(&index.pragma("index_info"), Vec::new()).await?;
            let Some(column_idx) = position(&info.columns, "name") else {
                continue;
            };
            let columns: Option<Vec<String>> = info
                .rows
                .iter()
                .map(|row| row[column_idx].as_text().map(str::to_string))
                .collect();
            if let Some(columns) = columns.filter(|columns| !columns.is_empty()) {
                return Ok(Some(columns));
            }
        }
        Ok(None)
    }

    pub async fn count_rows(&self, table: &TableRef) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.quoted());
        let fetched = self.fetch(&sql, Vec::new()).await?;
        match fetched.rows.first().and_then(|row| row.first()) {
            Some(Value::Integer(count)) => Ok(u64::try_from(*count).unwrap_or_default()),
            _ => Ok(0),
        }
    }

    /// User tables, sorted by name.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let sql = "SELECT name FROM sqlite_master WHERE type = 'table' \
                   AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_litestream_%' ORDER BY name";
        let fetched = self.fetch(sql, Vec::new()).await?;
        Ok(fetched
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(|value| value.to_text()))
            .collect())
    }

    pub async fn fetch(&self, sql: &str, params: Vec<Value>) -> Result<FetchedRows> {
        let params: Vec<libsql::Value> = params.iter().map(crate::convert::to_libsql).collect();
        let mut rows = self
            .connection
            .query(sql, params_from_iter(params))
            .await
            .map_err(Error::invalid_query(sql))?;

        let count = rows.column_count();
        let columns = (0..count)
            .map(|idx| rows.column_name(idx).unwrap_or_default().to_string())
            .collect();
        let mut output = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::sql(sql))? {
            let mut values = Vec::new();
            for idx in 0..count {
                values.push(native_value(row.get_value(idx).map_err(Error::sql(sql))?));
            }
            output.push(values);
        }
        Ok(FetchedRows {
            columns,
            rows: output,
        })
    }

    /// Run a modifying statement; returns affected rows.
    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        if self.mode == AccessMode::ReadOnly {
            return Err(Error::rejected("source is attached read-only"));
        }
        let params: Vec<libsql::Value> = params.iter().map(crate::convert::to_libsql).collect();
        self.connection
            .execute(sql, params_from_iter(params))
            .await
            .map_err(Error::sql(sql))
    }

    /// Column names of a table, in declaration order.
    pub async fn table_columns(&self, table: &TableRef) -> Result<Vec<String>> {
        let info = self.fetch(&table.pragma("table_info"), Vec::new()).await?;
        let Some(name_idx) = position(&info.columns, "name") else {
            return Ok(Vec::new());
        };
        Ok(info
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().nth(name_idx).and_then(|value| value.to_text()))
            .collect())
    }
}

impl Drop for RemoteSource {
    fn drop(&mut self) {
        debug!(source = %self.label, "Detached database source");
    }
}

fn position(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|column| column.eq_ignore_ascii_case(name))
}

/// `SELECT * FROM (<query>) AS _src ORDER BY <key>` with quoted key columns.
pub fn ordered_query(query: &str, key_columns: &[String]) -> String {
    if key_columns.is_empty() {
        return query.to_string();
    }
    let order: Vec<String> = key_columns.iter().map(|c| quote_identifier(c)).collect();
    format!("SELECT * FROM ({query}) AS _src ORDER BY {}", order.join(", "))
}
