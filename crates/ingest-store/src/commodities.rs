//! Commodity lines for international shipments.
//!
//! They live in an auxiliary table next to the active import and are linked
//! to its rows by order id. Loading replaces every previous line. Reads
//! never require an active import.

use std::collections::BTreeMap;

use libsql::{Connection, Value as SqlValue, params_from_iter};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::sql::quote_identifier;
use crate::store::TabularStore;
use crate::{Error, Result};

/// Name of the auxiliary commodity table.
pub const COMMODITIES_TABLE: &str = "imported_commodities";

/// Carriers cap customs descriptions at this many characters.
const MAX_DESCRIPTION_CHARS: usize = 35;

const COLUMNS: &str =
    "order_id, description, commodity_code, origin_country, quantity, unit_value, unit_of_measure";

fn default_quantity() -> i64 {
    1
}

fn default_unit_value() -> String {
    "0".to_string()
}

fn default_unit() -> String {
    "PCS".to_string()
}

/// One commodity line as supplied for loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commodity {
    pub order_id: i64,
    pub description: String,
    #[serde(default)]
    pub commodity_code: String,
    /// ISO 3166-1 alpha-2 code, or empty when unknown.
    #[serde(default)]
    pub origin_country: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    /// Kept as text so the declared precision survives.
    #[serde(default = "default_unit_value")]
    pub unit_value: String,
    #[serde(default = "default_unit")]
    pub unit_of_measure: String,
}

impl Commodity {
    pub fn new(order_id: i64, description: impl Into<String>) -> Self {
        Self {
            order_id,
            description: description.into(),
            commodity_code: String::new(),
            origin_country: String::new(),
            quantity: default_quantity(),
            unit_value: default_unit_value(),
            unit_of_measure: default_unit(),
        }
    }

    /// Trim and case-fold the fields the way carriers expect them.
    fn normalized(&self) -> Result<CommodityLine> {
        let origin_country = self.origin_country.trim().to_ascii_uppercase();
        if !origin_country.is_empty()
            && (origin_country.len() != 2 || !origin_country.bytes().all(|b| b.is_ascii_alphabetic()))
        {
            return Err(Error::rejected(format!(
                "order {}: origin country '{}' is not a two-letter code",
                self.order_id, self.origin_country
            )));
        }
        let unit_of_measure = match self.unit_of_measure.trim() {
            "" => default_unit(),
            unit => unit.to_ascii_uppercase(),
        };
        let unit_value = match self.unit_value.trim() {
            "" => default_unit_value(),
            value => value.to_string(),
        };
        Ok(CommodityLine {
            description: self.description.trim().chars().take(MAX_DESCRIPTION_CHARS).collect(),
            commodity_code: self.commodity_code.trim().to_string(),
            origin_country,
            quantity: self.quantity,
            unit_value,
            unit_of_measure,
        })
    }
}

/// One stored commodity line, as returned per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommodityLine {
    pub description: String,
    pub commodity_code: String,
    pub origin_country: String,
    pub quantity: i64,
    pub unit_value: String,
    pub unit_of_measure: String,
}

impl TabularStore {
    /// Replace all commodity lines. Returns the number stored.
    pub async fn load_commodities(&self, commodities: &[Commodity]) -> Result<usize> {
        let lines = commodities
            .iter()
            .map(|commodity| Ok((commodity.order_id, commodity.normalized()?)))
            .collect::<Result<Vec<_>>>()?;

        let _exclusive = self.exclusive().await;
        let tx = self
            .connection()
            .transaction()
            .await
            .map_err(Error::libsql("begin commodity load"))?;
        let built = replace_commodities(&tx, &lines).await;
        if let Err(err) = built {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback of failed commodity load failed");
            }
            return Err(err);
        }
        tx.commit().await.map_err(Error::libsql("commit commodity load"))?;

        info!(rows = lines.len(), "Commodity table replaced");
        Ok(lines.len())
    }

    /// Commodity lines for each requested order, in load order. Orders
    /// without lines are left out; nothing loaded yields an empty map.
    pub async fn commodities_for(&self, order_ids: &[i64]) -> Result<BTreeMap<i64, Vec<CommodityLine>>> {
        let mut found = BTreeMap::new();
        if order_ids.is_empty() || !self.has_commodities().await? {
            return Ok(found);
        }

        let placeholders = vec!["?"; order_ids.len()].join(", ");
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE order_id IN ({placeholders}) ORDER BY rowid",
            quote_identifier(COMMODITIES_TABLE)
        );
        let params = order_ids.iter().map(|id| SqlValue::Integer(*id));
        let mut rows = self
            .connection()
            .query(&sql, params_from_iter(params))
            .await
            .map_err(Error::sql(&sql))?;
        while let Some(row) = rows.next().await.map_err(Error::sql(&sql))? {
            let order_id = row.get::<i64>(0).map_err(Error::sql(&sql))?;
            let line = CommodityLine {
                description: row.get::<String>(1).map_err(Error::sql(&sql))?,
                commodity_code: row.get::<String>(2).map_err(Error::sql(&sql))?,
                origin_country: row.get::<String>(3).map_err(Error::sql(&sql))?,
                quantity: row.get::<i64>(4).map_err(Error::sql(&sql))?,
                unit_value: row.get::<String>(5).map_err(Error::sql(&sql))?,
                unit_of_measure: row.get::<String>(6).map_err(Error::sql(&sql))?,
            };
            found.entry(order_id).or_insert_with(Vec::new).push(line);
        }
        Ok(found)
    }

    async fn has_commodities(&self) -> Result<bool> {
        let sql = "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?";
        let mut rows = self
            .connection()
            .query(sql, params_from_iter([SqlValue::Text(COMMODITIES_TABLE.to_string())]))
            .await
            .map_err(Error::sql(sql))?;
        Ok(rows.next().await.map_err(Error::sql(sql))?.is_some())
    }
}

pub(crate) async fn drop_commodities(connection: &Connection) -> Result<()> {
    let sql = format!("DROP TABLE IF EXISTS {}", quote_identifier(COMMODITIES_TABLE));
    connection.execute(&sql, ()).await.map_err(Error::sql(&sql))?;
    Ok(())
}

async fn replace_commodities(connection: &Connection, lines: &[(i64, CommodityLine)]) -> Result<()> {
    drop_commodities(connection).await?;
    let table = quote_identifier(COMMODITIES_TABLE);
    let create = format!(
        "CREATE TABLE {table} (order_id INTEGER NOT NULL, description TEXT NOT NULL, \
         commodity_code TEXT NOT NULL, origin_country TEXT NOT NULL, quantity INTEGER NOT NULL, \
         unit_value TEXT NOT NULL, unit_of_measure TEXT NOT NULL)"
    );
    connection.execute(&create, ()).await.map_err(Error::sql(&create))?;

    let insert = format!("INSERT INTO {table} ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)");
    for (order_id, line) in lines {
        let params = vec![
            SqlValue::Integer(*order_id),
            SqlValue::Text(line.description.clone()),
            SqlValue::Text(line.commodity_code.clone()),
            SqlValue::Text(line.origin_country.clone()),
            SqlValue::Integer(line.quantity),
            SqlValue::Text(line.unit_value.clone()),
            SqlValue::Text(line.unit_of_measure.clone()),
        ];
        connection
            .execute(&insert, params_from_iter(params))
            .await
            .map_err(Error::sql(&insert))?;
    }
    Ok(())
}
