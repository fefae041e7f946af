//! Row checksums and schema signatures.

use std::collections::BTreeMap;

use ingest_ir::{IDENTITY_COLUMN, SchemaColumn, Value};
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};

/// SHA-256 hex digest over a row's fields serialized with sorted keys.
///
/// The identity column is never part of the digest, so the checksum depends
/// only on field names and values.
pub fn row_checksum<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let sorted: BTreeMap<&str, JsonValue> = fields
        .into_iter()
        .filter(|(name, _)| *name != IDENTITY_COLUMN)
        .map(|(name, value)| (name, value.to_json()))
        .collect();

    let mut object = Map::with_capacity(sorted.len());
    for (name, value) in sorted {
        object.insert(name.to_string(), value);
    }
    let canonical = JsonValue::Object(object).to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Digest of column names, types and nullability in schema order.
pub fn schema_signature(columns: &[SchemaColumn]) -> String {
    let joined = columns
        .iter()
        .map(|column| {
            format!(
                "{}:{}:{}",
                column.name,
                column.column_type.as_str(),
                u8::from(column.nullable)
            )
        })
        .collect::<Vec<_>>()
        .join("|");
    hex::encode(Sha256::digest(joined.as_bytes()))
}
