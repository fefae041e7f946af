//! Typing of raw grids and records into a loadable table.

use std::collections::HashMap;

use ingest_ir::{
    ColumnProfile, ColumnType, ImportResult, ImportedRow, SchemaColumn, SourceType, Value,
    classify_text, normalize_headers,
};
use ingest_store::TabularStore;
use tracing::info;

use crate::Result;

/// Typed rows ready to be swapped into the store.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Table {
    pub columns: Vec<SchemaColumn>,
    pub rows: Vec<ImportedRow>,
    pub warnings: Vec<String>,
}

impl Table {
    /// Type text cells by classifying every cell of every column.
    ///
    /// Text columns keep the raw cell; other columns get the classified value
    /// widened to the column type.
    pub(crate) fn from_text_rows(headers: Vec<String>, rows: Vec<(u64, Vec<Option<String>>)>) -> Self {
        let mut profiles: Vec<ColumnProfile> = headers.iter().map(ColumnProfile::new).collect();
        let mut classified_rows = Vec::with_capacity(rows.len());

        for (row_num, cells) in rows {
            let mut classified = Vec::with_capacity(cells.len());
            for (profile, cell) in profiles.iter_mut().zip(cells) {
                match cell.filter(|raw| !raw.trim().is_empty()) {
                    None => {
                        profile.mark_null();
                        classified.push(None);
                    }
                    Some(raw) => {
                        let reading = classify_text(&raw);
                        profile.observe_text(&raw, &reading);
                        classified.push(Some((raw, reading.value)));
                    }
                }
            }
            classified_rows.push((row_num, classified));
        }

        let types: Vec<ColumnType> = profiles.iter().map(ColumnProfile::column_type).collect();
        let rows = classified_rows
            .into_iter()
            .map(|(row_num, cells)| {
                let values = cells
                    .into_iter()
                    .zip(&types)
                    .map(|(cell, column_type)| match (cell, column_type) {
                        (None, _) => Value::Null,
                        (Some((raw, _)), ColumnType::Text) => Value::Text(raw),
                        (Some((_, value)), other) => value.coerce(*other),
                    })
                    .collect();
                ImportedRow::new(row_num, values)
            })
            .collect();

        Self::finish(&profiles, rows)
    }

    /// Type native values, observing at most `sample` non-null values per column.
    pub(crate) fn from_value_rows(
        headers: Vec<String>,
        rows: Vec<(u64, Vec<Value>)>,
        sample: Option<usize>,
    ) -> Self {
        let mut profiles: Vec<ColumnProfile> = headers.iter().map(ColumnProfile::new).collect();
        let mut observed = vec![0usize; headers.len()];

        for (_, values) in &rows {
            for ((profile, seen), value) in profiles.iter_mut().zip(observed.iter_mut()).zip(values) {
                if value.is_null() {
                    profile.mark_null();
                } else if sample.is_none_or(|limit| *seen < limit) {
                    profile.observe(value);
                    *seen += 1;
                }
            }
        }

        let types: Vec<ColumnType> = profiles.iter().map(ColumnProfile::column_type).collect();
        let rows = rows
            .into_iter()
            .map(|(row_num, values)| {
                let values = values
                    .into_iter()
                    .zip(&types)
                    .map(|(value, column_type)| value.coerce(*column_type))
                    .collect();
                ImportedRow::new(row_num, values)
            })
            .collect();

        Self::finish(&profiles, rows)
    }

    /// Union of keys in first-seen order; records missing a key get null.
    pub(crate) fn from_records(records: Vec<Vec<(String, Value)>>) -> Self {
        let mut keys: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for record in &records {
            for (key, _) in record {
                if !index.contains_key(key) {
                    index.insert(key.clone(), keys.len());
                    keys.push(key.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .zip(1u64..)
            .map(|(record, row_num)| {
                let mut values = vec![Value::Null; keys.len()];
                for (key, value) in record {
                    if let Some(&position) = index.get(&key) {
                        values[position] = value;
                    }
                }
                (row_num, values)
            })
            .collect();

        Self::from_value_rows(normalize_headers(&keys), rows, None)
    }

    fn finish(profiles: &[ColumnProfile], rows: Vec<ImportedRow>) -> Self {
        let columns: Vec<SchemaColumn> = profiles.iter().map(ColumnProfile::finish).collect();
        let warnings = columns
            .iter()
            .flat_map(|column| column.warnings.iter().cloned())
            .collect();
        Self {
            columns,
            rows,
            warnings,
        }
    }

    pub(crate) fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Swap the table into the store.
    pub(crate) async fn load(self, store: &TabularStore, source_type: SourceType) -> Result<ImportResult> {
        let row_count = store.load(&self.columns, &self.rows).await?;
        info!(
            source_type = %source_type,
            rows = row_count,
            columns = self.columns.len(),
            warnings = self.warnings.len(),
            "Import complete"
        );
        Ok(ImportResult::new(source_type, row_count, self.columns).with_warnings(self.warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(cells: &[&str]) -> Vec<Option<String>> {
        cells
            .iter()
            .map(|cell| (!cell.is_empty()).then(|| (*cell).to_string()))
            .collect()
    }

    #[test]
    fn test_text_grid_scans_every_cell() {
        let headers = vec!["zip".to_string(), "qty".to_string(), "mixed".to_string()];
        let rows = vec![
            (1, text(&["07302", "1", "5"])),
            (2, text(&["10001", "2.5", "5"])),
            (3, text(&["", "3", "abc"])),
        ];
        let table = Table::from_text_rows(headers, rows);

        assert_eq!(table.columns[0].column_type, ColumnType::Text);
        assert!(table.columns[0].nullable);
        assert_eq!(table.columns[1].column_type, ColumnType::Float);
        assert!(!table.columns[1].nullable);
        assert_eq!(table.columns[2].column_type, ColumnType::Text);
        assert_eq!(table.warnings.len(), 1);

        assert_eq!(table.rows[0].values[0], Value::from("07302"));
        assert_eq!(table.rows[0].values[1], Value::Float(1.0));
        assert_eq!(table.rows[1].values[2], Value::from("5"));
        assert_eq!(table.rows[2].values[0], Value::Null);
    }

    #[test]
    fn test_ambiguous_dates_warn_once() {
        let headers = vec!["ordered".to_string()];
        let rows = vec![(1, text(&["03/04/2024"])), (2, text(&["05/06/2024"]))];
        let table = Table::from_text_rows(headers, rows);
        assert_eq!(table.columns[0].column_type, ColumnType::Date);
        assert_eq!(table.warnings.len(), 1);
        assert!(table.warnings[0].contains("ambiguous date '03/04/2024'"));
    }

    #[test]
    fn test_records_union_keys_in_first_seen_order() {
        let records = vec![
            vec![("id".to_string(), Value::Integer(1)), ("name".to_string(), "a".into())],
            vec![("id".to_string(), Value::Float(2.5)), ("extra".to_string(), Value::Boolean(true))],
        ];
        let table = Table::from_records(records);
        let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "extra"]);
        assert_eq!(table.columns[0].column_type, ColumnType::Float);
        assert_eq!(table.rows[0].values, vec![Value::Float(1.0), "a".into(), Value::Null]);
        assert_eq!(table.rows[1].source_row_num, 2);
    }

    #[test]
    fn test_value_sampling_stops_at_limit() {
        let headers = vec!["code".to_string()];
        let rows = vec![
            (1, vec![Value::Integer(1)]),
            (2, vec![Value::Integer(2)]),
            (3, vec![Value::from("X-3")]),
        ];
        let sampled = Table::from_value_rows(headers.clone(), rows.clone(), Some(2));
        assert_eq!(sampled.columns[0].column_type, ColumnType::Integer);
        assert_eq!(sampled.rows[2].values[0], Value::from("X-3"));

        let full = Table::from_value_rows(headers, rows, None);
        assert_eq!(full.columns[0].column_type, ColumnType::Text);
        assert_eq!(full.rows[0].values[0], Value::from("1"));
    }
}
