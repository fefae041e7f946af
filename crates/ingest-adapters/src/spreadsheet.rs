//! Workbooks (`.xlsx`, `.xlsm`, `.xls`, `.ods`) read through calamine.
//!
//! Positions are absolute sheet coordinates: the header is sheet row 1 and a
//! data row's identity is its sheet row minus one, whether or not blank rows
//! were skipped before it.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use calamine::{Data, DataType, Range, Reader, open_workbook_auto};
use chrono::{NaiveDate, NaiveTime};
use ingest_ir::{
    ColumnType, DATE_FORMAT, ImportResult, SourceType, Value, from_excel_serial, normalize_headers,
    parse_timestamp_text, synthesize_headers,
};
use ingest_store::TabularStore;
use tracing::debug;

use crate::adapter::SourceAdapter;
use crate::request::ImportRequest;
use crate::tabulate::Table;
use crate::{Error, Result};

/// Sheet names in workbook order.
pub fn list_sheets(path: &Path) -> Result<Vec<String>> {
    ensure_exists(path)?;
    let workbook = open_workbook_auto(path)?;
    Ok(workbook.sheet_names())
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::not_found(format!("File '{}'", path.display())))
    }
}

/// Read one sheet's used range; the first sheet when `sheet` is `None`.
pub(crate) fn read_sheet(path: &Path, sheet: Option<&str>) -> Result<(String, Range<Data>)> {
    ensure_exists(path)?;
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names();
    let name = match sheet {
        Some(requested) => names
            .iter()
            .find(|name| name.as_str() == requested)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Sheet '{requested}'")))?,
        None => names
            .first()
            .cloned()
            .ok_or_else(|| Error::format(SourceType::Spreadsheet, "workbook has no sheets"))?,
    };
    let range = workbook.worksheet_range(&name)?;
    Ok((name, range))
}

/// Map one cell into a value.
pub fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::Integer(*i),
        Data::Float(f) => integral(*f).map_or(Value::Float(*f), Value::Integer),
        Data::Bool(b) => Value::Boolean(*b),
        Data::DateTime(excel) => cell
            .as_datetime()
            .or_else(|| from_excel_serial(excel.as_f64()))
            .map_or(Value::Float(excel.as_f64()), Value::Timestamp),
        Data::DateTimeIso(text) => parse_timestamp_text(text)
            .map(Value::Timestamp)
            .or_else(|| NaiveDate::parse_from_str(text, DATE_FORMAT).ok().map(Value::Date))
            .unwrap_or_else(|| Value::Text(text.clone())),
        Data::DurationIso(text) => Value::Text(text.clone()),
        Data::String(text) if text.trim().is_empty() => Value::Null,
        Data::String(text) => Value::Text(text.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

/// Rows holding at least one value, keyed by absolute sheet row and laid out
/// on absolute columns. Blank rows take no space, however far down the sheet's
/// used range reaches.
pub(crate) fn absolute_rows(range: &Range<Data>) -> BTreeMap<usize, Vec<Value>> {
    let mut rows = BTreeMap::new();
    let Some((start_row, start_col)) = range.start() else {
        return rows;
    };
    let width = sheet_width(range);
    for (row, col, cell) in range.used_cells() {
        let value = cell_value(cell);
        if value.is_null() {
            continue;
        }
        rows.entry(start_row as usize + row)
            .or_insert_with(|| vec![Value::Null; width])[start_col as usize + col] = value;
    }
    rows
}

fn sheet_width(range: &Range<Data>) -> usize {
    range.end().map_or(0, |(_, col)| col as usize + 1)
}

fn header_text(value: &Value) -> String {
    value.to_text().unwrap_or_default()
}

/// Timestamp columns whose values all fall on midnight become date columns.
fn demote_midnight_timestamps(table: &mut Table) {
    for (index, column) in table.columns.iter_mut().enumerate() {
        if column.column_type != ColumnType::Timestamp {
            continue;
        }
        let all_midnight = table.rows.iter().all(|row| match &row.values[index] {
            Value::Timestamp(ts) => ts.time() == NaiveTime::MIN,
            _ => true,
        });
        if !all_midnight {
            continue;
        }
        column.column_type = ColumnType::Date;
        for row in &mut table.rows {
            if let Value::Timestamp(ts) = row.values[index] {
                row.values[index] = Value::Date(ts.date());
            }
        }
    }
}

/// Spreadsheet adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadsheetAdapter;

#[async_trait]
impl SourceAdapter for SpreadsheetAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Spreadsheet
    }

    async fn import(&self, store: &TabularStore, request: &ImportRequest) -> Result<ImportResult> {
        let path = request
            .path()
            .ok_or_else(|| Error::rejected("spreadsheet import needs a file path"))?;
        let (sheet, range) = read_sheet(path, request.options.sheet.as_deref())?;
        let mut grid = absolute_rows(&range);
        debug!(sheet = %sheet, rows = grid.len(), "Reading sheet");

        let width = sheet_width(&range);
        let first_data_row = usize::from(request.options.has_header);
        let headers = if request.options.has_header {
            let header_row = grid.remove(&0).unwrap_or_else(|| vec![Value::Null; width]);
            let raw: Vec<String> = header_row.iter().map(header_text).collect();
            normalize_headers(&raw)
        } else {
            synthesize_headers(width)
        };
        let mut rows = Vec::with_capacity(grid.len());
        for (index, mut values) in grid {
            let row_num = u64::try_from(index + 1 - first_data_row).unwrap_or(u64::MAX);
            values.resize(headers.len(), Value::Null);
            rows.push((row_num, values));
        }
        let spanned = range.end().map_or(0, |(row, _)| row as usize + 1);
        let skipped = spanned.saturating_sub(first_data_row + rows.len());

        let mut table = Table::from_value_rows(headers, rows, Some(request.limits.type_sample_size));
        demote_midnight_timestamps(&mut table);
        if skipped > 0 {
            table = table.with_warning(format!("Skipped {skipped} empty rows"));
        }
        table.load(store, SourceType::Spreadsheet).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_mapping() {
        assert_eq!(cell_value(&Data::Float(3.0)), Value::Integer(3));
        assert_eq!(cell_value(&Data::Float(2.5)), Value::Float(2.5));
        assert_eq!(cell_value(&Data::Bool(true)), Value::Boolean(true));
        assert_eq!(cell_value(&Data::String("  ".into())), Value::Null);
        assert_eq!(cell_value(&Data::Empty), Value::Null);
        assert_eq!(
            cell_value(&Data::DateTimeIso("2024-02-03T04:05:06".into())),
            Value::Timestamp(NaiveDate::from_ymd_opt(2024, 2, 3).unwrap().and_hms_opt(4, 5, 6).unwrap())
        );
        assert_eq!(
            cell_value(&Data::DateTimeIso("2024-02-03".into())),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 3).unwrap())
        );
    }

    #[test]
    fn test_absolute_rows_skip_blank_rows() {
        let mut range = Range::new((2, 1), (9_999, 2));
        range.set_value((2, 1), Data::String("id".into()));
        range.set_value((3, 2), Data::String("  ".into()));
        range.set_value((9_999, 2), Data::Int(7));

        let rows = absolute_rows(&range);
        assert_eq!(rows.keys().copied().collect::<Vec<_>>(), vec![2, 9_999]);
        assert_eq!(rows[&2], vec![Value::Null, Value::from("id"), Value::Null]);
        assert_eq!(rows[&9_999], vec![Value::Null, Value::Null, Value::Integer(7)]);
        assert!(absolute_rows(&Range::<Data>::empty()).is_empty());
    }

    #[test]
    fn test_midnight_columns_become_dates() {
        let midnight = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_time(NaiveTime::MIN);
        let mut table = Table::from_value_rows(
            vec!["day".to_string()],
            vec![(1, vec![Value::Timestamp(midnight)]), (2, vec![Value::Null])],
            None,
        );
        demote_midnight_timestamps(&mut table);
        assert_eq!(table.columns[0].column_type, ColumnType::Date);
        assert_eq!(table.rows[0].values[0], Value::Date(midnight.date()));
    }
}
