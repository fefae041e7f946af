//! Value <-> libsql storage conversion.
//!
//! Booleans are stored as 0/1 and dates/timestamps as ISO-8601 text; the
//! logical column type decides how a stored value is read back.

use chrono::{NaiveDate, NaiveTime};
use ingest_ir::{ColumnType, DATE_FORMAT, Value, parse_timestamp_text};

pub(crate) fn to_libsql(value: &Value) -> libsql::Value {
    match value {
        Value::Null => libsql::Value::Null,
        Value::Text(text) => libsql::Value::Text(text.clone()),
        Value::Integer(i) => libsql::Value::Integer(*i),
        Value::Float(f) => libsql::Value::Real(*f),
        Value::Boolean(b) => libsql::Value::Integer(i64::from(*b)),
        Value::Date(_) | Value::Timestamp(_) => {
            value.to_text().map_or(libsql::Value::Null, libsql::Value::Text)
        }
    }
}

/// Declared column type in the store table.
pub(crate) fn storage_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer | ColumnType::Boolean => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::Text | ColumnType::Date | ColumnType::Timestamp => "TEXT",
    }
}

/// A libsql value as-is, with blobs rendered as hex text.
pub fn native_value(value: libsql::Value) -> Value {
    match value {
        libsql::Value::Null => Value::Null,
        libsql::Value::Integer(i) => Value::Integer(i),
        libsql::Value::Real(f) => Value::Float(f),
        libsql::Value::Text(text) => Value::Text(text),
        libsql::Value::Blob(bytes) => Value::Text(hex::encode(bytes)),
    }
}

/// Decode a stored value as `column_type`, keeping the native value when it does not fit.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub(crate) fn from_libsql(value: libsql::Value, column_type: ColumnType) -> Value {
    match (value, column_type) {
        (libsql::Value::Null, _) => Value::Null,
        (libsql::Value::Integer(i), ColumnType::Boolean) => Value::Boolean(i != 0),
        (libsql::Value::Integer(i), ColumnType::Float) => Value::Float(i as f64),
        (libsql::Value::Integer(i), ColumnType::Text) => Value::Text(i.to_string()),
        (libsql::Value::Real(f), ColumnType::Integer) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
            Value::Integer(f as i64)
        }
        (libsql::Value::Real(f), ColumnType::Text) => Value::Text(f.to_string()),
        (libsql::Value::Text(text), ColumnType::Date) => decode_date(&text)
            .map(Value::Date)
            .unwrap_or(Value::Text(text)),
        (libsql::Value::Text(text), ColumnType::Timestamp) => parse_timestamp_text(&text)
            .or_else(|| decode_date(&text).map(|d| d.and_time(NaiveTime::MIN)))
            .map_or(Value::Text(text), Value::Timestamp),
        (libsql::Value::Text(text), ColumnType::Boolean) => match text.to_ascii_lowercase().as_str() {
            "1" | "true" => Value::Boolean(true),
            "0" | "false" => Value::Boolean(false),
            _ => Value::Text(text),
        },
        (other, _) => native_value(other),
    }
}

fn decode_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .or_else(|| parse_timestamp_text(text).map(|ts| ts.date()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_storage_encoding() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let ts = date.and_hms_opt(10, 30, 0).unwrap();
        let cases = [
            (Value::Boolean(true), ColumnType::Boolean),
            (Value::Date(date), ColumnType::Date),
            (Value::Timestamp(ts), ColumnType::Timestamp),
            (Value::Float(2.5), ColumnType::Float),
            (Value::from("07302"), ColumnType::Text),
        ];
        for (value, column_type) in cases {
            assert_eq!(from_libsql(to_libsql(&value), column_type), value);
        }
    }

    #[test]
    fn test_decode_tolerates_storage_affinity() {
        // REAL affinity stores 3.0 as an integer
        assert_eq!(from_libsql(libsql::Value::Integer(3), ColumnType::Float), Value::Float(3.0));
        assert_eq!(
            from_libsql(libsql::Value::Text("2024-01-02 03:04:05".into()), ColumnType::Timestamp),
            Value::Timestamp(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap()
            )
        );
        assert_eq!(
            from_libsql(libsql::Value::Text("n/a".into()), ColumnType::Date),
            Value::from("n/a")
        );
        assert_eq!(native_value(libsql::Value::Blob(vec![0xde, 0xad])), Value::from("dead"));
    }
}
