//! Companion results file.
//!
//! Sources that cannot be rewritten in place get a `<stem>_results.csv` file
//! next to them, one line per write-back.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::atomic::replace_file_with;
use crate::Result;

pub const SOURCE_ROW_COLUMN: &str = "source_row_num";
pub const REFERENCE_COLUMN: &str = "reference_id";

/// `<dir>/<stem>_results.csv` for `source`.
pub fn companion_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map_or_else(|| "import".to_string(), |stem| stem.to_string_lossy().into_owned());
    source.with_file_name(format!("{stem}_results.csv"))
}

fn read_existing(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    if !path.is_file() {
        return Ok((Vec::new(), Vec::new()));
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let header = reader.headers()?.iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|record| record.map(|record| record.iter().map(str::to_string).collect()))
        .collect::<std::result::Result<Vec<Vec<String>>, csv::Error>>()?;
    Ok((header, rows))
}

/// Append one outcome line to the companion file of `source`.
///
/// Columns seen for the first time extend the header; earlier lines are padded.
/// Returns the companion path and the columns added to it.
pub fn append_outcome(
    source: &Path,
    row_number: u64,
    reference_id: &str,
    outcome: &[(String, String)],
) -> Result<(PathBuf, Vec<String>)> {
    let path = companion_path(source);
    let (mut header, mut rows) = read_existing(&path)?;

    let mut added = Vec::new();
    let mut line: Vec<(String, String)> = vec![
        (SOURCE_ROW_COLUMN.to_string(), row_number.to_string()),
        (REFERENCE_COLUMN.to_string(), reference_id.to_string()),
    ];
    line.extend(outcome.iter().cloned());
    for (column, _) in &line {
        if !header.contains(column) {
            header.push(column.clone());
            added.push(column.clone());
        }
    }

    let mut record = vec![String::new(); header.len()];
    for (column, value) in line {
        if let Some(position) = header.iter().position(|name| *name == column) {
            record[position] = value;
        }
    }
    rows.push(record);

    replace_file_with(&path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(&header)?;
        for row in &mut rows {
            row.resize(header.len(), String::new());
            writer.write_record(row.iter())?;
        }
        writer.flush()
    })?;

    debug!(path = %path.display(), row = row_number, "Companion write-back");
    Ok((path, added))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_companion_path() {
        assert_eq!(
            companion_path(Path::new("/data/orders.xls")),
            PathBuf::from("/data/orders_results.csv")
        );
        assert_eq!(
            companion_path(Path::new("feed.json")),
            PathBuf::from("feed_results.csv")
        );
    }

    #[test]
    fn test_append_twice_unions_columns() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("orders.ods");

        let (path, added) = append_outcome(
            &source,
            2,
            "PO-7",
            &[("tracking_number".to_string(), "1Z1".to_string())],
        )
        .unwrap();
        assert_eq!(added, vec!["source_row_num", "reference_id", "tracking_number"]);

        let (_, added) = append_outcome(
            &source,
            5,
            "5",
            &[
                ("tracking_number".to_string(), "1Z2".to_string()),
                ("carrier".to_string(), "UPS".to_string()),
            ],
        )
        .unwrap();
        assert_eq!(added, vec!["carrier"]);

        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            written,
            "source_row_num,reference_id,tracking_number,carrier\n2,PO-7,1Z1,\n5,5,1Z2,UPS\n"
        );
    }
}
