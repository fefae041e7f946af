//! Delimited files: rewrite the header and the target record, keep every
//! other byte as it was.
//!
//! Each record's span runs from its start to the next record's start, so it
//! includes the record's own line terminator and any blank lines after it.
//! Only the content part of a span is re-serialized; the terminator tail is
//! kept, which preserves `\n` versus `\r\n` per line.

use std::path::Path;

use ingest_adapters::{Dialect, FormatOptions};
use tracing::debug;

use crate::atomic::replace_file;
use crate::{Error, Result};

const BOM: &[u8] = b"\xEF\xBB\xBF";

struct Span {
    start: usize,
    end: usize,
    fields: Vec<String>,
}

impl Span {
    /// Byte offset where the line terminator tail begins.
    fn content_end(&self, text: &str) -> usize {
        let slice = &text[self.start..self.end];
        self.start + slice.trim_end_matches(['\r', '\n']).len()
    }
}

fn read_spans(text: &str, dialect: Dialect) -> Result<Vec<Span>> {
    let mut reader = dialect.reader_builder().from_reader(text.as_bytes());
    let mut spans: Vec<Span> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let raw_start = record
            .position()
            .map_or(0, |position| usize::try_from(position.byte()).unwrap_or(text.len()));
        if let Some(previous) = spans.last_mut() {
            previous.end = raw_start;
        }
        // Skipped blank lines are reported as part of the next record.
        let rest = &text[raw_start..];
        let start = raw_start + rest.len() - rest.trim_start_matches(['\r', '\n']).len();
        spans.push(Span {
            start,
            end: text.len(),
            fields: record.iter().map(str::to_string).collect(),
        });
    }
    Ok(spans)
}

/// One record serialized without a terminator.
fn render_record(dialect: Dialect, fields: &[String]) -> Result<String> {
    let mut writer = dialect
        .writer_builder()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    let bytes = writer
        .into_inner()
        .map_err(|err| Error::conflict(format!("cannot serialize record: {}", err.error())))?;
    let mut line = String::from_utf8_lossy(&bytes).into_owned();
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(line)
}

/// Write `outcome` into data row `row_number`, adding missing header columns.
///
/// Returns the columns added to the header.
pub fn write_delimited(
    path: &Path,
    options: &FormatOptions,
    row_number: u64,
    outcome: &[(String, String)],
) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).map_err(Error::io(path))?;
    let (bom, body) = match bytes.strip_prefix(BOM) {
        Some(body) => (BOM, body),
        None => (&[][..], bytes.as_slice()),
    };
    let text = std::str::from_utf8(body)
        .map_err(|_| Error::conflict(format!("{} is not valid UTF-8", path.display())))?;

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    let dialect = Dialect::resolve(options, extension.as_deref(), text)?;
    if !dialect.has_header {
        return Err(Error::conflict(
            "write-back to a delimited file needs a header row to name the outcome columns",
        ));
    }

    let spans = read_spans(text, dialect)?;
    let Some((header, data)) = spans.split_first() else {
        return Err(Error::conflict(format!("{} has no header row", path.display())));
    };
    let target_index = usize::try_from(row_number)
        .ok()
        .filter(|n| (1..=data.len()).contains(n))
        .ok_or_else(|| {
            Error::not_found(format!("Row {row_number} (file has {} data rows)", data.len()))
        })?;
    let target = &data[target_index - 1];

    let mut header_fields = header.fields.clone();
    let mut added = Vec::new();
    for (column, _) in outcome {
        if !header_fields.iter().any(|name| name.trim() == column) {
            header_fields.push(column.clone());
            added.push(column.clone());
        }
    }

    let mut row_fields = target.fields.clone();
    row_fields.resize(header_fields.len().max(row_fields.len()), String::new());
    for (column, value) in outcome {
        if let Some(position) = header_fields.iter().position(|name| name.trim() == column) {
            row_fields[position] = value.clone();
        }
    }

    let mut rewritten = String::with_capacity(text.len() + 64);
    let mut cursor = 0;
    let mut replace = |span: &Span, fields: &[String], out: &mut String| -> Result<()> {
        let content_end = span.content_end(text);
        out.push_str(&text[cursor..span.start]);
        out.push_str(&render_record(dialect, fields)?);
        cursor = content_end;
        Ok(())
    };
    if !added.is_empty() {
        replace(header, &header_fields, &mut rewritten)?;
    }
    replace(target, &row_fields, &mut rewritten)?;
    rewritten.push_str(&text[cursor..]);

    let mut contents = Vec::with_capacity(bom.len() + rewritten.len());
    contents.extend_from_slice(bom);
    contents.extend_from_slice(rewritten.as_bytes());
    replace_file(path, &contents)?;

    debug!(path = %path.display(), row = row_number, added = added.len(), "Delimited write-back");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome() -> Vec<(String, String)> {
        vec![
            ("tracking_number".to_string(), "1Z999".to_string()),
            ("shipped_at".to_string(), "2024-06-01T08:30:00Z".to_string()),
        ]
    }

    fn write(contents: &str, name: &str, row: u64) -> (tempfile::TempDir, Result<Vec<String>>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        let result = write_delimited(&path, &FormatOptions::new(), row, &outcome());
        (dir, result)
    }

    #[test]
    fn test_only_header_and_target_change() {
        let original = "name,city\r\nJohn,Dallas\r\n\"Doe, J\",Austin\nJane,Houston\r\n";
        let (dir, result) = write(original, "orders.csv", 2);
        assert_eq!(result.unwrap(), vec!["tracking_number", "shipped_at"]);

        let written = std::fs::read_to_string(dir.path().join("orders.csv")).unwrap();
        assert_eq!(
            written,
            "name,city,tracking_number,shipped_at\r\nJohn,Dallas\r\n\"Doe, J\",Austin,1Z999,2024-06-01T08:30:00Z\nJane,Houston\r\n"
        );
    }

    #[test]
    fn test_existing_columns_are_reused_and_short_rows_padded() {
        let original = "id,tracking_number,note,shipped_at\n1\n2,,x,\n";
        let (dir, result) = write(original, "orders.csv", 1);
        assert!(result.unwrap().is_empty());
        let written = std::fs::read_to_string(dir.path().join("orders.csv")).unwrap();
        assert_eq!(
            written,
            "id,tracking_number,note,shipped_at\n1,1Z999,,2024-06-01T08:30:00Z\n2,,x,\n"
        );
    }

    #[test]
    fn test_tab_file_and_missing_final_newline() {
        let (dir, result) = write("a\tb\n1\t2", "orders.tsv", 1);
        result.unwrap();
        let written = std::fs::read_to_string(dir.path().join("orders.tsv")).unwrap();
        assert_eq!(
            written,
            "a\tb\ttracking_number\tshipped_at\n1\t2\t1Z999\t2024-06-01T08:30:00Z"
        );
    }

    #[test]
    fn test_out_of_range_row_writes_nothing() {
        let original = "a,b\n1,2\n";
        let (dir, result) = write(original, "orders.csv", 5);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ingest_ir::ErrorKind::NotFound);
        assert_eq!(std::fs::read_to_string(dir.path().join("orders.csv")).unwrap(), original);
    }

    #[test]
    fn test_bom_is_kept() {
        let (dir, result) = write("\u{feff}a,b\n1,2\n", "bom.csv", 1);
        result.unwrap();
        let written = std::fs::read(dir.path().join("bom.csv")).unwrap();
        assert!(written.starts_with(BOM));
    }
}
