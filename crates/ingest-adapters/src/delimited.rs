//! Delimited text (CSV, TSV, pipe- and semicolon-separated).
//!
//! The whole file is scanned for typing. Identity numbers are record positions
//! counted before all-empty rows are dropped, so they match the original file.

use async_trait::async_trait;
use ingest_ir::{ImportResult, SourceType, normalize_headers, synthesize_headers};
use ingest_store::TabularStore;
use serde::Serialize;
use tracing::debug;

use crate::adapter::SourceAdapter;
use crate::request::{FormatOptions, ImportRequest};
use crate::tabulate::Table;
use crate::{Error, Result};

/// Delimiters tried by detection, in preference order.
pub const CANDIDATES: [u8; 4] = [b',', b'\t', b'|', b';'];

const DETECTION_LINES: usize = 20;

/// The concrete reading settings for one delimited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub has_header: bool,
}

impl Dialect {
    /// Caller settings first, then the extension, then detection over `text`.
    pub fn resolve(options: &FormatOptions, extension: Option<&str>, text: &str) -> Result<Self> {
        let delimiter = match options.delimiter {
            Some(delimiter) => ascii_byte(delimiter, "delimiter")?,
            None => match extension {
                Some("tsv") => b'\t',
                Some("psv") => b'|',
                _ => detect_delimiter(text),
            },
        };
        let quote = options.quote.map_or(Ok(b'"'), |quote| ascii_byte(quote, "quote"))?;
        Ok(Self {
            delimiter,
            quote,
            has_header: options.has_header,
        })
    }

    pub fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote);
        builder
    }

    pub fn writer_builder(&self) -> csv::WriterBuilder {
        let mut builder = csv::WriterBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote);
        builder
    }
}

fn ascii_byte(c: char, what: &str) -> Result<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| Error::rejected(format!("{what} must be a single ASCII character, got '{c}'")))
}

/// Pick the candidate with a consistent non-zero count on the first non-empty lines.
///
/// Higher counts win; ties keep candidate order. Falls back to `,`.
pub fn detect_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(DETECTION_LINES)
        .collect();
    if lines.is_empty() {
        return b',';
    }

    let mut best: Option<(u8, usize)> = None;
    for candidate in CANDIDATES {
        let mut counts = lines.iter().map(|line| count_unquoted(line, candidate));
        let Some(first) = counts.next() else {
            continue;
        };
        if first == 0 || counts.any(|count| count != first) {
            continue;
        }
        if best.is_none_or(|(_, count)| first > count) {
            best = Some((candidate, first));
        }
    }
    best.map_or(b',', |(delimiter, _)| delimiter)
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

/// UTF-8 text without a byte-order mark; invalid sequences are replaced.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

type Grid = (Vec<String>, Vec<(u64, Vec<Option<String>>)>);

/// Headers plus numbered rows, padded or truncated to the header width.
pub(crate) fn read_grid(text: &str, dialect: Dialect) -> Result<Grid> {
    let mut reader = dialect.reader_builder().from_reader(text.as_bytes());
    let mut records = reader.records();

    let header: Option<Vec<String>> = if dialect.has_header {
        match records.next() {
            Some(record) => Some(record?.iter().map(str::to_string).collect()),
            None => return Err(Error::format(SourceType::Delimited, "file is empty")),
        }
    } else {
        None
    };

    let mut raw_rows = Vec::new();
    for (record, row_num) in records.zip(1u64..) {
        let record = record?;
        raw_rows.push((row_num, record.iter().map(str::to_string).collect::<Vec<_>>()));
    }

    let headers = match header {
        Some(names) => normalize_headers(&names),
        None => {
            let width = raw_rows.iter().map(|(_, cells)| cells.len()).max().unwrap_or(0);
            if width == 0 {
                return Err(Error::format(SourceType::Delimited, "file is empty"));
            }
            synthesize_headers(width)
        }
    };

    let width = headers.len();
    let rows = raw_rows
        .into_iter()
        .filter(|(_, cells)| cells.iter().any(|cell| !cell.trim().is_empty()))
        .map(|(row_num, mut cells)| {
            cells.resize(width, String::new());
            let cells = cells
                .into_iter()
                .map(|cell| (!cell.trim().is_empty()).then_some(cell))
                .collect();
            (row_num, cells)
        })
        .collect();

    Ok((headers, rows))
}

/// Delimited text adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedAdapter;

#[async_trait]
impl SourceAdapter for DelimitedAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Delimited
    }

    async fn import(&self, store: &TabularStore, request: &ImportRequest) -> Result<ImportResult> {
        let bytes = request.read_bytes(None).await?;
        let text = decode_text(&bytes);
        let dialect = Dialect::resolve(&request.options, request.extension().as_deref(), &text)?;
        debug!(
            delimiter = %char::from(dialect.delimiter).escape_default(),
            has_header = dialect.has_header,
            "Reading delimited text"
        );

        let (headers, rows) = read_grid(&text, dialect)?;
        let mut table = Table::from_text_rows(headers, rows);
        if table.columns.len() == 1 {
            table = table.with_warning(
                "Only one column detected; the delimiter may be wrong or the file may be fixed-width",
            );
        }
        table.load(store, SourceType::Delimited).await
    }
}
