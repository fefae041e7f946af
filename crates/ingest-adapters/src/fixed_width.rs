//! Fixed-width text sliced by caller-supplied character spans.

use async_trait::async_trait;
use ingest_ir::{ImportResult, SourceType, normalize_headers};
use ingest_store::TabularStore;
use tracing::debug;

use crate::adapter::SourceAdapter;
use crate::delimited::decode_text;
use crate::request::{ColumnSpan, ImportRequest};
use crate::tabulate::Table;
use crate::{Error, Result};

/// Characters `[start, end)` of `line`; short lines give what is there.
pub fn slice_span(line: &str, span: ColumnSpan) -> &str {
    let mut indices = line.char_indices().map(|(index, _)| index).chain([line.len()]);
    let Some(start) = indices.nth(span.start) else {
        return "";
    };
    let end = indices.nth(span.width().saturating_sub(1)).unwrap_or(line.len());
    &line[start..end]
}

fn validate_specs(specs: &[ColumnSpan]) -> Result<()> {
    if specs.is_empty() {
        return Err(Error::rejected("col_specs required"));
    }
    match specs.iter().find(|span| span.start >= span.end) {
        Some(span) => Err(Error::rejected(format!(
            "invalid column span {}..{}: start must be below end",
            span.start, span.end
        ))),
        None => Ok(()),
    }
}

fn default_names(count: usize) -> Vec<String> {
    (0..count).map(|index| format!("col_{index}")).collect()
}

/// Fixed-width adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWidthAdapter;

#[async_trait]
impl SourceAdapter for FixedWidthAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::FixedWidth
    }

    async fn import(&self, store: &TabularStore, request: &ImportRequest) -> Result<ImportResult> {
        let specs = &request.options.col_specs;
        validate_specs(specs)?;

        let bytes = request.read_bytes(None).await?;
        let text = decode_text(&bytes);
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());

        let names = if request.options.has_header {
            match lines.next() {
                Some(header) => specs
                    .iter()
                    .enumerate()
                    .map(|(index, span)| {
                        let name = slice_span(header, *span).trim();
                        if name.is_empty() {
                            format!("col_{index}")
                        } else {
                            name.to_string()
                        }
                    })
                    .collect(),
                None => default_names(specs.len()),
            }
        } else {
            match &request.options.column_names {
                Some(names) if names.len() != specs.len() => {
                    return Err(Error::rejected(format!(
                        "{} column names given for {} column spans",
                        names.len(),
                        specs.len()
                    )));
                }
                Some(names) => names.clone(),
                None => default_names(specs.len()),
            }
        };
        let headers = normalize_headers(&names);

        let rows: Vec<(u64, Vec<Option<String>>)> = lines
            .zip(1u64..)
            .map(|(line, row_num)| {
                let cells = specs
                    .iter()
                    .map(|span| {
                        let cell = slice_span(line, *span).trim();
                        (!cell.is_empty()).then(|| cell.to_string())
                    })
                    .collect();
                (row_num, cells)
            })
            .collect();
        debug!(columns = headers.len(), rows = rows.len(), "Sliced fixed-width lines");

        Table::from_text_rows(headers, rows)
            .load(store, SourceType::FixedWidth)
            .await
    }
}
