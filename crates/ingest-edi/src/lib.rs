//! # ingest-edi
//!
//! X12 and EDIFACT parsing into normalized orders.
//!
//! Both standards are read segment by segment. A small accumulator folds
//! header and line-item segments into a [`NormalizedOrder`] and emits it when
//! the transaction trailer is reached, so one interchange can yield several
//! orders.

pub mod accumulator;
pub mod edifact;
pub mod model;
pub mod segment;
pub mod syntax;
pub mod x12;

pub use accumulator::OrderAccumulator;
pub use model::{EdiStandard, Envelope, LineItem, NormalizedOrder, OrderHeader, TransactionKind};
pub use segment::Segment;

use ingest_ir::ErrorKind;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when parsing EDI documents
#[derive(Error, Debug)]
pub enum Error {
    #[error("Parse error at line {line}, col {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Unsupported {standard} transaction type '{found}' (supported: {supported})")]
    UnsupportedTransaction {
        standard: EdiStandard,
        found: String,
        supported: String,
    },

    #[error("Envelope error: {0}")]
    Envelope(String),

    #[error("Unrecognized EDI document: expected ISA, UNA or UNB but found '{0}'")]
    UnknownFormat(String),
}

impl Error {
    pub fn unsupported(standard: EdiStandard, found: impl Into<String>) -> Self {
        Self::UnsupportedTransaction {
            standard,
            found: found.into(),
            supported: TransactionKind::supported_codes(standard).join(", "),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::FormatInvalid
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Orders extracted from one EDI document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub standard: EdiStandard,
    pub orders: Vec<NormalizedOrder>,
}

/// Identify the standard from the opening envelope tag.
pub fn detect_standard(data: &[u8]) -> Option<EdiStandard> {
    let trimmed = trim_leading(data);
    if trimmed.starts_with(b"ISA") {
        Some(EdiStandard::X12)
    } else if trimmed.starts_with(b"UNA") || trimmed.starts_with(b"UNB") {
        Some(EdiStandard::Edifact)
    } else {
        None
    }
}

/// Parse a whole document into normalized orders.
pub fn parse_document(data: &[u8]) -> Result<ParsedDocument> {
    let standard = detect_standard(data).ok_or_else(|| {
        let head: String = String::from_utf8_lossy(trim_leading(data))
            .chars()
            .take(3)
            .collect();
        Error::UnknownFormat(head)
    })?;

    let body = trim_leading(data);
    let orders = match standard {
        EdiStandard::X12 => x12::parse(&String::from_utf8_lossy(body))?,
        EdiStandard::Edifact => edifact::parse(body)?,
    };
    debug!(standard = %standard, orders = orders.len(), "Parsed EDI document");

    Ok(ParsedDocument { standard, orders })
}

fn trim_leading(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    &data[start..]
}
