//! Segment model and tokenizers for both standards.

use crate::syntax::{SyntaxBuffer, X12Separators};
use crate::{Error, Result};

/// A parsed segment: tag plus elements, each a list of components.
///
/// Element indices exclude the tag, so `BEG*00*SA*PO1` has `PO1` at index 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub tag: String,
    pub elements: Vec<Vec<String>>,
}

impl Segment {
    pub fn new(tag: impl Into<String>, elements: Vec<Vec<String>>) -> Self {
        Self {
            tag: tag.into(),
            elements,
        }
    }

    /// First component of an element, empty when absent.
    pub fn element(&self, index: usize) -> &str {
        self.component(index, 0)
    }

    pub fn component(&self, index: usize, component: usize) -> &str {
        self.elements
            .get(index)
            .and_then(|components| components.get(component))
            .map_or("", |value| value.trim())
    }

    /// Non-empty element value.
    pub fn value(&self, index: usize) -> Option<String> {
        non_empty(self.element(index))
    }

    pub fn component_value(&self, index: usize, component: usize) -> Option<String> {
        non_empty(self.component(index, component))
    }

    /// Non-empty components of one element joined with a space.
    pub fn joined(&self, index: usize) -> Option<String> {
        let parts: Vec<&str> = self
            .elements
            .get(index)?
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect();
        non_empty(&parts.join(" "))
    }

    /// Qualifier/value pairs starting at `start`, e.g. `VP*SKU1*UP*0123`.
    pub fn qualified_pairs(&self, start: usize) -> Vec<(&str, &str)> {
        let mut pairs = Vec::new();
        let mut index = start;
        while index + 1 < self.elements.len() {
            pairs.push((self.element(index), self.element(index + 1)));
            index += 2;
        }
        pairs
    }
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Split an X12 document into segments using the ISA-declared separators.
pub fn split_x12(text: &str, separators: X12Separators) -> Vec<Segment> {
    text.split(separators.segment)
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            let mut parts = raw.split(separators.element);
            let tag = parts.next().unwrap_or_default().trim().to_string();
            let elements = parts
                .map(|element| {
                    element
                        .split(separators.component)
                        .map(str::to_string)
                        .collect()
                })
                .collect();
            Segment::new(tag, elements)
        })
        .collect()
}

/// Streaming EDIFACT segment reader
pub struct SegmentParser<'a> {
    buffer: SyntaxBuffer<'a>,
}

impl<'a> SegmentParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut buffer = SyntaxBuffer::new(data);
        buffer.read_una();
        Self { buffer }
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> Error {
        let (line, column) = self.buffer.line_column(offset);
        Error::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    /// Parse the next segment
    pub fn next_segment(&mut self) -> Option<Result<Segment>> {
        self.buffer.skip_whitespace();
        if self.buffer.is_empty() {
            return None;
        }

        let start = self.buffer.position();
        let Some(tag) = self.buffer.read_tag() else {
            return Some(Err(self.error_at(start, "Expected segment tag (3 characters)")));
        };

        let separators = self.buffer.separators();
        let mut elements = Vec::new();
        match self.buffer.peek() {
            None => return Some(Ok(Segment::new(tag, elements))),
            Some(byte) if byte == separators.segment => {
                self.buffer.advance();
                return Some(Ok(Segment::new(tag, elements)));
            }
            Some(byte) if byte == separators.element => self.buffer.advance(),
            Some(_) => {
                return Some(Err(self.error_at(
                    self.buffer.position(),
                    "Expected element separator or segment terminator after segment tag",
                )));
            }
        }

        let mut components = Vec::new();
        loop {
            let (value, delimiter) = self.buffer.read_until_delimiter();
            components.push(String::from_utf8_lossy(&value).into_owned());
            match delimiter {
                Some(d) if d == separators.component => {}
                Some(d) if d == separators.element => {
                    elements.push(std::mem::take(&mut components));
                }
                _ => {
                    elements.push(components);
                    break;
                }
            }
        }

        Some(Ok(Segment::new(tag, elements)))
    }
}

impl Iterator for SegmentParser<'_> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_segment()
    }
}
