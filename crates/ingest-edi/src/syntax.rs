//! Delimiter handling for both EDI standards.
//!
//! EDIFACT separators come from the optional UNA service string advice and
//! values may escape delimiters with the release character. X12 separators
//! are read from fixed offsets of the 106-byte ISA header.

/// Default EDIFACT separators (when no UNA is present)
pub const DEFAULT_COMPONENT_SEPARATOR: u8 = b':';
pub const DEFAULT_ELEMENT_SEPARATOR: u8 = b'+';
pub const DEFAULT_RELEASE_CHARACTER: u8 = b'?';
pub const DEFAULT_SEGMENT_TERMINATOR: u8 = b'\'';

/// Separators used for parsing EDIFACT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separators {
    pub component: u8,
    pub element: u8,
    pub release: u8,
    pub segment: u8,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            component: DEFAULT_COMPONENT_SEPARATOR,
            element: DEFAULT_ELEMENT_SEPARATOR,
            release: DEFAULT_RELEASE_CHARACTER,
            segment: DEFAULT_SEGMENT_TERMINATOR,
        }
    }
}

impl Separators {
    /// Parse separators from a UNA segment.
    ///
    /// `UNA:+.? '` carries component, element, decimal mark, release,
    /// a reserved space, then the segment terminator.
    pub fn from_una(una: &[u8]) -> Option<Self> {
        if una.len() < 9 || &una[0..3] != b"UNA" {
            return None;
        }

        Some(Self {
            component: una[3],
            element: una[4],
            release: una[6],
            segment: una[8],
        })
    }
}

/// Separators declared by an X12 ISA header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct X12Separators {
    pub element: char,
    pub component: char,
    pub segment: char,
}

/// Length of the fixed-width ISA segment including its terminator.
pub const ISA_LENGTH: usize = 106;

impl Default for X12Separators {
    fn default() -> Self {
        Self {
            element: '*',
            component: ':',
            segment: '~',
        }
    }
}

impl X12Separators {
    /// Read separators from ISA positions 3, 104 and 105.
    ///
    /// Falls back to `*`, `:` and `~` when the header is truncated or the
    /// terminator position holds an alphanumeric byte.
    pub fn from_isa(text: &str) -> Self {
        let bytes = text.as_bytes();
        if bytes.len() < ISA_LENGTH || !bytes.starts_with(b"ISA") {
            return Self::default();
        }

        let element = bytes[3];
        let component = bytes[104];
        let segment = bytes[105];
        if element.is_ascii_alphanumeric() || segment.is_ascii_alphanumeric() {
            return Self::default();
        }

        Self {
            element: char::from(element),
            component: char::from(component),
            segment: char::from(segment),
        }
    }
}

/// A buffer for reading EDIFACT data with proper release character handling
pub struct SyntaxBuffer<'a> {
    data: &'a [u8],
    pos: usize,
    separators: Separators,
}

impl<'a> SyntaxBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            separators: Separators::default(),
        }
    }

    pub fn separators(&self) -> Separators {
        self.separators
    }

    /// Consume a leading UNA segment and adopt its separators.
    pub fn read_una(&mut self) -> Option<Separators> {
        if self.pos != 0 {
            return None;
        }
        let separators = Separators::from_una(self.data)?;
        self.separators = separators;
        self.pos = 9;
        Some(separators)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn advance(&mut self) {
        if self.pos < self.data.len() {
            self.pos += 1;
        }
    }

    /// Read until a delimiter, handling release characters.
    /// Returns the value and the delimiter that terminated it.
    pub fn read_until_delimiter(&mut self) -> (Vec<u8>, Option<u8>) {
        let mut result = Vec::new();
        let mut released = false;

        while let Some(byte) = self.peek() {
            self.pos += 1;
            if released {
                result.push(byte);
                released = false;
            } else if byte == self.separators.release {
                released = true;
            } else if byte == self.separators.component
                || byte == self.separators.element
                || byte == self.separators.segment
            {
                return (result, Some(byte));
            } else {
                result.push(byte);
            }
        }

        (result, None)
    }

    /// Read a segment tag (3 uppercase letters or digits, starting with a letter)
    pub fn read_tag(&mut self) -> Option<String> {
        let tag = self.data.get(self.pos..self.pos + 3)?;
        if tag[0].is_ascii_uppercase()
            && tag
                .iter()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            self.pos += 3;
            Some(String::from_utf8_lossy(tag).into_owned())
        } else {
            None
        }
    }

    /// Skip spaces and line breaks between segments.
    pub fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Line and column of a byte offset, for error messages.
    pub fn line_column(&self, offset: usize) -> (usize, usize) {
        let consumed = &self.data[..offset.min(self.data.len())];
        let line = consumed.iter().filter(|&&b| b == b'\n').count() + 1;
        let column = consumed
            .iter()
            .rev()
            .take_while(|&&b| b != b'\n')
            .count()
            + 1;
        (line, column)
    }
}
