//! Column type inference.
//!
//! Adapters feed every observed value of a column into a [`ColumnProfile`].
//! Compatible observations widen (integer to float, date to timestamp);
//! anything else makes the column text and records a warning.

use std::sync::LazyLock;

use regex::Regex;

use crate::contract::SchemaColumn;
use crate::dates::{DateReading, parse_date_text, parse_timestamp_text};
use crate::value::{ColumnType, Value};

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+$").expect("valid integer regex"));

static FLOAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+\.\d*|\.\d+|\d+)([eE][+-]?\d+)?$").expect("valid float regex")
});

/// A text cell after classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub value: Value,
    /// Present when the text was a slash, dash or dot separated date.
    pub reading: Option<DateReading>,
}

impl Classified {
    fn plain(value: Value) -> Self {
        Self {
            value,
            reading: None,
        }
    }
}

/// Classify one text cell into the narrowest value it can represent.
pub fn classify_text(raw: &str) -> Classified {
    let text = raw.trim();
    if text.is_empty() {
        return Classified::plain(Value::Null);
    }
    if text.eq_ignore_ascii_case("true") {
        return Classified::plain(Value::Boolean(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Classified::plain(Value::Boolean(false));
    }
    if FLOAT.is_match(text) {
        if has_leading_zero(text) {
            return Classified::plain(Value::Text(raw.to_string()));
        }
        if INTEGER.is_match(text) {
            if let Ok(parsed) = text.parse::<i64>() {
                return Classified::plain(Value::Integer(parsed));
            }
        }
        if let Ok(parsed) = text.parse::<f64>() {
            if parsed.is_finite() {
                return Classified::plain(Value::Float(parsed));
            }
        }
        return Classified::plain(Value::Text(raw.to_string()));
    }
    if let Some(reading) = parse_date_text(text) {
        return Classified {
            value: Value::Date(reading.stored()),
            reading: Some(reading),
        };
    }
    if let Some(timestamp) = parse_timestamp_text(text) {
        return Classified::plain(Value::Timestamp(timestamp));
    }
    Classified::plain(Value::Text(raw.to_string()))
}

/// Materialise a text cell once its column type is known.
pub fn text_to_value(raw: &str, column_type: ColumnType) -> Value {
    if raw.trim().is_empty() {
        return Value::Null;
    }
    match column_type {
        ColumnType::Text => Value::Text(raw.to_string()),
        other => classify_text(raw).value.coerce(other),
    }
}

/// Codes like `07302` keep their zeros as text.
fn has_leading_zero(text: &str) -> bool {
    let digits = text.trim_start_matches(['+', '-']);
    let whole = digits.split(['.', 'e', 'E']).next().unwrap_or_default();
    whole.len() > 1 && whole.starts_with('0')
}

/// Running type statistics for one column.
#[derive(Debug, Clone)]
pub struct ColumnProfile {
    name: String,
    seen: Vec<ColumnType>,
    has_null: bool,
    ambiguous_count: usize,
    first_ambiguous: Option<(String, DateReading)>,
    first_day_first: Option<String>,
}

impl ColumnProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seen: Vec::new(),
            has_null: false,
            ambiguous_count: 0,
            first_ambiguous: None,
            first_day_first: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn observe(&mut self, value: &Value) {
        match value.column_type() {
            None => self.has_null = true,
            Some(column_type) => {
                if !self.seen.contains(&column_type) {
                    self.seen.push(column_type);
                }
            }
        }
    }

    /// Observe a classified text cell, remembering ambiguous dates and the
    /// first date that only reads day-first.
    pub fn observe_text(&mut self, raw: &str, classified: &Classified) {
        self.observe(&classified.value);
        match classified.reading {
            Some(reading @ DateReading::Ambiguous { .. }) => {
                self.ambiguous_count += 1;
                if self.first_ambiguous.is_none() {
                    self.first_ambiguous = Some((raw.trim().to_string(), reading));
                }
            }
            Some(DateReading::DayFirst(_)) if self.first_day_first.is_none() => {
                self.first_day_first = Some(raw.trim().to_string());
            }
            _ => {}
        }
    }

    pub fn mark_null(&mut self) {
        self.has_null = true;
    }

    /// The unified column type; text when nothing was observed.
    pub fn column_type(&self) -> ColumnType {
        let mut types = self.seen.iter().copied();
        let Some(first) = types.next() else {
            return ColumnType::Text;
        };
        types
            .try_fold(first, ColumnType::unify)
            .unwrap_or(ColumnType::Text)
    }

    pub fn is_mixed(&self) -> bool {
        self.seen.len() > 1 && self.column_type() == ColumnType::Text
    }

    /// Build the schema column with its inference warnings.
    pub fn finish(&self) -> SchemaColumn {
        let column_type = self.column_type();
        let mut column = SchemaColumn::new(&self.name, column_type).with_nullable(self.has_null);

        if self.is_mixed() {
            let kinds: Vec<&str> = self.seen.iter().map(|kind| kind.as_str()).collect();
            column = column.with_warning(format!(
                "mixed types ({}) in column '{}'; stored as text",
                kinds.join(", "),
                self.name
            ));
        }

        if matches!(column_type, ColumnType::Date | ColumnType::Timestamp) {
            if let Some((raw, DateReading::Ambiguous { month_first, day_first })) =
                &self.first_ambiguous
            {
                let mut warning = format!(
                    "ambiguous date '{raw}' in column '{}': month-first {month_first}, day-first {day_first}; stored month-first ({} ambiguous value(s))",
                    self.name, self.ambiguous_count
                );
                if let Some(day_first_only) = &self.first_day_first {
                    warning.push_str(&format!(
                        "; the column also holds '{day_first_only}', which only reads day-first, so the source is likely day-first"
                    ));
                }
                column = column.with_warning(warning);
            }
        }

        column
    }
}
