//! Date and timestamp parsing for text cells.
//!
//! Slash, dash and dot separated dates are read month-first unless the first
//! part cannot be a month. When both readings are valid calendar dates the
//! result is reported as ambiguous so callers can warn with both options.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})$").expect("valid ISO date regex")
});

static PART_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})([/.-])(\d{1,2})([/.-])(\d{4}|\d{2})$").expect("valid date regex")
});

const TIMESTAMP_LAYOUTS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Largest serial Excel can represent (9999-12-31).
const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;

/// Outcome of reading a date from text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateReading {
    Unambiguous(NaiveDate),
    /// Only the day-first reading is a calendar date.
    DayFirst(NaiveDate),
    Ambiguous {
        month_first: NaiveDate,
        day_first: NaiveDate,
    },
}

impl DateReading {
    /// The value that gets stored; ambiguous dates resolve month-first.
    pub fn stored(self) -> NaiveDate {
        match self {
            Self::Unambiguous(date) | Self::DayFirst(date) => date,
            Self::Ambiguous { month_first, .. } => month_first,
        }
    }

    pub fn is_ambiguous(self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

/// Parse a date written as ISO `YYYY-MM-DD` or as `A/B/YYYY` style text.
pub fn parse_date_text(text: &str) -> Option<DateReading> {
    let text = text.trim();

    if let Some(caps) = ISO_DATE.captures(text) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day).map(DateReading::Unambiguous);
    }

    let caps = PART_DATE.captures(text)?;
    if caps[2] != caps[4] {
        return None;
    }
    let first: u32 = caps[1].parse().ok()?;
    let second: u32 = caps[3].parse().ok()?;
    let year = expand_year(&caps[5])?;

    if first > 12 {
        return NaiveDate::from_ymd_opt(year, second, first).map(DateReading::DayFirst);
    }
    if second > 12 || first == second {
        return NaiveDate::from_ymd_opt(year, first, second).map(DateReading::Unambiguous);
    }

    let month_first = NaiveDate::from_ymd_opt(year, first, second)?;
    let day_first = NaiveDate::from_ymd_opt(year, second, first)?;
    Some(DateReading::Ambiguous {
        month_first,
        day_first,
    })
}

/// Parse an ISO-8601 timestamp. Offsets are normalised to UTC.
pub fn parse_timestamp_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.len() < 16 {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    TIMESTAMP_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
}

/// Convert an Excel serial day number (epoch 1899-12-30) into a timestamp.
#[allow(clippy::cast_possible_truncation)]
pub fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 1.0 || serial > EXCEL_MAX_SERIAL {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

fn expand_year(text: &str) -> Option<i32> {
    let year: i32 = text.parse().ok()?;
    if text.len() == 4 {
        return Some(year);
    }
    Some(if year < 69 { 2000 + year } else { 1900 + year })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_iso_dates_are_unambiguous() {
        assert_eq!(
            parse_date_text("2024-03-05"),
            Some(DateReading::Unambiguous(date(2024, 3, 5)))
        );
        assert_eq!(parse_date_text("2024-13-05"), None);
    }

    #[test]
    fn test_ambiguous_reading_keeps_both() {
        let reading = parse_date_text("01/02/2024").unwrap();
        assert!(reading.is_ambiguous());
        assert_eq!(
            reading,
            DateReading::Ambiguous {
                month_first: date(2024, 1, 2),
                day_first: date(2024, 2, 1),
            }
        );
        assert_eq!(reading.stored(), date(2024, 1, 2));
    }

    #[test]
    fn test_day_first_when_first_part_exceeds_twelve() {
        assert_eq!(
            parse_date_text("25/12/2024"),
            Some(DateReading::DayFirst(date(2024, 12, 25)))
        );
        assert_eq!(
            parse_date_text("12/25/2024"),
            Some(DateReading::Unambiguous(date(2024, 12, 25)))
        );
    }

    #[test]
    fn test_equal_parts_and_two_digit_years() {
        assert_eq!(
            parse_date_text("3.3.99"),
            Some(DateReading::Unambiguous(date(1999, 3, 3)))
        );
        assert_eq!(
            parse_date_text("07-04-24").map(DateReading::stored),
            Some(date(2024, 7, 4))
        );
        assert_eq!(parse_date_text("07-04/24"), None);
    }

    #[test]
    fn test_timestamps() {
        let expected = date(2024, 1, 2).and_hms_opt(3, 4, 5).unwrap();
        assert_eq!(parse_timestamp_text("2024-01-02T03:04:05"), Some(expected));
        assert_eq!(parse_timestamp_text("2024-01-02 03:04:05"), Some(expected));
        assert_eq!(parse_timestamp_text("2024-01-02T05:04:05+02:00"), Some(expected));
        assert_eq!(parse_timestamp_text("2024-01-02"), None);
    }

    #[test]
    fn test_excel_serial_epoch() {
        let converted = from_excel_serial(45_292.0).unwrap();
        assert_eq!(converted.date(), date(2024, 1, 1));
        assert_eq!(from_excel_serial(0.0), None);
    }
}
