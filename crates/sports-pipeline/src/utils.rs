//! Utility functions shared across the pipeline.
//!
//! This module contains the low-level field helpers used by the tolerant
//! reader: missing-value markers, typed field parsing and delimited record
//! splitting.

use chrono::{NaiveDate, NaiveDateTime};

// =============================================================================
// Missing Value Markers
// =============================================================================

/// Field values read as "missing" rather than as data (compared lowercase).
pub const MISSING_MARKERS: &[&str] = &[
    "", "na", "n/a", "#n/a", "#na", "<na>", "nan", "-nan", "null", "none",
];

/// Check if a raw field is a missing-value marker.
///
/// # Example
///
/// ```rust,ignore
/// use sports_pipeline::utils::is_missing_marker;
///
/// assert!(is_missing_marker("N/A"));
/// assert!(is_missing_marker("  "));
/// assert!(!is_missing_marker("42"));
/// ```
pub fn is_missing_marker(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    MISSING_MARKERS.iter().any(|&marker| lower == marker)
}

// =============================================================================
// Typed Field Parsing
// =============================================================================

/// Parse a finite floating point value. Infinite values are rejected.
pub fn parse_numeric(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an integer identifier. Accepts an integral float such as `"17.0"`.
pub fn parse_identifier(s: &str) -> Option<i64> {
    let trimmed = s.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v);
    }
    parse_numeric(trimmed)
        .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
        .map(|v| v as i64)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse a date and normalize it to ISO-8601 (`YYYY-MM-DD`).
pub fn parse_date(s: &str) -> Option<String> {
    let trimmed = s.trim();
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.date().format("%Y-%m-%d").to_string());
        }
    }
    None
}

// =============================================================================
// Record Splitting
// =============================================================================

/// Result of scanning one (possibly multi-line) record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordScan {
    /// Every quoted field was closed.
    Complete(Vec<String>),
    /// The text ends inside a quoted field; the next physical line may
    /// continue it.
    OpenQuote,
    /// Stray characters follow a closing quote.
    Malformed,
}

/// Scan one delimited record into fields.
///
/// Fields may be wrapped in double quotes; a doubled quote inside a quoted
/// field is an escaped quote. A quoted field may contain the delimiter and
/// line breaks.
pub fn scan_record(record: &str, delimiter: char) -> RecordScan {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = record.chars().peekable();
    let mut in_quotes = false;
    let mut after_quote = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                    after_quote = true;
                }
            } else {
                field.push(c);
            }
        } else if c == delimiter {
            fields.push(std::mem::take(&mut field));
            after_quote = false;
        } else if after_quote {
            return RecordScan::Malformed;
        } else if c == '"' && field.trim().is_empty() {
            field.clear();
            in_quotes = true;
        } else {
            field.push(c);
        }
    }

    if in_quotes {
        return RecordScan::OpenQuote;
    }
    fields.push(field);
    RecordScan::Complete(fields)
}

/// Split a complete record into fields, or `None` if its quoting is broken.
pub fn split_record(record: &str, delimiter: char) -> Option<Vec<String>> {
    match scan_record(record, delimiter) {
        RecordScan::Complete(fields) => Some(fields),
        RecordScan::OpenQuote | RecordScan::Malformed => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_markers() {
        assert!(is_missing_marker(""));
        assert!(is_missing_marker("NaN"));
        assert!(is_missing_marker(" NULL "));
        assert!(!is_missing_marker("0"));
        assert!(!is_missing_marker("Sunny"));
    }

    #[test]
    fn test_parse_numeric_rejects_non_finite() {
        assert_eq!(parse_numeric(" 12.5 "), Some(12.5));
        assert_eq!(parse_numeric("inf"), None);
        assert_eq!(parse_numeric("abc"), None);
    }

    #[test]
    fn test_parse_identifier() {
        assert_eq!(parse_identifier("17"), Some(17));
        assert_eq!(parse_identifier("17.0"), Some(17));
        assert_eq!(parse_identifier("17.5"), None);
        assert_eq!(parse_identifier("M-17"), None);
    }

    #[test]
    fn test_parse_date_normalizes() {
        assert_eq!(parse_date("2023-04-01"), Some("2023-04-01".to_string()));
        assert_eq!(parse_date("01/04/2023"), Some("2023-04-01".to_string()));
        assert_eq!(parse_date("2023-04-01 18:30:00"), Some("2023-04-01".to_string()));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_split_record_plain_and_quoted() {
        assert_eq!(
            split_record("1,a,,b", ',').unwrap(),
            vec!["1", "a", "", "b"]
        );
        assert_eq!(
            split_record("1,\"Rain, heavy\",\"say \"\"hi\"\"\"", ',').unwrap(),
            vec!["1", "Rain, heavy", "say \"hi\""]
        );
    }

    #[test]
    fn test_split_record_malformed_quotes() {
        assert!(split_record("1,\"open", ',').is_none());
        assert!(split_record("1,\"closed\"junk,2", ',').is_none());
    }

    #[test]
    fn test_scan_record_open_quote_and_line_break() {
        assert_eq!(scan_record("1,\"Man", ','), RecordScan::OpenQuote);
        assert_eq!(scan_record("1,\"closed\"junk", ','), RecordScan::Malformed);
        assert_eq!(
            scan_record("1,\"Man\nUnited\",2", ','),
            RecordScan::Complete(vec!["1".to_string(), "Man\nUnited".to_string(), "2".to_string()])
        );
    }
}
