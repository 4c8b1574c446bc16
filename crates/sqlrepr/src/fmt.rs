//! SQL literal formatting and decoding.
//!
//! Converts typed values to literal text embeddable in statement clauses and
//! back. Date and timestamp rendering is GMT-based with a per-data-source
//! configurable format string.

use std::fmt::Write;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::column::SqlType;
use crate::errors::{ReprError, Result};
use crate::value::SqlValue;

macro_rules! put_fmt {
    ($dst:expr, $($arg:tt)*) => {
        write!($dst, $($arg)*).map_err(ReprError::from)
    };
}

/// Default GMT timestamp format, millisecond precision.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Default date-only format.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Formats typed values as SQL literal text for one data source, and decodes
/// literal text back into typed values.
#[derive(Debug, Clone)]
pub struct StatementFormatter {
    timestamp_format: String,
    date_format: String,
}

impl Default for StatementFormatter {
    fn default() -> Self {
        StatementFormatter {
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl StatementFormatter {
    /// Create a formatter with data-source specific date formats.
    pub fn with_formats(
        timestamp_format: impl Into<String>,
        date_format: impl Into<String>,
    ) -> StatementFormatter {
        StatementFormatter {
            timestamp_format: timestamp_format.into(),
            date_format: date_format.into(),
        }
    }

    /// Write a value as a SQL literal.
    ///
    /// Strings are single-quoted with embedded quotes doubled, booleans
    /// render as `1`/`0`, nulls and NaN render as `NULL`.
    pub fn write_literal<B: Write>(&self, buf: &mut B, value: &SqlValue) -> Result<()> {
        if value.renders_null() {
            return put_fmt!(buf, "NULL");
        }
        match value {
            SqlValue::Null => unreachable!("handled by renders_null"),
            SqlValue::Boolean(b) => put_fmt!(buf, "{}", if *b { 1 } else { 0 }),
            SqlValue::Int64(v) => put_fmt!(buf, "{v}"),
            SqlValue::Float64(v) => put_fmt!(buf, "{v}"),
            SqlValue::Utf8(s) => {
                buf.write_char('\'')?;
                for c in s.chars() {
                    if c == '\'' {
                        buf.write_char('\'')?;
                    }
                    buf.write_char(c)?;
                }
                buf.write_char('\'')?;
                Ok(())
            }
            SqlValue::Timestamp(ts) => {
                put_fmt!(buf, "'{}'", ts.format(&self.timestamp_format))
            }
        }
    }

    /// Format a value as a SQL literal string.
    pub fn literal(&self, value: &SqlValue) -> Result<String> {
        let mut buf = String::new();
        self.write_literal(&mut buf, value)?;
        Ok(buf)
    }

    /// Decode literal text (as captured by the parser, quotes included for
    /// strings) back into a typed value.
    pub fn decode(&self, literal: &str, ty: SqlType) -> Result<SqlValue> {
        let literal = literal.trim();
        if literal.eq_ignore_ascii_case("null") {
            return Ok(SqlValue::Null);
        }

        let invalid = || ReprError::InvalidLiteral {
            literal: literal.to_string(),
            ty: ty.as_str(),
        };

        match ty {
            SqlType::Boolean => match unquote(literal).as_ref() {
                "1" | "t" | "true" | "TRUE" => Ok(SqlValue::Boolean(true)),
                "0" | "f" | "false" | "FALSE" => Ok(SqlValue::Boolean(false)),
                _ => Err(invalid()),
            },
            SqlType::Int16 | SqlType::Int32 | SqlType::Int64 => {
                literal.parse::<i64>().map(SqlValue::Int64).map_err(|_| invalid())
            }
            SqlType::Float32 | SqlType::Float64 => {
                literal.parse::<f64>().map(SqlValue::Float64).map_err(|_| invalid())
            }
            SqlType::Utf8 => Ok(SqlValue::Utf8(unquote(literal).into_owned())),
            SqlType::Timestamp | SqlType::Date => {
                let text = unquote(literal);
                self.decode_datetime(&text).ok_or_else(invalid)
            }
        }
    }

    fn decode_datetime(&self, text: &str) -> Option<SqlValue> {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, &self.timestamp_format) {
            return Some(SqlValue::Timestamp(Utc.from_utc_datetime(&dt)));
        }
        if let Ok(d) = NaiveDate::parse_from_str(text, &self.date_format) {
            let dt = d.and_hms_opt(0, 0, 0)?;
            return Some(SqlValue::Timestamp(Utc.from_utc_datetime(&dt)));
        }
        None
    }

    /// Format a timestamp without quotes, e.g. for logging.
    pub fn format_timestamp(&self, ts: &DateTime<Utc>) -> String {
        ts.format(&self.timestamp_format).to_string()
    }
}

/// Strip surrounding single quotes and undouble embedded quotes.
fn unquote(literal: &str) -> std::borrow::Cow<'_, str> {
    let Some(inner) = literal
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
    else {
        return std::borrow::Cow::Borrowed(literal);
    };
    if inner.contains("''") {
        std::borrow::Cow::Owned(inner.replace("''", "'"))
    } else {
        std::borrow::Cow::Borrowed(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_quoting() {
        let fmt = StatementFormatter::default();
        let lit = fmt.literal(&SqlValue::Utf8("O'Brien".to_string())).unwrap();
        assert_eq!(lit, "'O''Brien'");
        assert_eq!(
            fmt.decode(&lit, SqlType::Utf8).unwrap(),
            SqlValue::Utf8("O'Brien".to_string())
        );
    }

    #[test]
    fn booleans_render_as_bits() {
        let fmt = StatementFormatter::default();
        assert_eq!(fmt.literal(&SqlValue::Boolean(true)).unwrap(), "1");
        assert_eq!(fmt.literal(&SqlValue::Boolean(false)).unwrap(), "0");
    }

    #[test]
    fn null_and_nan() {
        let fmt = StatementFormatter::default();
        assert_eq!(fmt.literal(&SqlValue::Null).unwrap(), "NULL");
        assert_eq!(fmt.literal(&SqlValue::Float64(f64::NAN)).unwrap(), "NULL");
    }

    #[test]
    fn timestamp_round_trip() {
        let fmt = StatementFormatter::default();
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 45).unwrap()
            + chrono::Duration::milliseconds(123);
        let lit = fmt.literal(&SqlValue::Timestamp(ts)).unwrap();
        assert_eq!(lit, "'2024-03-09 12:30:45.123'");

        let decoded = fmt.decode(&lit, SqlType::Timestamp).unwrap();
        assert_eq!(decoded, SqlValue::Timestamp(ts));
    }

    #[test]
    fn date_only_decodes() {
        let fmt = StatementFormatter::default();
        let decoded = fmt.decode("'2024-03-09'", SqlType::Date).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
        assert_eq!(decoded, SqlValue::Timestamp(expected));
    }
}
