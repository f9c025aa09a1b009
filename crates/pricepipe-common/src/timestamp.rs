//! Timestamp parsing
//!
//! Batch files are produced by several upstream exporters and do not agree on
//! a single timestamp layout. Everything is normalised to UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{PricepipeError, Result};

/// Layouts carrying an explicit UTC offset, tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// Layouts without an offset; interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a timestamp in any of the accepted layouts.
///
/// Accepted, in order:
/// - RFC 3339 (`2024-01-02T10:00:00Z`, `2024-01-02T10:00:00+01:00`)
/// - space separated with offset (`2024-01-02 10:00:00+01:00`)
/// - naive date-time, taken as UTC (`2024-01-02 10:00:00`)
/// - bare date, midnight UTC (`2024-01-02`)
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let value = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(value, format) {
            return Ok(ts.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
        .ok_or_else(|| PricepipeError::InvalidTimestamp(raw.to_string()))
}
