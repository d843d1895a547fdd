//! Date/time helpers
//!
//! HTTP date headers (RFC 1123), SAS timestamps, and the relative
//! durations accepted on the command line ("1h", "7d", ...).

use crate::error::{FileShareError, Result};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;

/// Format used for `st` / `se` in shared access signatures.
pub const SAS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format a timestamp as an HTTP date header value.
pub fn to_rfc1123(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP date header value.
pub fn parse_rfc1123(input: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(input.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FileShareError::serialization(format!("Invalid HTTP date '{input}': {e}")))
}

pub fn format_sas_time(dt: DateTime<Utc>) -> String {
    dt.format(SAS_TIME_FORMAT).to_string()
}

pub fn parse_sas_time(input: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FileShareError::invalid_argument(format!("Invalid SAS time '{input}': {e}")))
}

/// Parse a date string in various formats:
/// - ISO 8601 dates: "2024-12-31", "2024-12-31T23:59:59", "2024-12-31T23:59:59Z"
/// - Relative durations from now: "30d", "7d", "1h", "30min", "2w"
pub fn parse_datetime_or_duration(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(datetime) = parse_relative_duration(input) {
        return Ok(datetime);
    }

    parse_iso_datetime(input)
}

/// Parse relative durations like "30d", "7d", "1h", etc.
/// Supported units: w (weeks), d (days), h (hours), min (minutes)
pub fn parse_relative_duration(input: &str) -> Result<DateTime<Utc>> {
    let re = Regex::new(r"^(\d+)([wdh]|min)$")
        .map_err(|e| FileShareError::invalid_argument(e.to_string()))?;

    let captures = re.captures(input).ok_or_else(|| {
        FileShareError::invalid_argument(format!(
            "Invalid relative duration format: '{input}'. Expected format like '30min', '1h', '7d', '2w'"
        ))
    })?;

    let value: i64 = captures[1].parse().map_err(|_| {
        FileShareError::invalid_argument(format!("Invalid number in duration: {}", &captures[1]))
    })?;

    let now = Utc::now();
    let offset = match &captures[2] {
        "w" => Duration::weeks(value),
        "d" => Duration::days(value),
        "h" => Duration::hours(value),
        "min" => Duration::minutes(value),
        unit => {
            return Err(FileShareError::invalid_argument(format!(
                "Unknown duration unit: {unit}"
            )))
        }
    };

    Ok(now + offset)
}

/// Parse ISO 8601 date/datetime strings
pub fn parse_iso_datetime(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Date only: end of that day
    if input.len() == 10 && input.chars().nth(4) == Some('-') && input.chars().nth(7) == Some('-') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}T23:59:59Z")) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    // No offset given: assume UTC
    if input.contains('T') && !input.ends_with('Z') && !input.contains('+') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    Err(FileShareError::invalid_argument(format!(
        "Invalid date format: '{input}'. Expected ISO 8601 (YYYY-MM-DD, YYYY-MM-DDTHH:MM:SSZ) or a relative duration (30min, 1h, 7d)"
    )))
}
