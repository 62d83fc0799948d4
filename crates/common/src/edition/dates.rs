//! Submitted dates and query windows
//!
//! Edition dates are stored in UTC with whole-second precision. Day and
//! month queries resolve to half-open `[start, end)` windows.

use crate::errors::{AppError, Result};
use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use regex_lite::Regex;
use std::sync::OnceLock;

/// Half-open UTC interval
pub type DateWindow = (DateTime<Utc>, DateTime<Utc>);

fn day_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid day pattern"))
}

fn month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{2}$").expect("valid month pattern"))
}

/// Parse a date submitted with an edition.
///
/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM[:SS]` (read as UTC)
/// and plain `YYYY-MM-DD` (UTC midnight).
pub fn parse_submitted_date(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    let invalid = || AppError::InvalidDate {
        value: value.to_string(),
    };

    let parsed = if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        dt.with_timezone(&Utc)
    } else if let Some(naive) = parse_naive_datetime(trimmed) {
        Utc.from_utc_datetime(&naive)
    } else if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?)
    } else {
        return Err(invalid());
    };

    Ok(truncate_to_second(parsed))
}

fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// Drop sub-second precision.
pub fn truncate_to_second(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

/// Window for a `YYYY-MM-DD` day query.
pub fn day_window(value: &str) -> Result<DateWindow> {
    let invalid = || AppError::InvalidDate {
        value: value.to_string(),
    };

    if !day_pattern().is_match(value) {
        return Err(invalid());
    }

    let day = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())?;
    let next = day.succ_opt().ok_or_else(invalid)?;

    Ok((midnight(day), midnight(next)))
}

/// Window for a `YYYY-MM` month query.
pub fn month_window(value: &str) -> Result<DateWindow> {
    let invalid = || AppError::InvalidDate {
        value: value.to_string(),
    };

    if !month_pattern().is_match(value) {
        return Err(invalid());
    }

    let first = NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").map_err(|_| invalid())?;
    let next = first
        .checked_add_months(Months::new(1))
        .ok_or_else(invalid)?;

    Ok((midnight(first), midnight(next)))
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_parse_rfc3339_normalizes_to_utc() {
        let dt = parse_submitted_date("2024-02-10T09:30:15.750+02:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-02-10T07:30:15+00:00");
    }

    #[test]
    fn test_parse_plain_day_is_midnight() {
        let dt = parse_submitted_date("2024-02-10").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_datetime() {
        let dt = parse_submitted_date("2024-02-10T18:05").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 2, 10, 18, 5, 0).unwrap());
    }

    #[test]
    fn test_parse_garbage_fails() {
        for value in ["", "yesterday", "2024-13-01", "10/02/2024"] {
            let err = assert_err!(parse_submitted_date(value));
            assert!(matches!(err, AppError::InvalidDate { .. }), "{value}");
        }
    }

    #[test]
    fn test_day_window() {
        let (start, end) = day_window("2024-02-29").unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_day_window_rejects_loose_formats() {
        for value in ["2024-2-1", "2024-02-1", "20240201", "2024-02-30", "2024-02-01T00:00"] {
            assert!(day_window(value).is_err(), "{value}");
        }
    }

    #[test]
    fn test_month_window() {
        let (start, end) = month_window("2024-02").unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());

        let (_, end) = month_window("2023-12").unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_month_window_rejects_bad_months() {
        for value in ["2024-00", "2024-13", "2024-2", "2024", "2024-02-01"] {
            assert!(month_window(value).is_err(), "{value}");
        }
    }
}
