//! Timestamp utilities
//!
//! All timestamps are stored as RFC 3339 UTC strings.

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC timestamp formatted for storage
pub fn now_rfc3339() -> String {
    to_rfc3339(&Utc::now())
}

/// Format a timestamp for storage (millisecond precision, `Z` suffix)
pub fn to_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
///
/// Accepts RFC 3339 and the `YYYY-MM-DD HH:MM:SS` form SQLite's
/// `CURRENT_TIMESTAMP` produces. Returns `None` for anything else.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stored_format_round_trips() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let stored = to_rfc3339(&ts);
        assert_eq!(stored, "2026-03-14T09:26:53.000Z");
        assert_eq!(parse_timestamp(&stored), Some(ts));
    }

    #[test]
    fn test_parse_sqlite_current_timestamp() {
        let parsed = parse_timestamp("2026-01-02 03:04:05").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn test_parse_offset_is_normalized_to_utc() {
        let parsed = parse_timestamp("2026-01-02T05:04:05+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_millis_to_duration() {
        assert_eq!(millis_to_duration(1500), std::time::Duration::from_millis(1500));
    }
}
