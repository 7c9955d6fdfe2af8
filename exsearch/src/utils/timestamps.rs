//! Timestamp helpers shared by the stores and the wait protocol.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// UTC timestamp used on every persisted record.
pub type Timestamp = DateTime<Utc>;

/// Errors that can occur during timestamp parsing.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// The timestamp string is empty.
    #[error("Empty timestamp string")]
    EmptyString,

    /// The timestamp value is invalid.
    #[error("Invalid timestamp: {0}")]
    InvalidFormat(String),
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as RFC 3339 with microsecond precision.
///
/// This is the shape stored in key-value backends, e.g.
/// `2025-06-01T12:00:00.000000+00:00`.
#[must_use]
pub fn to_iso(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC time as an ISO 8601 string.
#[must_use]
pub fn iso_timestamp() -> String {
    to_iso(&now_utc())
}

/// Parses an ISO 8601 / RFC 3339 timestamp.
///
/// Naive timestamps (no offset) are taken to be UTC.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, TimestampError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::EmptyString);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    for fmt in formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(naive.and_utc());
        }
    }

    Err(TimestampError::InvalidFormat(trimmed.to_string()))
}

/// Returns how long ago `ts` was, clamped at zero for clock skew.
#[must_use]
pub fn age_of(ts: &Timestamp, now: &Timestamp) -> Duration {
    (*now - *ts).to_std().unwrap_or(Duration::ZERO)
}

/// Converts float seconds to a duration. NaN and negative values give zero,
/// values too large for a `Duration` give `Duration::MAX`.
#[must_use]
pub fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// Adds a std duration to a timestamp, saturating on overflow.
#[must_use]
pub fn add_duration(ts: &Timestamp, duration: Duration) -> Timestamp {
    ChronoDuration::from_std(duration)
        .ok()
        .and_then(|d| ts.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_roundtrip_keeps_microseconds() {
        let now = now_utc();
        let parsed = parse_timestamp(&to_iso(&now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_parse_accepts_z_suffix_and_naive() {
        let z = parse_timestamp("2025-06-01T12:00:00Z").unwrap();
        let naive = parse_timestamp("2025-06-01 12:00:00").unwrap();
        assert_eq!(z, naive);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_timestamp("  "), Err(TimestampError::EmptyString)));
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(TimestampError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_age_is_clamped() {
        let now = now_utc();
        let future = add_duration(&now, Duration::from_secs(5));
        assert_eq!(age_of(&future, &now), Duration::ZERO);
        assert_eq!(age_of(&now, &future), Duration::from_secs(5));
    }

    #[test]
    fn test_seconds_to_duration_saturates() {
        assert_eq!(seconds_to_duration(1.5), Duration::from_millis(1500));
        assert_eq!(seconds_to_duration(-3.0), Duration::ZERO);
        assert_eq!(seconds_to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(seconds_to_duration(1e20), Duration::MAX);
        assert_eq!(seconds_to_duration(f64::INFINITY), Duration::MAX);
    }
}
