//! Common types and utilities shared across models.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC instant the way every `*_at` column stores it.
///
/// Fixed precision and a `Z` suffix keep lexical order equal to time order,
/// which the window queries rely on.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse a stored timestamp back into UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Round a money amount to cents
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Timelike};

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = Utc.with_ymd_and_hms(2024, 3, 9, 9, 59, 59).unwrap();
        let later = earlier + Duration::milliseconds(1500);
        assert!(format_timestamp(earlier) < format_timestamp(later));
        assert_eq!(format_timestamp(earlier), "2024-03-09T09:59:59.000Z");
    }

    #[test]
    fn test_parse_timestamp_round_trip_hour() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 17, 5, 0).unwrap();
        let parsed = parse_timestamp(&format_timestamp(at)).unwrap();
        assert_eq!(parsed.hour(), 17);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(8.4), 8.4);
        assert_eq!(round_cents(12.3456), 12.35);
        assert_eq!(round_cents(0.0), 0.0);
    }
}
