//! Timestamp display helpers.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Default display format for record timestamps.
pub const DEFAULT_FORMAT: &str = "%Y/%m/%d %H:%M";

/// Format a UTC timestamp in the given timezone.
///
/// An unknown timezone falls back to UTC rather than failing, since this is
/// only ever used for display.
pub fn format_timestamp(dt: &DateTime<Utc>, timezone: &str, format: &str) -> String {
    match timezone.parse::<Tz>() {
        Ok(tz) => dt.with_timezone(&tz).format(format).to_string(),
        Err(_) => dt.format(format).to_string(),
    }
}

/// Format a UTC timestamp with [`DEFAULT_FORMAT`].
pub fn format_timestamp_default(dt: &DateTime<Utc>, timezone: &str) -> String {
    format_timestamp(dt, timezone, DEFAULT_FORMAT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp_tokyo() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(format_timestamp_default(&dt, "Asia/Tokyo"), "2024/01/15 19:30");
    }

    #[test]
    fn test_format_timestamp_utc() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(format_timestamp(&dt, "UTC", "%H:%M:%S"), "10:30:00");
    }

    #[test]
    fn test_format_timestamp_unknown_zone() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 1, 0, 5, 0).unwrap();
        assert_eq!(format_timestamp_default(&dt, "Nowhere/Land"), "2024/06/01 00:05");
    }
}
