//! Plist epoch conversions.
//!
//! Both wire formats measure time from 2001-01-01T00:00:00Z, not the Unix
//! epoch, and both carry whole seconds only. Every date conversion in the
//! crate routes through this module.

use chrono::{DateTime, Utc};

/// Seconds between the Unix epoch and the plist epoch (2001-01-01T00:00:00Z).
pub const PLIST_EPOCH_UNIX: i64 = 978_307_200;

/// Whole seconds from the plist epoch to `date`. Sub-second precision is
/// truncated.
pub fn to_epoch_seconds(date: &DateTime<Utc>) -> i64 {
    date.timestamp() - PLIST_EPOCH_UNIX
}

/// Instant for a second offset from the plist epoch, truncated to whole
/// seconds. `None` when the offset is not a representable instant.
pub fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let unix = (seconds.trunc() as i64).checked_add(PLIST_EPOCH_UNIX)?;
    DateTime::from_timestamp(unix, 0)
}

/// Fraction-free UTC timestamp used by the XML `<date>` element.
pub fn format_xml(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parses an XML `<date>` payload. Offsets are accepted and normalized to
/// UTC; the result is truncated to whole seconds.
pub fn parse_xml(text: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(text).ok()?;
    DateTime::from_timestamp(parsed.timestamp(), 0)
}
