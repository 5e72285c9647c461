//! Wall-clock timestamps in milliseconds since the Unix epoch.
//!
//! Manifest entries, signed URLs and their expiries all use this unit.

use time::OffsetDateTime;

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    unix_ms(OffsetDateTime::now_utc())
}

/// `at` in milliseconds since the Unix epoch, saturating at the `i64` range.
pub fn unix_ms(at: OffsetDateTime) -> i64 {
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).unwrap_or(if millis < 0 { i64::MIN } else { i64::MAX })
}
