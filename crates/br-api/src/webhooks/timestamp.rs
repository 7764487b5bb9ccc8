//! Replay protection via `sentry-hook-timestamp`.

use chrono::{DateTime, Utc};

/// Default tolerance between the webhook timestamp and now.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Returns true if `header` (seconds since epoch) is within `tolerance_secs`
/// of the current time, in either direction.
pub fn is_timestamp_valid(header: &str, tolerance_secs: u64) -> bool {
    is_timestamp_valid_at(header, tolerance_secs, Utc::now())
}

/// [`is_timestamp_valid`] against an explicit clock.
pub fn is_timestamp_valid_at(header: &str, tolerance_secs: u64, now: DateTime<Utc>) -> bool {
    let Ok(seconds) = header.trim().parse::<i64>() else {
        return false;
    };
    let Some(webhook_ms) = seconds.checked_mul(1000) else {
        return false;
    };

    let skew_ms = (now.timestamp_millis() as i128 - webhook_ms as i128).unsigned_abs();
    skew_ms <= tolerance_secs as u128 * 1000
}
