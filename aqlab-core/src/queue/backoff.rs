//! Job retry backoff (spec.md §4.4): `min(2^attempts * 1 minute, 1 hour)`.

use chrono::Duration;

const ONE_HOUR_SECS: i64 = 3600;

pub fn backoff_for_attempt(attempts: i64) -> Duration {
    let minutes = 2i64.saturating_pow(attempts.max(0) as u32);
    let secs = minutes.saturating_mul(60).min(ONE_HOUR_SECS);
    Duration::seconds(secs)
}

/// Decode retry shim backoff (spec.md §4.6): doubling from 1s, capped at 16s.
pub fn decode_retry_backoff(attempt: u32) -> std::time::Duration {
    let secs = (1u64 << attempt.min(4)).min(16);
    std::time::Duration::from_secs(secs)
}
