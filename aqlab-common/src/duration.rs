//! Human-readable duration parsing.
//!
//! Library scan intervals and a handful of tuning knobs are expressed as
//! short duration strings (`"15m"`, `"2h"`, `"45s"`) rather than raw
//! seconds. This module owns parsing those strings back into
//! [`std::time::Duration`].

use std::time::Duration;

/// Parse a human duration string of the form `<number><unit>` where unit is
/// one of `s` (seconds), `m` (minutes), `h` (hours), or `d` (days). A bare
/// number with no unit is interpreted as seconds.
///
/// Returns `None` on anything unparseable; callers fall back to a
/// component-specific default (the Scheduler falls back to 15 minutes).
///
/// # Examples
///
/// ```
/// use aqlab_common::duration::parse_human_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_human_duration("45s"), Some(Duration::from_secs(45)));
/// assert_eq!(parse_human_duration("15m"), Some(Duration::from_secs(900)));
/// assert_eq!(parse_human_duration("2h"), Some(Duration::from_secs(7200)));
/// assert_eq!(parse_human_duration("1d"), Some(Duration::from_secs(86400)));
/// assert_eq!(parse_human_duration("300"), Some(Duration::from_secs(300)));
/// assert_eq!(parse_human_duration("bogus"), None);
/// ```
pub fn parse_human_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (num_part, unit) = match s.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&s[..s.len() - 1], c.to_ascii_lowercase()),
        _ => (s, 's'),
    };

    let value: f64 = num_part.trim().parse().ok()?;
    if value < 0.0 || !value.is_finite() {
        return None;
    }

    let secs = match unit {
        's' => value,
        'm' => value * 60.0,
        'h' => value * 3600.0,
        'd' => value * 86400.0,
        _ => return None,
    };

    Some(Duration::from_secs_f64(secs))
}

/// [`parse_human_duration`] with a fallback applied when parsing fails.
pub fn parse_human_duration_or(s: &str, fallback: Duration) -> Duration {
    parse_human_duration(s).unwrap_or(fallback)
}
