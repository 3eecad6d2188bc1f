//! Human-readable durations such as `500ms`, `30s`, `5m`.

use std::time::Duration;

/// Parse `Nms`, `Ns`, `Nm` or a bare `N` (seconds).
///
/// ```
/// use devstack::config::parse_duration_string;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration_string("500ms"), Some(Duration::from_millis(500)));
/// assert_eq!(parse_duration_string("2m"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_duration_string("45"), Some(Duration::from_secs(45)));
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// `clap` value parser wrapper around [`parse_duration_string`].
pub fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration_string(s)
        .ok_or_else(|| format!("invalid duration '{}': use formats like 500ms, 30s, 5m", s))
}
