//! Duration string handling for rule configuration.
//!
//! Time buckets, check frequencies, and late-data buffers are carried as
//! human-readable strings ("1m", "30s", "2h30m") because that is the form
//! the aggregation backend accepts verbatim.

use std::time::Duration;

/// Parse a human-readable duration string into a [`Duration`].
///
/// Supports components: `Xd` (days), `Xh` (hours), `Xm` (minutes), `Xs` (seconds).
/// Components can be combined: "2h30m", "1d12h", "90s".
/// Returns `None` if the string is empty or unparseable.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut total_secs: u64 = 0;
    let mut num_buf = String::new();
    let mut found_unit = false;

    for ch in s.chars() {
        if ch.is_ascii_digit() {
            num_buf.push(ch);
        } else {
            let n: u64 = num_buf.parse().ok()?;
            num_buf.clear();
            match ch {
                'd' => total_secs += n * 86_400,
                'h' => total_secs += n * 3_600,
                'm' => total_secs += n * 60,
                's' => total_secs += n,
                _ => return None,
            }
            found_unit = true;
        }
    }

    // Handle trailing number without unit (treat as seconds).
    if !num_buf.is_empty() {
        if found_unit {
            // Trailing digits after a unit ("30m15") are ambiguous.
            return None;
        }
        let n: u64 = num_buf.parse().ok()?;
        total_secs += n;
    }

    if total_secs == 0 && !found_unit {
        return None;
    }

    Some(Duration::from_secs(total_secs))
}

/// Seconds in one time bucket, defaulting to 60 when the string does not
/// parse. Cost estimation must never abort on a malformed bucket.
pub fn bucket_seconds(bucket: &str) -> u64 {
    parse_duration(bucket)
        .map(|d| d.as_secs().max(1))
        .unwrap_or(60)
}

/// Resolve a check frequency of "auto" (`None`) to max(time bucket, 1m).
/// The backend refuses sub-minute check intervals.
pub fn resolve_check_frequency(explicit: Option<&str>, time_bucket: &str) -> String {
    if let Some(f) = explicit {
        if !f.trim().is_empty() {
            return f.to_string();
        }
    }
    if bucket_seconds(time_bucket) < 60 {
        "1m".to_string()
    } else {
        time_bucket.to_string()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("1m"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7_200)));
        assert_eq!(parse_duration("7d"), Some(Duration::from_secs(604_800)));
    }

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("2h30m"), Some(Duration::from_secs(9_000)));
        assert_eq!(parse_duration("1d12h"), Some(Duration::from_secs(129_600)));
    }

    #[test]
    fn bare_number_is_seconds() {
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("30m15"), None);
        assert_eq!(parse_duration("5x"), None);
    }

    #[test]
    fn bucket_seconds_falls_back_to_one_minute() {
        assert_eq!(bucket_seconds("5m"), 300);
        assert_eq!(bucket_seconds("10s"), 10);
        assert_eq!(bucket_seconds("bogus"), 60);
        assert_eq!(bucket_seconds(""), 60);
    }

    #[test]
    fn auto_frequency_floors_at_one_minute() {
        assert_eq!(resolve_check_frequency(None, "10s"), "1m");
        assert_eq!(resolve_check_frequency(None, "5m"), "5m");
        assert_eq!(resolve_check_frequency(Some("15m"), "1m"), "15m");
        assert_eq!(resolve_check_frequency(Some(""), "30s"), "1m");
    }
}
