//! Time-window bucketing shared by all detectors.

use chrono::{DateTime, TimeZone, Utc};

/// Floor a timestamp to the start of its containing window.
///
/// All detectors use this same truncation so that window boundaries line
/// up within a single analysis run. Two records belong to the same window
/// iff their floored timestamps are equal.
pub fn window_floor(ts: DateTime<Utc>, window_minutes: i64) -> DateTime<Utc> {
    let interval = window_minutes.max(1) * 60;
    let secs = ts.timestamp();
    let floored = secs.div_euclid(interval) * interval;
    Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
}

/// End of the window that starts at `window_start`.
pub fn window_end(window_start: DateTime<Utc>, window_minutes: i64) -> DateTime<Utc> {
    window_start + chrono::Duration::minutes(window_minutes.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn floors_to_five_minute_boundary() {
        let t = ts("2025-04-17T05:13:56Z");
        assert_eq!(window_floor(t, 5), ts("2025-04-17T05:10:00Z"));
        // Already on a boundary: unchanged
        assert_eq!(window_floor(ts("2025-04-17T05:10:00Z"), 5), ts("2025-04-17T05:10:00Z"));
    }

    #[test]
    fn same_window_iff_same_floor() {
        let a = ts("2025-04-17T05:10:01Z");
        let b = ts("2025-04-17T05:14:59Z");
        let c = ts("2025-04-17T05:15:00Z");
        assert_eq!(window_floor(a, 5), window_floor(b, 5));
        assert_ne!(window_floor(b, 5), window_floor(c, 5));
    }

    #[test]
    fn sixty_minute_windows_floor_to_the_hour() {
        let t = ts("2025-04-17T05:59:59Z");
        assert_eq!(window_floor(t, 60), ts("2025-04-17T05:00:00Z"));
        assert_eq!(window_end(window_floor(t, 60), 60), ts("2025-04-17T06:00:00Z"));
    }
}
