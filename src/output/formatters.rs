//! Reusable formatting utilities for CLI output
//!
//! Common formatting for timestamps, watch durations, byte sizes and
//! percentages used across the cache and progress commands.

use chrono::{DateTime, Local, Utc};

/// Format a UTC instant as local date/time.
///
/// Returns "N/A" when there is no timestamp.
///
/// # Example output
/// `2026-03-02 10:00 +01:00`
pub fn format_timestamp_local(timestamp: Option<&DateTime<Utc>>) -> String {
    match timestamp {
        Some(dt) => dt
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M %:z")
            .to_string(),
        None => "N/A".to_string(),
    }
}

/// Format a date range as `YYYY-MM-DD → YYYY-MM-DD` in local time.
pub fn format_date_range(start: &DateTime<Utc>, end: &DateTime<Utc>) -> String {
    format!(
        "{} → {}",
        start.with_timezone(&Local).format("%Y-%m-%d"),
        end.with_timezone(&Local).format("%Y-%m-%d")
    )
}

/// Format a duration in seconds to a human-readable string.
///
/// Fractions are truncated. Negative or non-finite values read as "0s".
///
/// # Example output
/// - `2h 15m 30s` (hours, minutes, seconds)
/// - `5m 10s` (minutes, seconds)
/// - `45s` (seconds only)
pub fn format_duration(seconds: f64) -> String {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };

    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Format bytes as a human-readable size
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format a 0-100 percentage with no decimals, "--" when unknown
pub fn format_percent(percent: Option<f64>) -> String {
    match percent {
        Some(p) if p.is_finite() => format!("{:.0}%", p.clamp(0.0, 100.0)),
        _ => "--".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp_local_some() {
        let dt = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let result = format_timestamp_local(Some(&dt));
        // Exact output depends on the local timezone
        assert!(result.starts_with("2026-03-0"));
        assert!(result.contains(':'));
    }

    #[test]
    fn test_format_timestamp_local_none() {
        assert_eq!(format_timestamp_local(None), "N/A");
    }

    #[test]
    fn test_format_duration_hours() {
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
        assert_eq!(format_duration(7200.0), "2h 0m 0s");
    }

    #[test]
    fn test_format_duration_minutes_truncates_fraction() {
        assert_eq!(format_duration(125.9), "2m 5s");
        assert_eq!(format_duration(60.0), "1m 0s");
    }

    #[test]
    fn test_format_duration_degenerate() {
        assert_eq!(format_duration(0.0), "0s");
        assert_eq!(format_duration(-4.0), "0s");
        assert_eq!(format_duration(f64::NAN), "0s");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(Some(50.0)), "50%");
        assert_eq!(format_percent(Some(140.0)), "100%");
        assert_eq!(format_percent(None), "--");
    }
}
