//! Formatting helpers shared by the CLI and log output.

use chrono::{DateTime, TimeDelta, Utc};

/// Format a duration compactly (e.g., "1h 05m", "3m 20s", "450ms").
pub fn format_duration(d: TimeDelta) -> String {
    if d < TimeDelta::zero() {
        return format!("-{}", format_duration(-d));
    }
    let secs = d.num_seconds();
    if secs == 0 {
        format!("{}ms", d.num_milliseconds())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Format an optional timestamp as RFC 3339 seconds, or "-" if missing.
pub fn format_timestamp_opt(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        None => "-".to_string(),
    }
}
