//! Human-readable duration formatting
//!
//! Used for ETA display in progress responses and log lines.

/// Thresholds (seconds) selecting the output format
const SECONDS_FORMAT_MAX: f64 = 60.0; // < 1m → "Ns"
const MINUTES_FORMAT_MAX: f64 = 3600.0; // < 1h → "Nm Ms"
                                        // >= 1h → "Hh Mm"

/// Format a duration in seconds for display.
///
/// - `< 60s` → `"Ns"`
/// - `< 3600s` → `"Nm Ms"`
/// - otherwise → `"Hh Mm"`
///
/// Fractions are rounded to the nearest second first. Negative and non-finite
/// values are treated as zero.
///
/// # Examples
///
/// ```
/// use scout_common::human_time::format_duration;
///
/// assert_eq!(format_duration(45.0), "45s");
/// assert_eq!(format_duration(125.0), "2m 5s");
/// assert_eq!(format_duration(3725.0), "1h 2m");
/// ```
pub fn format_duration(seconds: f64) -> String {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds.round()
    } else {
        0.0
    };

    if seconds < SECONDS_FORMAT_MAX {
        format!("{}s", seconds as u64)
    } else if seconds < MINUTES_FORMAT_MAX {
        let total = seconds as u64;
        format!("{}m {}s", total / 60, total % 60)
    } else {
        let total = seconds as u64;
        format!("{}h {}m", total / 3600, (total % 3600) / 60)
    }
}

/// Format an optional duration; `None` renders as `"unknown"`
pub fn format_duration_opt(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) => format_duration(s),
        None => "unknown".to_string(),
    }
}
