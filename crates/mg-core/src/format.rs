//! Human-readable rendering of durations and byte counts.
//!
//! Both helpers are total: odd input renders a sentinel string instead of
//! failing, because upstream metadata is best-effort.

use serde_json::Value;

/// Rendered when a duration is absent or not numeric.
pub const UNKNOWN_DURATION: &str = "unknown";

/// Rendered when a size is absent or zero.
pub const UNKNOWN_SIZE: &str = "N/A";

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Format a number of seconds as `H:MM:SS` (one hour or more) or `M:SS`.
///
/// Accepts integers, floats and numeric strings; fractional seconds are
/// truncated. Anything else, including `null` and negative values, renders
/// [`UNKNOWN_DURATION`].
pub fn format_duration(seconds: Option<&Value>) -> String {
    let Some(total) = seconds.and_then(duration_secs) else {
        return UNKNOWN_DURATION.to_string();
    };

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Whole seconds from a JSON duration value, if it is a usable number.
pub fn duration_secs(value: &Value) -> Option<u64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    Some(raw as u64)
}

/// Format a byte count with base-1024 units and one decimal place.
///
/// `None` and `0` render [`UNKNOWN_SIZE`]. Values step up a unit once they
/// reach 1024; anything past gigabytes is expressed in terabytes.
pub fn format_size(bytes: Option<u64>) -> String {
    let bytes = match bytes {
        Some(b) if b > 0 => b,
        _ => return UNKNOWN_SIZE.to_string(),
    };

    let mut value = bytes as f64;
    for unit in SIZE_UNITS {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} TB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duration_under_an_hour() {
        assert_eq!(format_duration(Some(&json!(0))), "0:00");
        assert_eq!(format_duration(Some(&json!(59))), "0:59");
        assert_eq!(format_duration(Some(&json!(212))), "3:32");
    }

    #[test]
    fn duration_with_hours() {
        assert_eq!(format_duration(Some(&json!(3725))), "1:02:05");
        assert_eq!(format_duration(Some(&json!(36000))), "10:00:00");
    }

    #[test]
    fn duration_truncates_fractions_and_parses_strings() {
        assert_eq!(format_duration(Some(&json!(61.9))), "1:01");
        assert_eq!(format_duration(Some(&json!("3725"))), "1:02:05");
    }

    #[test]
    fn duration_unknown_sentinel() {
        assert_eq!(format_duration(None), UNKNOWN_DURATION);
        assert_eq!(format_duration(Some(&Value::Null)), UNKNOWN_DURATION);
        assert_eq!(format_duration(Some(&json!("live"))), UNKNOWN_DURATION);
        assert_eq!(format_duration(Some(&json!(-5))), UNKNOWN_DURATION);
        assert_eq!(format_duration(Some(&json!([1, 2]))), UNKNOWN_DURATION);
    }

    #[test]
    fn size_fixed_points() {
        assert_eq!(format_size(Some(500)), "500.0 B");
        assert_eq!(format_size(Some(1536)), "1.5 KB");
        assert_eq!(format_size(Some(0)), UNKNOWN_SIZE);
        assert_eq!(format_size(None), UNKNOWN_SIZE);
    }

    #[test]
    fn size_unit_boundaries() {
        assert_eq!(format_size(Some(1023)), "1023.0 B");
        assert_eq!(format_size(Some(1024)), "1.0 KB");
        assert_eq!(format_size(Some(5 * 1024 * 1024)), "5.0 MB");
        assert_eq!(format_size(Some(3 * 1024 * 1024 * 1024)), "3.0 GB");
        assert_eq!(format_size(Some(2 * 1024u64.pow(4))), "2.0 TB");
    }
}
