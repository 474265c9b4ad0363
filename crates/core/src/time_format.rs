//! Human-readable elapsed time
//!
//! Used for the `elapsed` field of timing log lines.

const DEFAULT_PRECISION: usize = 2;
const SECONDS_PRECISION: usize = 5;

const UNITS: [(&str, f64); 4] = [
    ("second", 60.0),
    ("minute", 60.0),
    ("hour", 24.0),
    ("day", f64::INFINITY),
];

/// Format a duration in seconds
///
/// ```
/// use testtrace_core::format_time;
///
/// assert_eq!(format_time(0.25), "0.25 seconds");
/// assert_eq!(format_time(1.0), "1 second");
/// assert_eq!(format_time(3725.5), "1 hour 2 minutes 5.5 seconds");
/// ```
pub fn format_time(seconds: f64) -> String {
    if seconds < 60.0 {
        return pluralize(&format_duration(seconds), "second");
    }

    let mut remaining = seconds;
    let mut parts = Vec::new();

    for (unit, count) in UNITS {
        if remaining <= 0.0 {
            break;
        }

        let (quotient, remainder) = if count.is_infinite() {
            (0.0, remaining)
        } else {
            let q = (remaining / count).floor();
            (q, remaining - q * count)
        };
        remaining = quotient;

        if remainder == 0.0 {
            continue;
        }
        parts.push(pluralize(&format_duration(remainder), unit));
    }

    parts.reverse();
    parts.join(" ")
}

fn format_duration(duration: f64) -> String {
    if duration < 0.0 {
        return "0".to_string();
    }

    let precision = if duration < 1.0 {
        SECONDS_PRECISION
    } else {
        DEFAULT_PRECISION
    };
    strip_trailing_zeros(format!("{:.*}", precision, duration))
}

fn strip_trailing_zeros(formatted: String) -> String {
    if !formatted.contains('.') {
        return formatted;
    }
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn pluralize(duration: &str, unit: &str) -> String {
    let singular = duration
        .parse::<f64>()
        .map(|d| (d - 1.0).abs() < f64::EPSILON)
        .unwrap_or(false);

    if singular {
        format!("{} {}", duration, unit)
    } else {
        format!("{} {}s", duration, unit)
    }
}
