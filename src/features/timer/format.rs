//! Clock formatting and duration parsing for timer values.

use std::time::Duration;

/// Format seconds as `MM:SS`, or `H:MM:SS` from one hour up.
#[must_use]
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Format seconds in words, e.g. "1 hour, 5 minutes".
#[must_use]
pub fn format_words(seconds: u64) -> String {
    if seconds < 60 {
        return plural(seconds, "second");
    }
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    match (hours, minutes) {
        (0, m) => plural(m, "minute"),
        (h, 0) => plural(h, "hour"),
        (h, m) => format!("{}, {}", plural(h, "hour"), plural(m, "minute")),
    }
}

/// Parse a duration like `25`, `25m`, `1h30m` or `90s`.
///
/// A bare number, or a trailing number without a unit, counts as minutes.
/// Returns `None` for unknown units or a zero total.
#[must_use]
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim().to_ascii_lowercase();
    let mut total: u64 = 0;
    let mut digits = String::new();

    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return None;
        }
        let n: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        total = total.checked_add(n.checked_mul(unit)?)?;
    }

    if !digits.is_empty() {
        let n: u64 = digits.parse().ok()?;
        total = total.checked_add(n.checked_mul(60)?)?;
    }

    (total > 0).then(|| Duration::from_secs(total))
}

/// Render a countdown progress bar `width` cells wide.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn progress_bar(remaining: u64, total: u64, width: usize) -> String {
    let done = if total == 0 {
        1.0
    } else {
        1.0 - (remaining.min(total) as f64 / total as f64)
    };
    let filled = ((done * width as f64) as usize).min(width);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
}
