use chrono::{DateTime, Utc};

use crate::time_utils::TimezoneHandler;

/// Format a floating-point number with thousands separators and a fixed number
/// of decimal places.
///
/// # Examples
///
/// ```
/// use sessions_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5,  1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(0.0, 2), "0.00");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let formatted = format!("{:.prec$}", value.abs(), prec = decimals as usize);

    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut result = group_thousands(int_part);
    if let Some(frac) = frac_part {
        result.push('.');
        result.push_str(frac);
    }

    if negative && result.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", result)
    } else {
        result
    }
}

/// Format a count with thousands separators.
///
/// # Examples
///
/// ```
/// use sessions_core::formatting::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(12_345), "12,345");
/// ```
pub fn format_count(value: usize) -> String {
    group_thousands(&value.to_string())
}

/// Render an optional timestamp in the handler's zone, or `"-"` when absent.
pub fn format_timestamp(ts: Option<DateTime<Utc>>, tz: &TimezoneHandler) -> String {
    match ts {
        Some(dt) => tz.to_local(dt).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        None => "-".to_string(),
    }
}

/// Truncate `text` to at most `max_chars` characters, appending `...` when
/// anything was cut. Never splits a multi-byte character.
///
/// # Examples
///
/// ```
/// use sessions_core::formatting::preview_text;
///
/// assert_eq!(preview_text("hello", 10), "hello");
/// assert_eq!(preview_text("hello world", 5), "hello...");
/// assert_eq!(preview_text("héllo", 2), "hé...");
/// ```
pub fn preview_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
