//! Engineering-notation conversions for SPICE values.

use nom::number::complete::recognize_float;

/// The multiplier denoted by a SPICE magnitude suffix.
///
/// Only the leading letters matter: `10uF` is `10u`, and `1Meg` is not `1m`.
/// Letters that are not a known magnitude (units such as `V` or `ohm`) give `1.0`.
pub fn suffix_multiplier(suffix: &str) -> f64 {
    let lower = suffix.to_lowercase();
    if lower.starts_with("meg") {
        return 1e6;
    }
    if lower.starts_with("mil") {
        return 25.4e-6;
    }
    match lower.chars().next() {
        Some('t') => 1e12,
        Some('g') => 1e9,
        Some('k') => 1e3,
        Some('m') => 1e-3,
        Some('u') | Some('µ') | Some('μ') => 1e-6,
        Some('n') => 1e-9,
        Some('p') => 1e-12,
        Some('f') => 1e-15,
        _ => 1.0,
    }
}

/// Returns `true` if `c` may appear in a magnitude suffix or unit.
pub(crate) fn is_suffix_char(c: char) -> bool {
    c.is_alphabetic() || c == 'µ' || c == 'μ'
}

/// Splits a leading number with an optional suffix off `input`.
///
/// Returns the value and the remaining input.
pub(crate) fn take_number(input: &str) -> Option<(f64, &str)> {
    let (rest, digits) = recognize_float::<_, ()>(input).ok()?;
    let mantissa: f64 = digits.parse().ok()?;
    let suffix_len = rest
        .char_indices()
        .find(|(_, c)| !is_suffix_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    let (suffix, rest) = rest.split_at(suffix_len);
    Some((mantissa * suffix_multiplier(suffix), rest))
}

/// Parses a number written with an optional SPICE magnitude suffix.
///
/// Returns `None` unless the whole (trimmed) string is a number.
pub fn scan_eng(value: &str) -> Option<f64> {
    match take_number(value.trim()) {
        Some((value, "")) => Some(value),
        _ => None,
    }
}

/// Formats a number with an SI magnitude suffix and six significant digits.
///
/// Magnitudes outside the `f` to `Meg` range are written in exponent form.
pub fn format_eng(value: f64) -> String {
    if value == 0.0 {
        return "0.0".to_string();
    }
    if !value.is_finite() {
        return format!("{value:E}");
    }
    let mut exp = value.abs().log(1000.0).floor() as i32;
    let mut scaled = value / 1000f64.powi(exp);
    // Correct for rounding in the logarithm near exact powers of 1000.
    if scaled.abs() >= 1000.0 {
        exp += 1;
        scaled /= 1000.0;
    } else if scaled.abs() < 1.0 {
        exp -= 1;
        scaled *= 1000.0;
    }
    // Rounding to six digits can carry into the next power of 1000.
    let digits = significant(scaled, 6);
    if digits
        .trim_start_matches('-')
        .parse::<f64>()
        .is_ok_and(|d| d >= 1000.0)
    {
        exp += 1;
        scaled /= 1000.0;
    }
    let suffix = match exp {
        -5 => "f",
        -4 => "p",
        -3 => "n",
        -2 => "u",
        -1 => "m",
        0 => "",
        1 => "k",
        2 => "Meg",
        _ => return format!("{value:E}"),
    };
    format!("{}{suffix}", significant(scaled, 6))
}

/// Formats `value` to `digits` significant digits, without trailing zeros.
fn significant(value: f64, digits: usize) -> String {
    let int_digits = (value.abs().log10().floor() as i32 + 1).max(1) as usize;
    let precision = digits.saturating_sub(int_digits);
    let text = format!("{value:.precision$}");
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}
