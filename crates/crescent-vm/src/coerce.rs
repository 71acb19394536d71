//! Type coercion with Lua 5.3 semantics.

use crescent_core::string::StringInterner;
use crescent_core::value::{float_to_integer, Value};

/// Coerce a value to f64. Integers widen; strings parse as base-10
/// decimal numbers.
pub fn to_float(v: Value, strings: &StringInterner) -> Option<f64> {
    match v {
        Value::Float(f) => Some(f),
        Value::Integer(i) => Some(i as f64),
        Value::String(sid) => parse_float(strings.get_bytes(sid)),
        _ => None,
    }
}

/// Coerce a value to i64. Floats must be integral and exactly
/// representable; strings parse as an integer, or as a float subject to
/// the same exactness rule.
pub fn to_integer(v: Value, strings: &StringInterner) -> Option<i64> {
    match v {
        Value::Integer(i) => Some(i),
        Value::Float(f) => float_to_integer(f),
        Value::String(sid) => {
            let s = std::str::from_utf8(strings.get_bytes(sid)).ok()?;
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Some(i)
            } else {
                parse_float(strings.get_bytes(sid)).and_then(float_to_integer)
            }
        }
        _ => None,
    }
}

fn parse_float(bytes: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(bytes).ok()?.trim();
    // Rust's parser accepts "inf"/"nan" spellings that Lua's number
    // grammar does not.
    let stripped = s.trim_start_matches(['+', '-']);
    if stripped.is_empty()
        || stripped.starts_with("inf")
        || stripped.starts_with("Inf")
        || stripped.starts_with("nan")
        || stripped.starts_with("NaN")
    {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Render a value in its default decimal form, as `tostring` would.
/// Only numbers and strings are renderable.
pub fn to_display_bytes(v: Value, strings: &StringInterner) -> Option<Vec<u8>> {
    match v {
        Value::String(sid) => Some(strings.get_bytes(sid).to_vec()),
        Value::Integer(i) => Some(i.to_string().into_bytes()),
        Value::Float(f) => Some(format_float(f).into_bytes()),
        _ => None,
    }
}

/// Format a float the way Lua 5.3 does: `%.14g`, with a `.0` suffix when
/// the result would otherwise look like an integer.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        // What %.14g prints for the default quiet NaN.
        return "-nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    format_g14(f)
}

/// `%.14g` emulation. The value is rendered once in scientific form with
/// 14 significant digits; the decimal point is then repositioned in the
/// digit string. Exponents in [-4, 14) come out in fixed notation, the
/// rest keep a C-style two-digit `e±XX` exponent.
fn format_g14(f: f64) -> String {
    let sci = format!("{:.13e}", f.abs());
    let (mantissa, exp_text) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp_text.parse().unwrap_or(0);

    let mut digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    while digits.len() > 1 && digits.ends_with('0') {
        digits.pop();
    }
    let sign = if f.is_sign_negative() { "-" } else { "" };

    if (-4..14).contains(&exp) {
        if exp < 0 {
            let zeros = "0".repeat((-exp - 1) as usize);
            format!("{sign}0.{zeros}{digits}")
        } else if exp as usize + 1 >= digits.len() {
            let zeros = "0".repeat(exp as usize + 1 - digits.len());
            format!("{sign}{digits}{zeros}.0")
        } else {
            let (int_part, frac_part) = digits.split_at(exp as usize + 1);
            format!("{sign}{int_part}.{frac_part}")
        }
    } else {
        let (head, tail) = digits.split_at(1);
        let exp_sign = if exp < 0 { '-' } else { '+' };
        if tail.is_empty() {
            format!("{sign}{head}e{exp_sign}{:02}", exp.abs())
        } else {
            format!("{sign}{head}.{tail}e{exp_sign}{:02}", exp.abs())
        }
    }
}
