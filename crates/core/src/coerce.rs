//! Primitive coercion shared by codecs, sources and the expression evaluator.

use crate::value::Value;

/// Interpret literal text as a typed scalar.
///
/// `true`, `false` and `null` become their typed values and canonical
/// decimal numbers (`-12`, `0.5`, `3.25`) become numbers. Anything else,
/// including numbers with leading zeros or exponents, stays a string so
/// identifiers such as zip codes survive untouched.
pub fn parse_scalar(text: &str) -> Value {
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ if is_canonical_number(text) => text
            .parse::<f64>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        _ => Value::String(text.to_string()),
    }
}

fn is_canonical_number(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if int_part.len() > 1 && int_part.starts_with('0') {
        return false;
    }
    match frac_part {
        Some(f) => !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()),
        None => true,
    }
}

/// Numeric view of a value. Anything that is not a number or a numeric
/// string is `NaN`, so every ordered comparison against it is false.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        Value::String(s) => parse_number_text(s),
        _ => f64::NAN,
    }
}

/// Parse numeric text, rejecting the `inf`/`NaN` spellings `f64::from_str`
/// would otherwise accept.
pub fn parse_number_text(text: &str) -> f64 {
    let t = text.trim();
    if t.is_empty()
        || !t
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Boolean context: null is false, zero/NaN are false, the empty string is
/// false, containers are true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Equality used by `==` and `in`: numeric when both sides are numeric,
/// structural otherwise.
pub fn loose_equals(left: &Value, right: &Value) -> bool {
    let (l, r) = (to_number(left), to_number(right));
    if !l.is_nan() && !r.is_nan() {
        return l == r;
    }
    left == right
}
