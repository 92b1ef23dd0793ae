use serde_json::Value;

/// Coerce an untyped value into a finite number.
/// Absent, null, empty, non-numeric and non-finite inputs all yield `fallback`.
/// A non-finite fallback is itself replaced by `0.0`.
pub fn to_number(value: Option<&Value>, fallback: f64) -> f64 {
    let fallback = if fallback.is_finite() { fallback } else { 0.0 };
    parse_finite(value).unwrap_or(fallback)
}

/// Like `to_number` but reports a miss instead of substituting a default.
pub fn parse_finite(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

/// Format a value as `"{value:.decimals}%"`, or return `fallback` when it is not numeric.
pub fn to_percentage_string(value: Option<&Value>, decimals: usize, fallback: &str) -> String {
    match parse_finite(value) {
        Some(n) => format!("{:.*}%", decimals, n),
        None => fallback.to_string(),
    }
}

/// Non-negative whole count. Fractions truncate toward zero, negatives clamp to 0.
pub fn to_count(value: Option<&Value>, fallback: u64) -> u64 {
    match parse_finite(value) {
        Some(n) if n <= 0.0 => 0,
        Some(n) if n >= u64::MAX as f64 => u64::MAX,
        Some(n) => n.trunc() as u64,
        None => fallback,
    }
}

pub fn to_text(value: Option<&Value>, fallback: &str) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => fallback.to_string(),
    }
}

/// `part / whole * 100`, or `None` when the ratio is undefined.
pub fn ratio_percent(part: f64, whole: f64) -> Option<f64> {
    if whole == 0.0 || !whole.is_finite() || !part.is_finite() {
        return None;
    }
    let pct = part / whole * 100.0;
    pct.is_finite().then_some(pct)
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}
