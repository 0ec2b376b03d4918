//! Cell coercions shared by the import targets.
//!
//! None of these fail. Unparseable input becomes the field's default: zero for required
//! numbers, `null` for optional ones, `false` for flags. Numbers accept a decimal comma.

use serde_json::{Number, Value};

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

pub fn text(raw: &str) -> Value {
    Value::String(raw.to_string())
}

/// Required number; defaults to 0.
pub fn number_or_zero(raw: &str) -> Value {
    parse_finite(raw)
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(0.0))
}

/// Optional number; empty or non-numeric input is `null`.
pub fn optional_number(raw: &str) -> Value {
    parse_finite(raw)
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Required integer; fractional input is truncated, anything else defaults to 0.
pub fn integer_or_zero(raw: &str) -> Value {
    let trimmed = raw.trim();
    let n = trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| parse_finite(trimmed).map(|v| v.trunc() as i64))
        .unwrap_or(0);
    Value::from(n)
}

/// Optional non-negative count; `null` when empty, negative, or non-numeric.
pub fn optional_count(raw: &str) -> Value {
    let trimmed = raw.trim();
    trimmed
        .parse::<u32>()
        .ok()
        .or_else(|| {
            parse_finite(trimmed)
                .filter(|v| *v >= 0.0 && *v <= f64::from(u32::MAX))
                .map(|v| v.trunc() as u32)
        })
        .map(Value::from)
        .unwrap_or(Value::Null)
}

pub fn boolean(raw: &str) -> Value {
    let flag = matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "t" | "1" | "yes" | "y" | "oui" | "vrai"
    );
    Value::Bool(flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_number_defaults_to_zero() {
        assert_eq!(number_or_zero("1500"), json!(1500.0));
        assert_eq!(number_or_zero(" 12,5 "), json!(12.5));
        assert_eq!(number_or_zero("abc"), json!(0.0));
        assert_eq!(number_or_zero(""), json!(0.0));
        assert_eq!(number_or_zero("NaN"), json!(0.0));
    }

    #[test]
    fn test_optional_number_is_null_when_missing() {
        assert_eq!(optional_number(""), Value::Null);
        assert_eq!(optional_number("n/a"), Value::Null);
        assert_eq!(optional_number("0"), json!(0.0));
        assert_eq!(optional_number("14.75"), json!(14.75));
    }

    #[test]
    fn test_integers_truncate_fractions() {
        assert_eq!(integer_or_zero("42"), json!(42));
        assert_eq!(integer_or_zero("7.9"), json!(7));
        assert_eq!(integer_or_zero("-3"), json!(-3));
        assert_eq!(integer_or_zero("beaucoup"), json!(0));
    }

    #[test]
    fn test_counts_reject_negative_values() {
        assert_eq!(optional_count("30"), json!(30));
        assert_eq!(optional_count("-1"), Value::Null);
        assert_eq!(optional_count(""), Value::Null);
    }

    #[test]
    fn test_boolean_accepts_common_spellings() {
        for raw in ["true", "TRUE", "1", "yes", "Oui", "vrai"] {
            assert_eq!(boolean(raw), Value::Bool(true), "{}", raw);
        }
        for raw in ["false", "0", "non", "", "peut-être"] {
            assert_eq!(boolean(raw), Value::Bool(false), "{}", raw);
        }
    }
}
