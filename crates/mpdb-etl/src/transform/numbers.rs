//! Fixed-point normalization of financial fields.

use std::str::FromStr;

use mpdb_core::{PipelineConfig, RoundingRule};
use rust_decimal::Decimal;
use serde_json::Value;

/// Outcome of reading one numeric field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coerced<T> {
    Value(T),
    /// Null, blank, or not present.
    Absent,
    /// Present but not a number; carries the raw text.
    Invalid(String),
}

impl<T> Coerced<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Coerced::Value(v) => Some(v),
            Coerced::Absent | Coerced::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalFormat {
    pub scale: u32,
    pub rounding: RoundingRule,
}

impl Default for DecimalFormat {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl DecimalFormat {
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            scale: config.decimal_scale,
            rounding: config.rounding,
        }
    }

    /// Round `value` to the configured scale.
    #[must_use]
    pub fn round(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.scale, self.rounding.strategy())
    }

    /// Parse and round one field value.
    ///
    /// Accepts JSON numbers and strings with currency symbols, thousands
    /// separators, or exponent notation (`"$1,250.50"`, `"1.5e3"`).
    #[must_use]
    pub fn coerce(&self, value: Option<&Value>) -> Coerced<Decimal> {
        match value {
            None | Some(Value::Null) => Coerced::Absent,
            Some(Value::Number(n)) => match parse_decimal(&n.to_string()) {
                Some(d) => Coerced::Value(self.round(d)),
                None => Coerced::Invalid(n.to_string()),
            },
            Some(Value::String(s)) if s.trim().is_empty() => Coerced::Absent,
            Some(Value::String(s)) => match parse_decimal(s) {
                Some(d) => Coerced::Value(self.round(d)),
                None => Coerced::Invalid(s.clone()),
            },
            Some(other) => Coerced::Invalid(other.to_string()),
        }
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '_'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.contains(['e', 'E']) {
        return Decimal::from_scientific(&cleaned).ok();
    }
    Decimal::from_str(&cleaned).ok()
}

/// Parse a non-negative whole count; fractional input is truncated.
#[must_use]
pub fn coerce_count(value: Option<&Value>) -> Coerced<u64> {
    match value {
        None | Some(Value::Null) => Coerced::Absent,
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| parse_decimal(&n.to_string()).and_then(decimal_to_count))
            .map_or_else(|| Coerced::Invalid(n.to_string()), Coerced::Value),
        Some(Value::String(s)) if s.trim().is_empty() => Coerced::Absent,
        Some(Value::String(s)) => parse_decimal(s)
            .and_then(decimal_to_count)
            .map_or_else(|| Coerced::Invalid(s.clone()), Coerced::Value),
        Some(other) => Coerced::Invalid(other.to_string()),
    }
}

fn decimal_to_count(d: Decimal) -> Option<u64> {
    if d.is_sign_negative() {
        return None;
    }
    u64::try_from(d.trunc()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn half_up() -> DecimalFormat {
        DecimalFormat {
            scale: 6,
            rounding: RoundingRule::HalfUp,
        }
    }

    #[test]
    fn value_at_scale_is_unchanged() {
        assert_eq!(
            half_up().coerce(Some(&json!("12.345678"))),
            Coerced::Value(dec("12.345678"))
        );
    }

    #[test]
    fn midpoint_rounds_half_up() {
        assert_eq!(
            half_up().coerce(Some(&json!("12.3456785"))),
            Coerced::Value(dec("12.345679"))
        );
        assert_eq!(
            half_up().coerce(Some(&json!("-12.3456785"))),
            Coerced::Value(dec("-12.345679"))
        );
    }

    #[test]
    fn half_even_and_truncate_rules() {
        let even = DecimalFormat {
            scale: 2,
            rounding: RoundingRule::HalfEven,
        };
        let cut = DecimalFormat {
            scale: 2,
            rounding: RoundingRule::Truncate,
        };
        assert_eq!(even.coerce(Some(&json!("0.125"))), Coerced::Value(dec("0.12")));
        assert_eq!(cut.coerce(Some(&json!("0.129"))), Coerced::Value(dec("0.12")));
    }

    #[test]
    fn json_numbers_are_parsed_from_their_text() {
        assert_eq!(
            half_up().coerce(Some(&json!(12.345_678_5))),
            Coerced::Value(dec("12.345679"))
        );
        assert_eq!(half_up().coerce(Some(&json!(1500))), Coerced::Value(dec("1500")));
    }

    #[test]
    fn currency_formatting_and_exponents() {
        assert_eq!(
            half_up().coerce(Some(&json!("$1,250.50"))),
            Coerced::Value(dec("1250.50"))
        );
        assert_eq!(half_up().coerce(Some(&json!("1.5e3"))), Coerced::Value(dec("1500")));
    }

    #[test]
    fn absent_and_invalid_are_distinguished() {
        assert_eq!(half_up().coerce(None), Coerced::Absent);
        assert_eq!(half_up().coerce(Some(&json!(null))), Coerced::Absent);
        assert_eq!(half_up().coerce(Some(&json!("  "))), Coerced::Absent);
        assert_eq!(
            half_up().coerce(Some(&json!("twelve"))),
            Coerced::Invalid("twelve".to_string())
        );
        assert!(matches!(half_up().coerce(Some(&json!([1]))), Coerced::Invalid(_)));
    }

    #[test]
    fn counts_accept_whole_and_fractional_input() {
        assert_eq!(coerce_count(Some(&json!(12))), Coerced::Value(12));
        assert_eq!(coerce_count(Some(&json!("1,200"))), Coerced::Value(1200));
        assert_eq!(coerce_count(Some(&json!(3.9))), Coerced::Value(3));
        assert!(matches!(coerce_count(Some(&json!(-1))), Coerced::Invalid(_)));
    }
}
