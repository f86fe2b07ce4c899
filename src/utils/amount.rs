// utils/amount.rs
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::errors::{AppError, Result};

/// Parses a storefront price such as `"KSh 1,200.00"`, `"1200"` or `1200`.
///
/// Unparseable input yields zero: one malformed cart line must not block an order.
pub fn parse_kes_amount(value: &Value) -> Decimal {
    match value {
        Value::Number(n) => decimal_from_number(n).unwrap_or(Decimal::ZERO),
        Value::String(s) => parse_price_str(s).unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

fn decimal_from_number(n: &serde_json::Number) -> Option<Decimal> {
    if let Some(i) = n.as_i64() {
        return Some(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(Decimal::from(u));
    }
    n.as_f64().and_then(Decimal::from_f64)
}

fn parse_price_str(raw: &str) -> Option<Decimal> {
    let mut s = raw.trim();
    for prefix in ["ksh", "kes"] {
        if let Some(head) = s.get(..prefix.len()) {
            if head.eq_ignore_ascii_case(prefix) {
                s = s[prefix.len()..].trim_start();
                break;
            }
        }
    }

    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();

    // Longest leading decimal prefix, e.g. "1200.50/=" parses as 1200.50.
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in cleaned.char_indices() {
        match c {
            '0'..='9' => end = i + 1,
            '-' | '+' if i == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
    }

    cleaned[..end].parse::<Decimal>().ok()
}

/// Initiation amount: positive, rounded half away from zero to whole shillings.
pub fn parse_payment_amount(value: &Value) -> Result<i64> {
    let amount = match value {
        Value::Number(n) => decimal_from_number(n),
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    }
    .ok_or_else(|| AppError::invalid_data("Amount must be a number"))?;

    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    match rounded.to_i64() {
        Some(whole) if whole > 0 => Ok(whole),
        _ => Err(AppError::invalid_data("Amount must be greater than 0")),
    }
}

/// Optional amount carried by a provider callback.
pub fn callback_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => decimal_from_number(n),
        Value::String(s) => parse_price_str(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn currency_prefixed_and_plain_prices_agree() {
        assert_eq!(parse_kes_amount(&json!("KSh 1,200.00")), dec!(1200));
        assert_eq!(parse_kes_amount(&json!("1200")), dec!(1200));
        assert_eq!(parse_kes_amount(&json!(1200)), dec!(1200));
        assert_eq!(parse_kes_amount(&json!("KES 2,500")), dec!(2500));
        assert_eq!(parse_kes_amount(&json!("ksh450")), dec!(450));
    }

    #[test]
    fn malformed_prices_default_to_zero() {
        assert_eq!(parse_kes_amount(&json!("free")), Decimal::ZERO);
        assert_eq!(parse_kes_amount(&json!(null)), Decimal::ZERO);
        assert_eq!(parse_kes_amount(&json!({"amount": 3})), Decimal::ZERO);
    }

    #[test]
    fn trailing_garbage_is_ignored() {
        assert_eq!(parse_kes_amount(&json!("1200.50/=")), dec!(1200.50));
    }

    #[test]
    fn payment_amount_rounds_half_away_from_zero() {
        assert_eq!(parse_payment_amount(&json!(499.5)).unwrap(), 500);
        assert_eq!(parse_payment_amount(&json!("500")).unwrap(), 500);
        assert_eq!(parse_payment_amount(&json!(1.2)).unwrap(), 1);
    }

    #[test]
    fn non_positive_payment_amounts_are_rejected() {
        assert!(parse_payment_amount(&json!(0)).is_err());
        assert!(parse_payment_amount(&json!(0.4)).is_err());
        assert!(parse_payment_amount(&json!(-20)).is_err());
        assert!(parse_payment_amount(&json!("abc")).is_err());
    }
}
