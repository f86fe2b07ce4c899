// utils/phone.rs

/// Normalises a Kenyan MSISDN to the `2547XXXXXXXX` digit form.
///
/// Non-digits are dropped first, so `+254 712 345 678` and `0712-345-678`
/// both normalise to `254712345678`. Numbers that fit none of the known
/// shapes are returned as their bare digit string.
pub fn normalize_phone(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if digits.starts_with("254") && digits.len() == 12 {
        return Some(digits);
    }
    if digits.starts_with('0') && digits.len() == 10 {
        return Some(format!("254{}", &digits[1..]));
    }
    if digits.len() == 9 {
        return Some(format!("254{}", digits));
    }
    Some(digits)
}

/// Callback payloads carry the phone as a JSON number or a string.
pub fn normalize_phone_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => normalize_phone(s),
        serde_json::Value::Number(n) => normalize_phone(&n.to_string()),
        _ => None,
    }
}

/// Representations a stored user phone may take: normalised, `+`-prefixed, local `0` form.
pub fn phone_candidates(input: &str) -> Vec<String> {
    let Some(normalized) = normalize_phone(input) else {
        return Vec::new();
    };

    let mut candidates = vec![normalized.clone(), format!("+{}", normalized)];
    if let Some(rest) = normalized.strip_prefix("254") {
        candidates.push(format!("0{}", rest));
    }
    candidates.dedup();
    candidates
}
