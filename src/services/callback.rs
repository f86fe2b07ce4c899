// services/callback.rs
//! Provider webhook payloads and their classification.
//!
//! Everything here is pure: a raw JSON body goes in, a [`ClassifiedCallback`]
//! comes out. Store access and side effects live in the reconciler.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::transaction::{Failure, Settlement, TerminalUpdate};
use crate::utils::amount::callback_amount;
use crate::utils::phone::normalize_phone_value;

// Primary (STK) shape: {"Body": {"stkCallback": {...}}}
#[derive(Debug, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,

    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,

    #[serde(rename = "ResultCode")]
    pub result_code: Value,

    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,

    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Value", default)]
    pub value: Value,
}

impl CallbackMetadata {
    /// Providers may reorder or omit items, so lookups are by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .map(|item| &item.value)
            .filter(|value| !value.is_null())
    }
}

// Secondary (Co-op) shape: flat, keyed by MessageReference.
#[derive(Debug, Deserialize)]
pub struct CoopCallback {
    #[serde(rename = "MessageReference")]
    pub message_reference: String,

    #[serde(rename = "ResultCode", default)]
    pub result_code: Value,

    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,

    #[serde(rename = "Amount", default)]
    pub amount: Value,

    #[serde(rename = "MobileNumber", default)]
    pub mobile_number: Value,

    #[serde(rename = "TransactionDate", default)]
    pub transaction_date: Value,

    #[serde(rename = "ReceiptNumber", default)]
    pub receipt_number: Option<String>,
}

/// A webhook body with its shape resolved once.
#[derive(Debug)]
pub enum CallbackPayload {
    Stk(StkCallback),
    Coop(CoopCallback),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Stk,
    Coop,
}

impl PayloadShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadShape::Stk => "stk",
            PayloadShape::Coop => "coop",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PayloadError {
    #[error("unrecognised callback payload")]
    Unrecognised,

    #[error("invalid {shape} callback: {reason}")]
    Invalid { shape: &'static str, reason: String },
}

impl CallbackPayload {
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        if value.pointer("/Body/stkCallback").is_some() {
            return StkCallbackEnvelope::deserialize(value)
                .map(|env| CallbackPayload::Stk(env.body.stk_callback))
                .map_err(|e| PayloadError::Invalid {
                    shape: "stk",
                    reason: e.to_string(),
                });
        }
        if value.get("MessageReference").is_some() {
            return CoopCallback::deserialize(value)
                .map(CallbackPayload::Coop)
                .map_err(|e| PayloadError::Invalid {
                    shape: "coop",
                    reason: e.to_string(),
                });
        }
        Err(PayloadError::Unrecognised)
    }
}

/// Identifiers available for the matching cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub primary: String,
    pub secondary: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedCallback {
    pub shape: PayloadShape,
    pub correlation: Correlation,
    pub update: TerminalUpdate,
}

/// Reads a result code that may arrive as a number or a numeric string.
fn result_code(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses the provider's compact `YYYYMMDDHHmmss` timestamp in the merchant's offset.
pub fn parse_compact_timestamp(raw: &str, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y%m%d%H%M%S").ok()?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Accepts the compact form, RFC 3339, or `YYYY-MM-DD HH:MM:SS` local time.
pub fn parse_provider_timestamp(value: &Value, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    let raw = value_to_string(value)?;
    if let Some(dt) = parse_compact_timestamp(&raw, offset) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Turns a payload into a correlation key set and the terminal update to apply.
///
/// `received_at` stands in for a missing or unparseable settlement time.
pub fn classify(
    payload: &CallbackPayload,
    offset: &FixedOffset,
    received_at: DateTime<Utc>,
) -> Result<ClassifiedCallback, PayloadError> {
    match payload {
        CallbackPayload::Stk(stk) => classify_stk(stk, offset, received_at),
        CallbackPayload::Coop(coop) => classify_coop(coop, offset, received_at),
    }
}

fn classify_stk(
    stk: &StkCallback,
    offset: &FixedOffset,
    received_at: DateTime<Utc>,
) -> Result<ClassifiedCallback, PayloadError> {
    let invalid = |reason: &str| PayloadError::Invalid {
        shape: "stk",
        reason: reason.to_string(),
    };

    let code = result_code(&stk.result_code).ok_or_else(|| invalid("ResultCode is not numeric"))?;
    let result_desc = stk.result_desc.clone().unwrap_or_default();
    let metadata = stk.callback_metadata.as_ref();

    let phone_number = metadata
        .and_then(|m| m.get("PhoneNumber"))
        .and_then(normalize_phone_value);

    let correlation = Correlation {
        primary: stk.checkout_request_id.clone(),
        secondary: stk.merchant_request_id.clone().filter(|s| !s.is_empty()),
        phone_number: phone_number.clone(),
    };

    let update = if code == 0 {
        let metadata = metadata.ok_or_else(|| invalid("success without CallbackMetadata"))?;
        let receipt = metadata
            .get("MpesaReceiptNumber")
            .and_then(value_to_string)
            .ok_or_else(|| invalid("success without MpesaReceiptNumber"))?;

        TerminalUpdate::Completed(Settlement {
            receipt,
            amount: metadata.get("Amount").and_then(callback_amount),
            phone_number,
            transaction_date: metadata
                .get("TransactionDate")
                .and_then(|v| parse_provider_timestamp(v, offset))
                .unwrap_or(received_at),
            result_code: code,
            result_desc,
        })
    } else {
        TerminalUpdate::Failed(Failure {
            result_code: code,
            result_desc,
        })
    };

    Ok(ClassifiedCallback {
        shape: PayloadShape::Stk,
        correlation,
        update,
    })
}

fn classify_coop(
    coop: &CoopCallback,
    offset: &FixedOffset,
    received_at: DateTime<Utc>,
) -> Result<ClassifiedCallback, PayloadError> {
    let code = result_code(&coop.result_code).ok_or_else(|| PayloadError::Invalid {
        shape: "coop",
        reason: "ResultCode is not numeric".to_string(),
    })?;
    let result_desc = coop.result_desc.clone().unwrap_or_default();
    let phone_number = normalize_phone_value(&coop.mobile_number);

    let correlation = Correlation {
        primary: coop.message_reference.clone(),
        secondary: None,
        phone_number: phone_number.clone(),
    };

    let update = if code == 0 {
        let receipt = coop
            .receipt_number
            .clone()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| coop.message_reference.clone());

        TerminalUpdate::Completed(Settlement {
            receipt,
            amount: callback_amount(&coop.amount),
            phone_number,
            transaction_date: parse_provider_timestamp(&coop.transaction_date, offset).unwrap_or(received_at),
            result_code: code,
            result_desc,
        })
    } else {
        TerminalUpdate::Failed(Failure {
            result_code: code,
            result_desc,
        })
    };

    Ok(ClassifiedCallback {
        shape: PayloadShape::Coop,
        correlation,
        update,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn eat() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn success_payload() -> Value {
        json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_001",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            { "Name": "PhoneNumber", "Value": 254712345678u64 },
                            { "Name": "TransactionDate", "Value": 20250101120000u64 },
                            { "Name": "Balance" },
                            { "Name": "MpesaReceiptNumber", "Value": "QAA1B2C3" },
                            { "Name": "Amount", "Value": 500 }
                        ]
                    }
                }
            }
        })
    }

    #[test]
    fn stk_success_reads_metadata_by_name() {
        let payload = CallbackPayload::from_value(&success_payload()).unwrap();
        let classified = classify(&payload, &eat(), Utc::now()).unwrap();

        assert_eq!(classified.shape, PayloadShape::Stk);
        assert_eq!(classified.correlation.primary, "ws_001");
        assert_eq!(classified.correlation.secondary.as_deref(), Some("29115-34620561-1"));
        assert_eq!(classified.correlation.phone_number.as_deref(), Some("254712345678"));

        match classified.update {
            TerminalUpdate::Completed(s) => {
                assert_eq!(s.receipt, "QAA1B2C3");
                assert_eq!(s.amount, Some(dec!(500)));
                assert_eq!(s.transaction_date, Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap());
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn stk_failure_carries_code_and_description() {
        let payload = json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "m-1",
                "CheckoutRequestID": "ws_002",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }}
        });
        let payload = CallbackPayload::from_value(&payload).unwrap();
        let classified = classify(&payload, &eat(), Utc::now()).unwrap();

        assert_eq!(
            classified.update,
            TerminalUpdate::Failed(Failure {
                result_code: 1032,
                result_desc: "Request cancelled by user".into()
            })
        );
        assert_eq!(classified.correlation.phone_number, None);
    }

    #[test]
    fn stk_success_without_receipt_is_invalid() {
        let payload = json!({
            "Body": { "stkCallback": {
                "CheckoutRequestID": "ws_003",
                "ResultCode": 0,
                "ResultDesc": "ok",
                "CallbackMetadata": { "Item": [ { "Name": "Amount", "Value": 10 } ] }
            }}
        });
        let payload = CallbackPayload::from_value(&payload).unwrap();
        assert!(matches!(
            classify(&payload, &eat(), Utc::now()),
            Err(PayloadError::Invalid { shape: "stk", .. })
        ));
    }

    #[test]
    fn coop_shape_is_resolved_from_message_reference() {
        let payload = json!({
            "MessageReference": "CO123",
            "ResultCode": "0",
            "ResultDesc": "Success",
            "Amount": "1,200",
            "MobileNumber": "0712345678",
            "TransactionDate": "2025-01-01T12:00:00+03:00"
        });
        let payload = CallbackPayload::from_value(&payload).unwrap();
        let classified = classify(&payload, &eat(), Utc::now()).unwrap();

        assert_eq!(classified.shape, PayloadShape::Coop);
        assert_eq!(classified.correlation.primary, "CO123");
        assert_eq!(classified.correlation.secondary, None);
        match classified.update {
            TerminalUpdate::Completed(s) => {
                assert_eq!(s.receipt, "CO123");
                assert_eq!(s.amount, Some(dec!(1200)));
                assert_eq!(s.phone_number.as_deref(), Some("254712345678"));
                assert_eq!(s.transaction_date, Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap());
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn unknown_payloads_are_unrecognised() {
        assert_eq!(
            CallbackPayload::from_value(&json!({"hello": "world"})).unwrap_err(),
            PayloadError::Unrecognised
        );
    }

    #[test]
    fn unparseable_settlement_time_falls_back_to_receipt_time() {
        let received_at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_provider_timestamp(&json!("yesterday"), &eat()), None);

        let payload = json!({
            "MessageReference": "CO9",
            "ResultCode": 0,
            "ReceiptNumber": "RCPT9",
            "TransactionDate": "yesterday"
        });
        let payload = CallbackPayload::from_value(&payload).unwrap();
        match classify(&payload, &eat(), received_at).unwrap().update {
            TerminalUpdate::Completed(s) => assert_eq!(s.transaction_date, received_at),
            other => panic!("expected completion, got {:?}", other),
        }
    }
}
