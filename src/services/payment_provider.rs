// services/payment_provider.rs
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("communication failure: {0}")]
    Communication(String),

    #[error("request rejected ({code}): {description}")]
    Rejected { code: String, description: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::Communication(err.to_string())
        }
    }
}

/// Phone prompt request handed to a provider backend.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Normalised `2547XXXXXXXX` form.
    pub phone_number: String,
    /// Whole shillings.
    pub amount: i64,
    pub account_reference: String,
    pub description: String,
}

/// A provider's acceptance of a phone prompt.
#[derive(Debug, Clone)]
pub struct ProviderAcceptance {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub response_code: String,
    pub response_description: Option<String>,
    /// Provider response body, echoed back to the client.
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn request_payment(&self, request: &PaymentRequest) -> Result<ProviderAcceptance, ProviderError>;
}

/// Reads a string-ish field from a provider JSON body.
pub(crate) fn json_str(value: &serde_json::Value, key: &str) -> Option<String> {
    match value.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
