// services/mpesa_service.rs
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

use super::payment_provider::{json_str, PaymentProvider, PaymentRequest, ProviderAcceptance, ProviderError};
use crate::config::MpesaConfig;

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: i64,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

/// Daraja STK push client. Holds the OAuth token for its lifetime.
#[derive(Debug, Clone)]
pub struct MpesaService {
    config: MpesaConfig,
    client: Client,
    merchant_offset: FixedOffset,
    cached_token: Arc<RwLock<Option<(String, DateTime<Utc>)>>>,
}

impl MpesaService {
    pub fn new(config: MpesaConfig, merchant_offset: FixedOffset) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Communication(format!("Failed to create HTTP client: {}", e)))?;

        Ok(MpesaService {
            config,
            client,
            merchant_offset,
            cached_token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn short_code(&self) -> &str {
        &self.config.short_code
    }

    fn generate_password(&self, timestamp: &str) -> String {
        let password_string = format!("{}{}{}", self.config.short_code, self.config.passkey, timestamp);
        base64.encode(password_string)
    }

    /// Provider timestamps are in the merchant's local time.
    fn timestamp(&self) -> String {
        Utc::now()
            .with_timezone(&self.merchant_offset)
            .format("%Y%m%d%H%M%S")
            .to_string()
    }

    pub async fn get_access_token(&self) -> Result<String, ProviderError> {
        {
            let cached = self.cached_token.read().await;
            if let Some((token, expiry)) = cached.as_ref() {
                if *expiry > Utc::now() + chrono::Duration::minutes(5) {
                    return Ok(token.clone());
                }
            }
        }

        info!("Requesting new M-Pesa access token");
        let auth_string = format!("{}:{}", self.config.consumer_key, self.config.consumer_secret);
        let encoded_auth = base64.encode(auth_string);

        let (auth_url, _) = self.config.get_mpesa_urls();

        let response = self
            .client
            .get(&auth_url)
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Failed to get M-Pesa access token: {} - {}", status, body);
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ProviderError::Auth(format!("token endpoint returned {}", status))
                }
                _ => ProviderError::Communication(format!("token endpoint returned {}", status)),
            });
        }

        let auth_response: AuthResponse = response.json().await?;

        let lifetime_secs = auth_response
            .expires_in
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(3600);

        {
            let expiry_time = Utc::now() + chrono::Duration::seconds(lifetime_secs);
            let mut cached = self.cached_token.write().await;
            *cached = Some((auth_response.access_token.clone(), expiry_time));
        }

        info!("✅ M-Pesa access token obtained");
        Ok(auth_response.access_token)
    }

    pub async fn initiate_stk_push(&self, request: &PaymentRequest) -> Result<ProviderAcceptance, ProviderError> {
        info!(phone = %request.phone_number, amount = request.amount, "STK push requested");

        let access_token = self.get_access_token().await?;
        let timestamp = self.timestamp();
        let password = self.generate_password(&timestamp);

        let (_, stk_url) = self.config.get_mpesa_urls();

        let stk_request = StkPushRequest {
            business_short_code: self.config.short_code.clone(),
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount: request.amount,
            party_a: request.phone_number.clone(),
            party_b: self.config.short_code.clone(),
            phone_number: request.phone_number.clone(),
            callback_url: self.config.callback_url.clone(),
            account_reference: request.account_reference.clone(),
            transaction_desc: request.description.clone(),
        };

        let response = self
            .client
            .post(&stk_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&stk_request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let raw = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));

        let acceptance = read_stk_response(status, raw)?;

        info!(
            checkout_request_id = %acceptance.checkout_request_id,
            merchant_request_id = ?acceptance.merchant_request_id,
            "✅ STK push accepted"
        );
        Ok(acceptance)
    }
}

/// Daraja signals acceptance with `ResponseCode` "0"; anything else is a rejection even on HTTP 200.
fn read_stk_response(status: StatusCode, raw: serde_json::Value) -> Result<ProviderAcceptance, ProviderError> {
    if !status.is_success() {
        error!("❌ STK push failed: {} - {}", status, raw);
        return Err(ProviderError::Rejected {
            code: json_str(&raw, "errorCode").unwrap_or_else(|| status.as_u16().to_string()),
            description: json_str(&raw, "errorMessage").unwrap_or_else(|| status.to_string()),
        });
    }

    let response_code = json_str(&raw, "ResponseCode")
        .ok_or_else(|| ProviderError::MalformedResponse("missing ResponseCode".to_string()))?;
    if response_code != "0" {
        error!("❌ STK push rejected: {} - {}", response_code, raw);
        return Err(ProviderError::Rejected {
            description: json_str(&raw, "ResponseDescription")
                .or_else(|| json_str(&raw, "CustomerMessage"))
                .unwrap_or_else(|| format!("response code {}", response_code)),
            code: response_code,
        });
    }

    let checkout_request_id = json_str(&raw, "CheckoutRequestID")
        .ok_or_else(|| ProviderError::MalformedResponse("missing CheckoutRequestID".to_string()))?;

    Ok(ProviderAcceptance {
        checkout_request_id,
        merchant_request_id: json_str(&raw, "MerchantRequestID"),
        response_code,
        response_description: json_str(&raw, "ResponseDescription"),
        raw,
    })
}

#[async_trait]
impl PaymentProvider for MpesaService {
    fn name(&self) -> &'static str {
        "mpesa"
    }

    async fn request_payment(&self, request: &PaymentRequest) -> Result<ProviderAcceptance, ProviderError> {
        self.initiate_stk_push(request).await
    }
}
