// services/coop_service.rs
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use super::payment_provider::{json_str, PaymentProvider, PaymentRequest, ProviderAcceptance, ProviderError};
use crate::config::CoopConfig;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OtherDetail {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct CoopStkRequest {
    #[serde(rename = "MessageReference")]
    pub message_reference: String,
    #[serde(rename = "CallBackUrl")]
    pub callback_url: String,
    #[serde(rename = "OperatorCode")]
    pub operator_code: String,
    #[serde(rename = "TransactionCurrency")]
    pub transaction_currency: String,
    #[serde(rename = "MobileNumber")]
    pub mobile_number: String,
    #[serde(rename = "Narration")]
    pub narration: String,
    #[serde(rename = "Amount")]
    pub amount: i64,
    #[serde(rename = "MessageDateTime")]
    pub message_date_time: String,
    #[serde(rename = "OtherDetails")]
    pub other_details: Vec<OtherDetail>,
}

/// Co-op Bank STK push client; the server-generated `MessageReference` is the correlation id.
#[derive(Debug, Clone)]
pub struct CoopService {
    config: CoopConfig,
    client: Client,
    cached_token: Arc<RwLock<Option<(String, DateTime<Utc>)>>>,
}

impl CoopService {
    pub fn new(config: CoopConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Communication(format!("Failed to create HTTP client: {}", e)))?;

        Ok(CoopService {
            config,
            client,
            cached_token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn new_message_reference() -> String {
        format!("CO{}", Uuid::new_v4().simple()).to_uppercase()
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

        let (token_url, _) = self.config.get_coop_urls();
        let encoded_auth = base64.encode(format!("{}:{}", self.config.consumer_key, self.config.consumer_secret));

        let response = self
            .client
            .post(&token_url)
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Failed to get Co-op access token: {} - {}", status, body);
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ProviderError::Auth(format!("token endpoint returned {}", status))
                }
                _ => ProviderError::Communication(format!("token endpoint returned {}", status)),
            });
        }

        let token: TokenResponse = response.json().await?;
        let expiry_time = Utc::now() + chrono::Duration::seconds(token.expires_in.unwrap_or(3600));
        *self.cached_token.write().await = Some((token.access_token.clone(), expiry_time));

        info!("✅ Co-op access token obtained");
        Ok(token.access_token)
    }

    pub async fn initiate_stk_push(&self, request: &PaymentRequest) -> Result<ProviderAcceptance, ProviderError> {
        let access_token = self.get_access_token().await?;
        let (_, stk_url) = self.config.get_coop_urls();
        let message_reference = Self::new_message_reference();

        info!(
            message_reference = %message_reference,
            phone = %request.phone_number,
            amount = request.amount,
            "Co-op STK push requested"
        );

        let body = CoopStkRequest {
            message_reference: message_reference.clone(),
            callback_url: self.config.callback_url.clone(),
            operator_code: self.config.operator_code.clone(),
            transaction_currency: "KES".to_string(),
            mobile_number: request.phone_number.clone(),
            narration: request.description.clone(),
            amount: request.amount,
            message_date_time: Utc::now().to_rfc3339(),
            other_details: vec![OtherDetail {
                name: "AccountReference".to_string(),
                value: request.account_reference.clone(),
            }],
        };

        let response = self
            .client
            .post(&stk_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let raw = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        let response_code = json_str(&raw, "ResponseCode").unwrap_or_else(|| status.as_u16().to_string());
        if !status.is_success() || response_code != "0" {
            error!("❌ Co-op STK push failed: {} - {}", status, raw);
            return Err(ProviderError::Rejected {
                code: response_code,
                description: json_str(&raw, "ResponseDescription").unwrap_or_else(|| status.to_string()),
            });
        }

        Ok(ProviderAcceptance {
            checkout_request_id: json_str(&raw, "MessageReference").unwrap_or(message_reference),
            merchant_request_id: None,
            response_code,
            response_description: json_str(&raw, "ResponseDescription"),
            raw,
        })
    }
}

#[async_trait]
impl PaymentProvider for CoopService {
    fn name(&self) -> &'static str {
        "coop"
    }

    async fn request_payment(&self, request: &PaymentRequest) -> Result<ProviderAcceptance, ProviderError> {
        self.initiate_stk_push(request).await
    }
}
