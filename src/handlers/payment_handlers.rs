// handlers/payment_handlers.rs
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::middleware::auth::OptionalCaller;
use crate::services::payment_initiator::InitiationResult;
use crate::services::status_service::get_status;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    #[validate(required(message = "Phone number is required"), length(min = 1, message = "Phone number is required"))]
    pub phone_number: Option<String>,

    #[validate(required(message = "Amount is required"))]
    pub amount: Option<Value>,

    pub account_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    #[serde(alias = "checkoutRequestId", alias = "checkout_request_id")]
    pub correlation_id: Option<String>,
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    OptionalCaller(caller): OptionalCaller,
    payload: std::result::Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload?;
    request.validate()?;

    let initiator = state.initiator.as_ref().ok_or_else(|| {
        warn!("Payment requested but no provider is configured");
        AppError::ProviderUnavailable
    })?;

    let (Some(phone_number), Some(amount)) = (request.phone_number.as_deref(), request.amount.as_ref()) else {
        return Err(AppError::invalid_data("Phone number and amount are required"));
    };

    info!(phone = %phone_number, caller = ?caller, "Received payment request");

    let result = initiator
        .initiate(phone_number, amount, request.account_reference.as_deref(), caller)
        .await?;

    Ok((StatusCode::OK, Json(initiation_body(result))))
}

/// Provider payload echoed back with our correlation fields on top.
fn initiation_body(result: InitiationResult) -> Value {
    let mut body = match result.acceptance.raw {
        Value::Object(map) => Value::Object(map),
        other => json!({ "providerResponse": other }),
    };

    if let Value::Object(map) = &mut body {
        map.insert("success".into(), json!(true));
        map.insert("provider".into(), json!(result.provider));
        map.insert("correlationId".into(), json!(result.acceptance.checkout_request_id));
        map.insert("merchantRequestId".into(), json!(result.acceptance.merchant_request_id));
        map.insert("phoneNumber".into(), json!(result.phone_number));
        map.insert("amount".into(), json!(result.amount));
    }
    body
}

/// Provider webhook. Always acknowledges, whatever happened internally.
pub async fn payment_callback(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => {
            let outcome = state.reconciler.reconcile(&payload).await;
            info!(outcome = ?outcome, "Callback processed");
        }
        Err(e) => {
            warn!(
                error = %e,
                body = %String::from_utf8_lossy(&body),
                "Callback body is not valid JSON, acknowledging"
            );
        }
    }

    Json(json!({
        "ResultCode": 0,
        "ResultDesc": "Success"
    }))
}

pub async fn transaction_status(
    State(state): State<AppState>,
    query: std::result::Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<Value>> {
    let Query(query) = query?;

    let correlation_id = query
        .correlation_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::invalid_data("correlationId is required"))?;

    let status = get_status(state.stores.transactions.as_ref(), correlation_id).await?;

    let mut body = serde_json::to_value(&status).unwrap_or_else(|_| json!({ "status": status.status }));
    if let Value::Object(map) = &mut body {
        map.insert("success".into(), json!(true));
        map.insert("correlationId".into(), json!(correlation_id));
    }
    Ok(Json(body))
}
