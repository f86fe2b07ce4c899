// handlers/order_handlers.rs
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::order::CreateOrderRequest;
use crate::state::AppState;

pub async fn create_order(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload?;

    let (Some(transaction_id), Some(user_id), Some(cart_items)) =
        (request.transaction_id, request.user_id, request.cart_items)
    else {
        return Err(AppError::invalid_data(
            "transactionId, userId and cartItems are required",
        ));
    };

    let transaction_id = Uuid::parse_str(transaction_id.trim())?;
    let user_id = Uuid::parse_str(user_id.trim())?;

    info!(transaction_id = %transaction_id, user_id = %user_id, items = cart_items.len(), "Creating order");

    let creation = state
        .orders
        .create_order(transaction_id, user_id, &cart_items)
        .await?;

    let (status, message) = if creation.created {
        (StatusCode::CREATED, "Order created successfully")
    } else {
        (StatusCode::OK, "Order already exists")
    };

    Ok((
        status,
        Json(json!({
            "success": true,
            "message": message,
            "order": creation.summary,
        })),
    ))
}
