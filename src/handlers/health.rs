// handlers/health.rs
use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn root_handler() -> &'static str {
    "🛒 Checkout API"
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn api_health_check(State(state): State<AppState>) -> Json<Value> {
    let db_status = match state.stores.transactions.ping().await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };

    Json(json!({
        "status": "healthy",
        "database": db_status,
        "payments": state.provider_name(),
        "notifications_in_flight": state.notifications.in_flight(),
        "config": state.config_info.as_ref(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
