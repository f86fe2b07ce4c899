// handlers/ipn_handlers.rs
use axum::{body::Bytes, Json};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::info;

pub fn payload_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Bank credit notifications are recorded in the log only.
pub async fn bank_credit(body: Bytes) -> Json<Value> {
    info!(
        sha256 = %payload_digest(&body),
        payload = %String::from_utf8_lossy(&body),
        "🏦 Bank credit IPN received"
    );

    Json(json!({ "received": true }))
}
