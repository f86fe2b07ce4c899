use axum::{routing::get, Router};

use crate::handlers::payment_handlers;
use crate::state::AppState;

pub fn transaction_routes() -> Router<AppState> {
    Router::new().route("/status", get(payment_handlers::transaction_status))
}
