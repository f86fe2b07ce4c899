use axum::{routing::post, Router};

use crate::handlers::payment_handlers;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(payment_handlers::initiate_payment))
        .route("/callback", post(payment_handlers::payment_callback))
}
