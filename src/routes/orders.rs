use axum::{routing::post, Router};

use crate::handlers::order_handlers;
use crate::state::AppState;

pub fn order_routes() -> Router<AppState> {
    Router::new().route("/", post(order_handlers::create_order))
}
