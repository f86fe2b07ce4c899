use axum::{routing::post, Router};

use crate::handlers::ipn_handlers;
use crate::state::AppState;

pub fn ipn_routes() -> Router<AppState> {
    Router::new().route("/bank-credit", post(ipn_handlers::bank_credit))
}
