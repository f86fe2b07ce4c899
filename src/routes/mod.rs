pub mod ipn;
pub mod orders;
pub mod payments;
pub mod transactions;

use axum::{http::Method, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::health;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/", get(health::root_handler))
        .route("/health", get(health::health_check))
        .route("/api/health", get(health::api_health_check))
        .nest("/payments", payments::payment_routes())
        .nest("/transactions", transactions::transaction_routes())
        .nest("/orders", orders::order_routes())
        .nest("/ipn", ipn::ipn_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
