use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{health_check, initiate_payment, payment_webhook, test_webhook};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let security = create_security_headers_layer(state.config.production);
    let cors = create_cors_layer(&state.config.cors_allowed_origins);

    let payments = Router::new()
        .route("/initiate", post(initiate_payment))
        .route("/webhook", post(payment_webhook))
        .route("/webhook/test", get(test_webhook));

    Router::new()
        .route("/health", get(health_check))
        .nest("/payments", payments)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(security)
        .layer(cors)
}
