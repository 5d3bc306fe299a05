use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::handlers::auth::AuthenticatedUser;
use crate::models::requests::InitiatePaymentRequest;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;
use crate::webhook::SIGNATURE_HEADER;

// POST /payments/initiate
pub async fn initiate_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let response = state.initiator.initiate(user.id, request).await?;
    Ok(success(response, "Payment initialized successfully"))
}

// POST /payments/webhook
//
// Runs on its own task: if the processor hangs up, fulfillment still
// finishes and the redelivery is absorbed by the idempotency check.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let gateway = state.gateway.clone();
    let ack = tokio::spawn(async move { gateway.handle(&body, signature.as_deref()).await })
        .await
        .map_err(|e| AppError::InternalServerError(format!("Webhook task failed: {}", e)))??;

    Ok(success(ack, "Webhook processed successfully"))
}

#[derive(Serialize)]
struct WebhookStatus {
    reachable: bool,
    timestamp: String,
}

// GET /payments/webhook/test
pub async fn test_webhook() -> Response {
    tracing::info!("Webhook test endpoint accessed");
    let status = WebhookStatus {
        reachable: true,
        timestamp: Utc::now().to_rfc3339(),
    };
    success(status, "Webhook endpoint is reachable")
}
