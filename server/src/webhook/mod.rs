//! Trust boundary for processor callbacks.
//!
//! Order is fixed: authenticate the raw bytes, then decode, then mutate.
//! Nothing is parsed before the signature checks out.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::services::{FulfillmentEngine, FulfillmentOutcome, TransitionOutcome};
use crate::utils::error::AppError;

pub mod envelope;
pub mod signature;

pub use envelope::WebhookEvent;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing signature")]
    MissingSignature,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Webhook secret is not configured")]
    SecretNotConfigured,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::MissingSignature => AppError::ValidationError(err.to_string()),
            WebhookError::InvalidSignature => AppError::AuthError(err.to_string()),
            WebhookError::SecretNotConfigured => AppError::ConfigurationError(err.to_string()),
            WebhookError::MalformedPayload(_) => AppError::ValidationError(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckOutcome {
    Fulfilled,
    ShortTicketed,
    AlreadyProcessed,
    Failed,
    Refunded,
    Ignored,
}

/// What the processor is told after a delivery was accepted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub outcome: AckOutcome,
    pub tickets_issued: usize,
}

impl WebhookAck {
    fn new(event: &WebhookEvent, outcome: AckOutcome) -> Self {
        Self {
            event: event.kind().to_string(),
            reference: event.reference().map(str::to_string),
            outcome,
            tickets_issued: 0,
        }
    }
}

#[derive(Clone)]
pub struct WebhookGateway {
    secret: Option<String>,
    engine: Arc<FulfillmentEngine>,
}

impl WebhookGateway {
    pub fn new(secret: Option<String>, engine: Arc<FulfillmentEngine>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            engine,
        }
    }

    pub fn authenticate(&self, body: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or(WebhookError::MissingSignature)?;
        let secret = self
            .secret
            .as_deref()
            .ok_or(WebhookError::SecretNotConfigured)?;
        signature::verify(secret, body, signature)
    }

    #[tracing::instrument(
        name = "webhook",
        skip_all,
        fields(bytes = body.len(), event = tracing::field::Empty, reference = tracing::field::Empty)
    )]
    pub async fn handle(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookAck, AppError> {
        if let Err(e) = self.authenticate(body, signature) {
            warn!(error = %e, "Webhook rejected before parsing");
            return Err(e.into());
        }

        let event = WebhookEvent::parse(body).map_err(|e| {
            warn!(error = %e, "Signed webhook could not be decoded");
            AppError::from(e)
        })?;

        let span = tracing::Span::current();
        span.record("event", event.kind());
        if let Some(reference) = event.reference() {
            span.record("reference", reference);
        }

        match event {
            WebhookEvent::ChargeSuccess(ref data) => {
                let mut ack = WebhookAck::new(&event, AckOutcome::Fulfilled);
                match self.engine.fulfill(data.clone().into_confirmation()).await? {
                    FulfillmentOutcome::AlreadyProcessed => {
                        ack.outcome = AckOutcome::AlreadyProcessed;
                    }
                    FulfillmentOutcome::Fulfilled(report) => {
                        if !report.is_complete() {
                            ack.outcome = AckOutcome::ShortTicketed;
                        }
                        ack.tickets_issued = report.tickets.len();
                    }
                }
                Ok(ack)
            }
            WebhookEvent::ChargeFailed(ref data) => {
                let outcome = self
                    .engine
                    .fail(&data.reference, data.failure_reason())
                    .await?;
                Ok(WebhookAck::new(&event, transition_ack(outcome, AckOutcome::Failed)))
            }
            WebhookEvent::RefundProcessed(ref data) => {
                let outcome = self.engine.refund(&data.transaction_reference).await?;
                Ok(WebhookAck::new(&event, transition_ack(outcome, AckOutcome::Refunded)))
            }
            WebhookEvent::Ignored { ref event } => {
                info!(event = %event, "Ignoring unhandled webhook event");
                Ok(WebhookAck {
                    event: event.clone(),
                    reference: None,
                    outcome: AckOutcome::Ignored,
                    tickets_issued: 0,
                })
            }
        }
    }
}

fn transition_ack(outcome: TransitionOutcome, applied: AckOutcome) -> AckOutcome {
    match outcome {
        TransitionOutcome::Applied => applied,
        TransitionOutcome::AlreadyApplied => AckOutcome::AlreadyProcessed,
    }
}
