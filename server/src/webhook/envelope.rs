//! Typed decoding of the processor's webhook body.
//!
//! Decoding is two-step: the `{event, data}` envelope first, then `data` against
//! the shape for that event. Known events with a malformed `data` are rejected
//! outright; nothing is partially filled in.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::WebhookError;
use crate::models::OrderDetails;
use crate::services::ChargeConfirmation;

pub const CHARGE_SUCCESS: &str = "charge.success";
pub const CHARGE_FAILED: &str = "charge.failed";
pub const REFUND_PROCESSED: &str = "refund.processed";

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Customer {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChargeData {
    pub reference: String,
    /// Minor units (kobo).
    pub amount: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub gateway_response: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "optional_order")]
    pub metadata: Option<OrderDetails>,
    #[serde(default)]
    pub customer: Option<Customer>,
}

impl ChargeData {
    pub fn failure_reason(&self) -> &str {
        [self.gateway_response.as_deref(), self.message.as_deref()]
            .into_iter()
            .flatten()
            .find(|reason| !reason.trim().is_empty())
            .unwrap_or("Payment failed")
    }

    pub fn into_confirmation(self) -> ChargeConfirmation {
        ChargeConfirmation {
            reference: self.reference,
            amount_minor_units: self.amount,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RefundData {
    pub transaction_reference: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    ChargeSuccess(ChargeData),
    ChargeFailed(ChargeData),
    RefundProcessed(RefundData),
    Ignored { event: String },
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        let raw: RawEnvelope = serde_json::from_slice(body)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        let event = match raw.event.as_str() {
            CHARGE_SUCCESS => WebhookEvent::ChargeSuccess(decode(&raw.event, raw.data)?),
            CHARGE_FAILED => WebhookEvent::ChargeFailed(decode(&raw.event, raw.data)?),
            REFUND_PROCESSED => WebhookEvent::RefundProcessed(decode(&raw.event, raw.data)?),
            _ => WebhookEvent::Ignored { event: raw.event },
        };
        Ok(event)
    }

    pub fn kind(&self) -> &str {
        match self {
            WebhookEvent::ChargeSuccess(_) => CHARGE_SUCCESS,
            WebhookEvent::ChargeFailed(_) => CHARGE_FAILED,
            WebhookEvent::RefundProcessed(_) => REFUND_PROCESSED,
            WebhookEvent::Ignored { event } => event,
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            WebhookEvent::ChargeSuccess(data) | WebhookEvent::ChargeFailed(data) => {
                Some(&data.reference)
            }
            WebhookEvent::RefundProcessed(data) => Some(&data.transaction_reference),
            WebhookEvent::Ignored { .. } => None,
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(event: &str, data: Value) -> Result<T, WebhookError> {
    serde_json::from_value(data)
        .map_err(|e| WebhookError::MalformedPayload(format!("{}: {}", event, e)))
}

// The processor sends an empty string when no metadata was attached.
fn optional_order<'de, D>(deserializer: D) -> Result<Option<OrderDetails>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        other => OrderDetails::deserialize(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_charge_success_with_metadata() {
        let event_id = uuid::Uuid::new_v4();
        let ticket_type_id = uuid::Uuid::new_v4();
        let parsed = WebhookEvent::parse(&body(json!({
            "event": "charge.success",
            "data": {
                "id": 302961,
                "reference": "agora_ref",
                "amount": 400000,
                "status": "success",
                "currency": "NGN",
                "channel": "card",
                "customer": {"email": "buyer@example.com"},
                "metadata": {
                    "eventId": event_id,
                    "attendeeData": {"fullName": "Ada Obi", "email": "ada@example.com", "phone": ""},
                    "ticketDetails": [
                        {"ticketTypeId": ticket_type_id, "ticketTypeName": "Regular", "quantity": 2, "price": 2000}
                    ]
                }
            }
        })))
        .unwrap();

        let WebhookEvent::ChargeSuccess(data) = parsed else {
            panic!("expected charge.success");
        };
        assert_eq!(data.reference, "agora_ref");
        assert_eq!(data.amount, 400_000);
        let order = data.metadata.unwrap();
        assert_eq!(order.event_id, event_id);
        assert_eq!(order.ticket_details[0].quantity, 2);
    }

    #[test]
    fn test_empty_string_metadata_is_absent() {
        let parsed = WebhookEvent::parse(&body(json!({
            "event": "charge.success",
            "data": {"reference": "r", "amount": 100, "metadata": ""}
        })))
        .unwrap();
        assert!(matches!(parsed, WebhookEvent::ChargeSuccess(ChargeData { metadata: None, .. })));
    }

    #[test]
    fn test_known_event_with_bad_shape_fails_closed() {
        let cases = [
            json!({"event": "charge.success", "data": {"amount": 100}}),
            json!({"event": "charge.success", "data": {"reference": "r", "amount": "100"}}),
            json!({"event": "charge.success", "data": {"reference": "r", "amount": 1, "metadata": {"eventId": "nope"}}}),
            json!({"event": "refund.processed", "data": {}}),
            json!({"data": {}}),
        ];
        for case in cases {
            assert!(
                matches!(WebhookEvent::parse(&body(case.clone())), Err(WebhookError::MalformedPayload(_))),
                "{case}"
            );
        }
        assert!(WebhookEvent::parse(b"not json").is_err());
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let parsed = WebhookEvent::parse(&body(json!({
            "event": "transfer.success",
            "data": {"whatever": true}
        })))
        .unwrap();
        assert_eq!(parsed.kind(), "transfer.success");
        assert_eq!(parsed.reference(), None);
    }

    #[test]
    fn test_failure_reason_prefers_gateway_response() {
        let parsed = WebhookEvent::parse(&body(json!({
            "event": "charge.failed",
            "data": {"reference": "r", "amount": 100, "gateway_response": "Declined", "message": ""}
        })))
        .unwrap();
        let WebhookEvent::ChargeFailed(data) = parsed else {
            panic!("expected charge.failed");
        };
        assert_eq!(data.failure_reason(), "Declined");

        let bare = ChargeData {
            gateway_response: None,
            message: Some("  ".into()),
            ..data
        };
        assert_eq!(bare.failure_reason(), "Payment failed");
    }
}
