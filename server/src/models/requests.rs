use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{Attendee, OrderDetails};
use crate::models::payment::PaymentMethod;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRequest {
    pub ticket_type_id: Uuid,
    pub quantity: u32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub event_id: Uuid,
    pub email: String,
    pub attendee_data: Attendee,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    pub ticket_details: Vec<TicketRequest>,
    #[serde(default)]
    pub method: PaymentMethod,
}

/// Everything the client needs to open the processor's hosted checkout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentResponse {
    pub reference: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub processor_public_key: String,
    pub email: String,
    pub metadata: OrderDetails,
}
