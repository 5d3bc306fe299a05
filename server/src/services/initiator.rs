use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::models::requests::{InitiatePaymentRequest, InitiatePaymentResponse, TicketRequest};
use crate::models::{LineItem, NewPayment, OrderDetails};
use crate::services::inventory::InventoryLedger;
use crate::store::{EventStore, PaymentStore};
use crate::utils::error::AppError;

const REFERENCE_PREFIX: &str = "agora";

/// Processor-facing settings echoed back to the client at checkout.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub public_key: String,
}

/// Creates the pending payment that a later webhook completes.
///
/// Availability is checked here but not held: another buyer can take the last
/// units between initiation and payment. The binding check happens when the
/// payment is fulfilled.
#[derive(Clone)]
pub struct PaymentInitiator {
    events: Arc<dyn EventStore>,
    payments: Arc<dyn PaymentStore>,
    ledger: InventoryLedger,
    settings: CheckoutSettings,
}

impl PaymentInitiator {
    pub fn new(
        events: Arc<dyn EventStore>,
        payments: Arc<dyn PaymentStore>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            ledger: InventoryLedger::new(events.clone()),
            events,
            payments,
            settings,
        }
    }

    #[tracing::instrument(name = "initiate_payment", skip_all, fields(event_id = %request.event_id, user_id = %user_id))]
    pub async fn initiate(
        &self,
        user_id: Uuid,
        request: InitiatePaymentRequest,
    ) -> Result<InitiatePaymentResponse, AppError> {
        validate_request(&request)?;

        let event = self
            .events
            .get_event(request.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        let mut line_items = Vec::with_capacity(request.ticket_details.len());
        for detail in &request.ticket_details {
            line_items.push(self.check_line(event.id, detail).await?);
        }

        let order = OrderDetails {
            event_id: event.id,
            attendee_data: request.attendee_data,
            attendees: request.attendees,
            ticket_details: line_items,
        };
        let amount = order.total();
        let amount_minor_units = to_minor_units(amount)?;
        let reference = generate_reference(event.id, user_id, Utc::now());

        let record = self
            .payments
            .create(NewPayment {
                reference,
                event_id: event.id,
                user_id,
                amount,
                currency: self.settings.currency.clone(),
                method: request.method,
                order: order.clone(),
            })
            .await?;

        info!(
            reference = %record.reference,
            amount = %record.amount,
            amount_minor_units,
            tickets = order.total_quantity(),
            "Payment pending webhook confirmation"
        );

        Ok(InitiatePaymentResponse {
            reference: record.reference,
            amount_minor_units,
            currency: record.currency,
            processor_public_key: self.settings.public_key.clone(),
            email: request.email,
            metadata: order,
        })
    }

    async fn check_line(&self, event_id: Uuid, detail: &TicketRequest) -> Result<LineItem, AppError> {
        let ticket_type = self
            .ledger
            .ticket_type(detail.ticket_type_id)
            .await?
            .filter(|ticket_type| ticket_type.event_id == event_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Ticket type '{}' not found for this event",
                    detail.ticket_type_id
                ))
            })?;

        if ticket_type.price != detail.price {
            return Err(AppError::ValidationError(format!(
                "Price for {} does not match the listed price",
                ticket_type.name
            )));
        }

        if !ticket_type.has_room_for(detail.quantity) {
            return Err(AppError::InsufficientAvailability(format!(
                "Not enough tickets available for {}",
                ticket_type.name
            )));
        }

        Ok(LineItem {
            ticket_type_id: ticket_type.id,
            ticket_type_name: ticket_type.name,
            quantity: detail.quantity,
            price: ticket_type.price,
        })
    }
}

fn validate_request(request: &InitiatePaymentRequest) -> Result<(), AppError> {
    if request.ticket_details.is_empty() {
        return Err(AppError::ValidationError(
            "At least one ticket must be requested".to_string(),
        ));
    }
    if !request.email.contains('@') {
        return Err(AppError::ValidationError("A valid email is required".to_string()));
    }
    if request.attendee_data.full_name.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Attendee name is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for detail in &request.ticket_details {
        if detail.quantity == 0 {
            return Err(AppError::ValidationError(
                "Ticket quantity must be at least 1".to_string(),
            ));
        }
        if detail.price.is_sign_negative() {
            return Err(AppError::ValidationError(
                "Ticket price cannot be negative".to_string(),
            ));
        }
        if !seen.insert(detail.ticket_type_id) {
            return Err(AppError::ValidationError(format!(
                "Ticket type '{}' is listed more than once",
                detail.ticket_type_id
            )));
        }
    }
    Ok(())
}

/// Converts a major-unit amount to the processor's minor unit (kobo, cents).
pub fn to_minor_units(amount: Decimal) -> Result<i64, AppError> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| AppError::ValidationError("Payment amount is out of range".to_string()))
}

/// Unguessable, unique per attempt. The leading parts only aid support lookups;
/// uniqueness comes from the random suffix.
pub fn generate_reference(event_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> String {
    let event = event_id.simple().to_string();
    let user = user_id.simple().to_string();
    format!(
        "{}_{}_{}_{}_{}",
        REFERENCE_PREFIX,
        &event[..8],
        &user[..8],
        now.timestamp(),
        Uuid::new_v4().simple()
    )
}
