use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::order::Attendee;

const QR_PREFIX: &str = "AGORA-TICKET";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub total_quantity: i32,
    pub sold_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketType {
    pub fn available(&self) -> i64 {
        i64::from(self.total_quantity) - i64::from(self.sold_quantity)
    }

    /// Advisory only: the answer can be stale by the time it is acted on.
    pub fn has_room_for(&self, quantity: u32) -> bool {
        i64::from(quantity) <= self.available()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub ticket_type_id: Uuid,
    pub user_id: Uuid,
    pub payment_reference: String,
    pub attendee_full_name: String,
    pub attendee_email: String,
    pub attendee_phone: String,
    pub qr_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// QR payload binds the ticket to its event and owner. Needs the stored id,
    /// so it is stamped after the row exists.
    pub fn qr_payload(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            QR_PREFIX, self.id, self.event_id, self.user_id
        )
    }
}

/// One paid unit, before it has a row.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub event_id: Uuid,
    pub ticket_type_id: Uuid,
    pub user_id: Uuid,
    pub payment_reference: String,
    pub attendee: Attendee,
}

impl NewTicket {
    pub fn into_ticket(self, now: DateTime<Utc>) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            event_id: self.event_id,
            ticket_type_id: self.ticket_type_id,
            user_id: self.user_id,
            payment_reference: self.payment_reference,
            attendee_full_name: self.attendee.full_name,
            attendee_email: self.attendee.email,
            attendee_phone: self.attendee.phone,
            qr_code: None,
            created_at: now,
            updated_at: now,
        }
    }
}
