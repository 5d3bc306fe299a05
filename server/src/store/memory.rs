//! In-process store with the same atomicity as the Postgres one: every
//! conditional update runs under a single lock, never across an await.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Event, FulfillmentLine, LineSettlement, LineStatus, NewFulfillmentLine, NewPayment, NewTicket,
    PaymentRecord, StatusChange, Ticket, TicketType,
};
use crate::store::{
    quantity_as_i32, EventStore, FulfillmentJournal, PaymentStore, Reservation, TicketStore,
};
use crate::utils::error::AppError;

#[derive(Default)]
struct Inner {
    events: HashMap<Uuid, Event>,
    ticket_types: HashMap<Uuid, TicketType>,
    payments: HashMap<String, PaymentRecord>,
    tickets: Vec<Ticket>,
    lines: Vec<FulfillmentLine>,
    ticket_creates_left: Option<usize>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::InternalServerError("memory store lock poisoned".to_string()))
    }

    pub fn seed_event(&self, title: &str) -> Result<Event, AppError> {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            host_id: Uuid::new_v4(),
            title: title.to_string(),
            location: "Lagos".to_string(),
            start_time: now,
            created_at: now,
            updated_at: now,
        };
        self.state()?.events.insert(event.id, event.clone());
        Ok(event)
    }

    pub fn seed_ticket_type(
        &self,
        event_id: Uuid,
        name: &str,
        price: Decimal,
        total_quantity: i32,
    ) -> Result<TicketType, AppError> {
        let now = Utc::now();
        let ticket_type = TicketType {
            id: Uuid::new_v4(),
            event_id,
            name: name.to_string(),
            description: None,
            price,
            total_quantity,
            sold_quantity: 0,
            created_at: now,
            updated_at: now,
        };
        self.state()?
            .ticket_types
            .insert(ticket_type.id, ticket_type.clone());
        Ok(ticket_type)
    }

    /// Stores a payment row as-is, for records written before orders were
    /// persisted alongside them.
    pub fn insert_payment(&self, record: PaymentRecord) -> Result<(), AppError> {
        self.state()?
            .payments
            .insert(record.reference.clone(), record);
        Ok(())
    }

    /// Makes ticket creation fail once `count` more tickets have been created.
    pub fn fail_ticket_creates_after(&self, count: usize) -> Result<(), AppError> {
        self.state()?.ticket_creates_left = Some(count);
        Ok(())
    }

    pub fn sold_quantity(&self, ticket_type_id: Uuid) -> Result<i32, AppError> {
        self.state()?
            .ticket_types
            .get(&ticket_type_id)
            .map(|ticket_type| ticket_type.sold_quantity)
            .ok_or_else(|| AppError::NotFound(format!("Ticket type '{}'", ticket_type_id)))
    }

    pub fn all_tickets(&self) -> Result<Vec<Ticket>, AppError> {
        Ok(self.state()?.tickets.clone())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        Ok(self.state()?.events.get(&id).cloned())
    }

    async fn get_ticket_type(&self, id: Uuid) -> Result<Option<TicketType>, AppError> {
        Ok(self.state()?.ticket_types.get(&id).cloned())
    }

    async fn try_reserve(&self, id: Uuid, quantity: u32) -> Result<Reservation, AppError> {
        let quantity = quantity_as_i32(quantity)?;
        let mut state = self.state()?;
        let ticket_type = state
            .ticket_types
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Ticket type '{}' was not found", id)))?;

        let sold = match ticket_type.sold_quantity.checked_add(quantity) {
            Some(sold) if sold <= ticket_type.total_quantity => sold,
            _ => {
                return Ok(Reservation::Insufficient {
                    available: ticket_type.total_quantity - ticket_type.sold_quantity,
                })
            }
        };

        ticket_type.sold_quantity = sold;
        ticket_type.updated_at = Utc::now();
        Ok(Reservation::Reserved {
            sold: ticket_type.sold_quantity,
        })
    }

    async fn release(&self, id: Uuid, quantity: u32) -> Result<(), AppError> {
        let quantity = quantity_as_i32(quantity)?;
        let mut state = self.state()?;
        match state.ticket_types.get_mut(&id) {
            Some(ticket_type) if ticket_type.sold_quantity >= quantity => {
                ticket_type.sold_quantity -= quantity;
                ticket_type.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(AppError::InternalServerError(format!(
                "Could not release {} units of ticket type {}",
                quantity, id
            ))),
        }
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn create(&self, payment: NewPayment) -> Result<PaymentRecord, AppError> {
        let mut state = self.state()?;
        if state.payments.contains_key(&payment.reference) {
            return Err(AppError::Conflict(format!(
                "Payment reference '{}' already exists",
                payment.reference
            )));
        }
        let record = payment.into_record(Utc::now());
        state
            .payments
            .insert(record.reference.clone(), record.clone());
        Ok(record)
    }

    async fn get_by_reference(&self, reference: &str) -> Result<Option<PaymentRecord>, AppError> {
        Ok(self.state()?.payments.get(reference).cloned())
    }

    async fn update_status(
        &self,
        reference: &str,
        change: &StatusChange,
    ) -> Result<Option<PaymentRecord>, AppError> {
        if !change.from.can_transition_to(change.to) {
            return Err(AppError::Conflict(format!(
                "Payment '{}' cannot move from {} to {}",
                reference, change.from, change.to
            )));
        }

        let mut state = self.state()?;
        match state.payments.get_mut(reference) {
            Some(record) if record.status == change.from => {
                record.apply(change).map_err(|e| AppError::Conflict(e.to_string()))?;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn create(&self, ticket: NewTicket) -> Result<Ticket, AppError> {
        let mut state = self.state()?;
        if let Some(left) = state.ticket_creates_left.as_mut() {
            if *left == 0 {
                return Err(AppError::InternalServerError(
                    "ticket insert rejected".to_string(),
                ));
            }
            *left -= 1;
        }
        let ticket = ticket.into_ticket(Utc::now());
        state.tickets.push(ticket.clone());
        Ok(ticket)
    }

    async fn update_qr(&self, id: Uuid, qr_code: &str) -> Result<Ticket, AppError> {
        let mut state = self.state()?;
        let ticket = state
            .tickets
            .iter_mut()
            .find(|ticket| ticket.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Ticket '{}' was not found", id)))?;
        ticket.qr_code = Some(qr_code.to_string());
        ticket.updated_at = Utc::now();
        Ok(ticket.clone())
    }

    async fn list_by_payment(&self, reference: &str) -> Result<Vec<Ticket>, AppError> {
        Ok(self
            .state()?
            .tickets
            .iter()
            .filter(|ticket| ticket.payment_reference == reference)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FulfillmentJournal for MemoryStore {
    async fn open_line(&self, line: NewFulfillmentLine) -> Result<FulfillmentLine, AppError> {
        let mut state = self.state()?;
        let existing = state.lines.iter().find(|existing| {
            existing.payment_reference == line.payment_reference
                && existing.line_index == line.line_index
        });
        if let Some(existing) = existing {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let line = FulfillmentLine {
            id: Uuid::new_v4(),
            payment_reference: line.payment_reference,
            line_index: line.line_index,
            ticket_type_id: line.ticket_type_id,
            requested: line.requested,
            reserved: 0,
            minted: 0,
            status: LineStatus::Intent,
            detail: None,
            created_at: now,
            updated_at: now,
        };
        state.lines.push(line.clone());
        Ok(line)
    }

    async fn settle_line(&self, id: Uuid, settlement: &LineSettlement) -> Result<(), AppError> {
        let mut state = self.state()?;
        let line = state
            .lines
            .iter_mut()
            .find(|line| line.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Fulfillment line '{}' was not found", id)))?;
        line.status = settlement.status;
        line.reserved = settlement.reserved;
        line.minted = settlement.minted;
        line.detail = settlement.detail.clone();
        line.updated_at = Utc::now();
        Ok(())
    }

    async fn lines_for(&self, reference: &str) -> Result<Vec<FulfillmentLine>, AppError> {
        let mut lines: Vec<FulfillmentLine> = self
            .state()?
            .lines
            .iter()
            .filter(|line| line.payment_reference == reference)
            .cloned()
            .collect();
        lines.sort_by_key(|line| line.line_index);
        Ok(lines)
    }
}
