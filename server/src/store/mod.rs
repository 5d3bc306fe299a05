//! Narrow storage capabilities consumed by the payment core.
//!
//! Each trait covers one kind of row so storage can be swapped independently of
//! the fulfillment logic. All shared mutable state lives behind these traits;
//! nothing is cached across requests.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Event, FulfillmentLine, LineSettlement, NewFulfillmentLine, NewPayment, NewTicket,
    PaymentRecord, StatusChange, Ticket, TicketType,
};
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Outcome of an atomic conditional increment of a ticket type's sold count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Reserved { sold: i32 },
    Insufficient { available: i32 },
}

impl Reservation {
    pub fn is_reserved(&self) -> bool {
        matches!(self, Reservation::Reserved { .. })
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, AppError>;

    async fn get_ticket_type(&self, id: Uuid) -> Result<Option<TicketType>, AppError>;

    /// Adds `quantity` to the sold count only if the result stays within the
    /// total. Must be a single atomic operation in the backing store.
    async fn try_reserve(&self, id: Uuid, quantity: u32) -> Result<Reservation, AppError>;

    /// Compensating decrement for units that were reserved but never minted.
    async fn release(&self, id: Uuid, quantity: u32) -> Result<(), AppError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Fails with `Conflict` when the reference already exists.
    async fn create(&self, payment: NewPayment) -> Result<PaymentRecord, AppError>;

    async fn get_by_reference(&self, reference: &str) -> Result<Option<PaymentRecord>, AppError>;

    /// Compare-and-swap on status. Returns `None` when the stored status is not
    /// `change.from` (or the reference does not exist).
    async fn update_status(
        &self,
        reference: &str,
        change: &StatusChange,
    ) -> Result<Option<PaymentRecord>, AppError>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn create(&self, ticket: NewTicket) -> Result<Ticket, AppError>;

    async fn update_qr(&self, id: Uuid, qr_code: &str) -> Result<Ticket, AppError>;

    async fn list_by_payment(&self, reference: &str) -> Result<Vec<Ticket>, AppError>;
}

#[async_trait]
pub trait FulfillmentJournal: Send + Sync {
    async fn open_line(&self, line: NewFulfillmentLine) -> Result<FulfillmentLine, AppError>;

    async fn settle_line(&self, id: Uuid, settlement: &LineSettlement) -> Result<(), AppError>;

    async fn lines_for(&self, reference: &str) -> Result<Vec<FulfillmentLine>, AppError>;
}

/// The set of stores the service is wired against.
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub tickets: Arc<dyn TicketStore>,
    pub journal: Arc<dyn FulfillmentJournal>,
}

impl Stores {
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            events: store.clone(),
            payments: store.clone(),
            tickets: store.clone(),
            journal: store,
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            events: store.clone(),
            payments: store.clone(),
            tickets: store.clone(),
            journal: store,
        }
    }
}

pub(crate) fn quantity_as_i32(quantity: u32) -> Result<i32, AppError> {
    i32::try_from(quantity)
        .map_err(|_| AppError::ValidationError(format!("Quantity {} is out of range", quantity)))
}
