use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::models::TicketType;
use crate::store::{EventStore, Reservation};
use crate::utils::error::AppError;

/// Per-ticket-type capacity accounting. Reservations are delegated to the
/// store's conditional update; this type never compares and writes itself.
#[derive(Clone)]
pub struct InventoryLedger {
    events: Arc<dyn EventStore>,
}

impl InventoryLedger {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    pub async fn ticket_type(&self, id: Uuid) -> Result<Option<TicketType>, AppError> {
        self.events.get_ticket_type(id).await
    }

    /// Reserving zero units succeeds without touching the row.
    pub async fn try_reserve(&self, id: Uuid, quantity: u32) -> Result<Reservation, AppError> {
        if quantity == 0 {
            let ticket_type = self
                .events
                .get_ticket_type(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Ticket type '{}' was not found", id)))?;
            return Ok(Reservation::Reserved {
                sold: ticket_type.sold_quantity,
            });
        }

        let reservation = self.events.try_reserve(id, quantity).await?;
        match reservation {
            Reservation::Reserved { sold } => {
                info!(ticket_type_id = %id, quantity, sold, "Inventory reserved");
            }
            Reservation::Insufficient { available } => {
                warn!(
                    ticket_type_id = %id,
                    requested = quantity,
                    available,
                    "Inventory reservation refused"
                );
            }
        }
        Ok(reservation)
    }

    pub async fn release(&self, id: Uuid, quantity: u32) -> Result<(), AppError> {
        if quantity == 0 {
            return Ok(());
        }
        self.events.release(id, quantity).await?;
        warn!(ticket_type_id = %id, quantity, "Released unminted reservation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_zero_quantity_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let event = store.seed_event("Tech Summit").unwrap();
        let ticket_type = store
            .seed_ticket_type(event.id, "Early Bird", Decimal::from(500), 1)
            .unwrap();
        let ledger = InventoryLedger::new(store.clone());

        let reservation = ledger.try_reserve(ticket_type.id, 0).await.unwrap();
        assert_eq!(reservation, Reservation::Reserved { sold: 0 });
        assert_eq!(store.sold_quantity(ticket_type.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_oversell() {
        let store = Arc::new(MemoryStore::new());
        let event = store.seed_event("Stadium Show").unwrap();
        let capacity = 25;
        let ticket_type = store
            .seed_ticket_type(event.id, "Regular", Decimal::from(1500), capacity)
            .unwrap();
        let ledger = InventoryLedger::new(store.clone());

        let handles: Vec<_> = (0..40u32)
            .map(|i| {
                let ledger = ledger.clone();
                let quantity = i % 3 + 1;
                tokio::spawn(async move {
                    let outcome = ledger.try_reserve(ticket_type.id, quantity).await;
                    (quantity, outcome)
                })
            })
            .collect();

        let mut granted = 0i32;
        for handle in handles {
            let (quantity, outcome) = handle.await.unwrap();
            if outcome.unwrap().is_reserved() {
                granted += quantity as i32;
            }
        }

        let sold = store.sold_quantity(ticket_type.id).unwrap();
        assert!(sold <= capacity);
        assert_eq!(granted, sold);
    }

    #[tokio::test]
    async fn test_release_zero_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let ledger = InventoryLedger::new(store);
        ledger.release(Uuid::new_v4(), 0).await.unwrap();
    }
}
