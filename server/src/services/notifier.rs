use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::Ticket;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound attendee/host messaging. Failures never affect issued tickets.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_attendee(&self, ticket: &Ticket) -> Result<(), NotifyError>;

    async fn notify_host(&self, ticket: &Ticket) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_attendee(&self, ticket: &Ticket) -> Result<(), NotifyError> {
        info!(
            ticket_id = %ticket.id,
            to = %ticket.attendee_email,
            event_id = %ticket.event_id,
            "Ticket confirmation queued"
        );
        Ok(())
    }

    async fn notify_host(&self, ticket: &Ticket) -> Result<(), NotifyError> {
        info!(
            ticket_id = %ticket.id,
            event_id = %ticket.event_id,
            "Host sale notification queued"
        );
        Ok(())
    }
}

/// Sends both notifications for a ticket, each under `timeout`. Returns how
/// many of the two were delivered; errors are logged and dropped.
pub async fn notify_best_effort(notifier: &dyn Notifier, ticket: &Ticket, timeout: Duration) -> usize {
    let attendee = flatten(tokio::time::timeout(timeout, notifier.notify_attendee(ticket)).await, timeout);
    let host = flatten(tokio::time::timeout(timeout, notifier.notify_host(ticket)).await, timeout);

    let mut delivered = 0;
    for (audience, outcome) in [("attendee", attendee), ("host", host)] {
        match outcome {
            Ok(()) => delivered += 1,
            Err(e) => warn!(
                ticket_id = %ticket.id,
                reference = %ticket.payment_reference,
                audience,
                error = %e,
                "Notification failed; ticket remains issued"
            ),
        }
    }
    delivered
}

fn flatten(
    outcome: Result<Result<(), NotifyError>, tokio::time::error::Elapsed>,
    timeout: Duration,
) -> Result<(), NotifyError> {
    outcome.unwrap_or(Err(NotifyError::Timeout(timeout)))
}
