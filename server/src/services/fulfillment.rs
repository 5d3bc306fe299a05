//! Turns a confirmed charge into tickets.
//!
//! Processing one `charge.success` goes: match the payment by reference, claim
//! it with a status compare-and-swap (`pending -> completed`), then for each
//! line item reserve inventory atomically and mint one ticket per unit, and
//! finally notify. Duplicate deliveries stop at the claim.
//!
//! The money has already been captured when this runs, so a line that cannot
//! be fulfilled is recorded and skipped instead of failing the whole payment.
//! Every line is journaled before the payment is claimed. If the journal
//! cannot be written the payment stays pending and the processor redelivers.
//! A line still marked `intent` after a claim is the trace of an interrupted
//! attempt.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    FulfillmentLine, LineItem, LineSettlement, LineStatus, NewFulfillmentLine, NewTicket, OrderDetails,
    PaymentRecord, PaymentStatus, StatusChange, Ticket,
};
use crate::services::initiator::to_minor_units;
use crate::services::inventory::InventoryLedger;
use crate::services::notifier::{notify_best_effort, Notifier};
use crate::store::{quantity_as_i32, FulfillmentJournal, PaymentStore, Reservation, Stores, TicketStore};
use crate::utils::error::AppError;

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("no payment with reference '{0}'")]
    UnmatchedReference(String),

    #[error("payment '{reference}' is {status}; cannot move it to {attempted}")]
    InvalidState {
        reference: String,
        status: PaymentStatus,
        attempted: PaymentStatus,
    },

    #[error("payment '{0}' carries no order details")]
    MissingOrder(String),

    #[error("metadata for payment '{0}' does not match the stored order")]
    MetadataMismatch(String),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<FulfillmentError> for AppError {
    fn from(err: FulfillmentError) -> Self {
        match err {
            FulfillmentError::UnmatchedReference(_) => AppError::NotFound(err.to_string()),
            FulfillmentError::InvalidState { .. } => AppError::Conflict(err.to_string()),
            FulfillmentError::MetadataMismatch(_) => AppError::Conflict(err.to_string()),
            FulfillmentError::MissingOrder(_) => AppError::InternalServerError(err.to_string()),
            FulfillmentError::Store(inner) => inner,
        }
    }
}

/// What the processor reported as paid.
#[derive(Debug, Clone)]
pub struct ChargeConfirmation {
    pub reference: String,
    pub amount_minor_units: i64,
    pub metadata: Option<OrderDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    AlreadyApplied,
}

#[derive(Debug)]
pub enum FulfillmentOutcome {
    AlreadyProcessed,
    Fulfilled(FulfillmentReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineReport {
    pub ticket_type_id: Uuid,
    pub requested: u32,
    pub reserved: u32,
    pub minted: u32,
    pub status: LineStatus,
}

#[derive(Debug)]
pub struct FulfillmentReport {
    pub reference: String,
    pub lines: Vec<LineReport>,
    pub tickets: Vec<Ticket>,
    pub notifications_sent: usize,
}

impl FulfillmentReport {
    pub fn is_complete(&self) -> bool {
        !self.lines.iter().any(|line| line.status.needs_follow_up())
    }

    pub fn requested(&self) -> u32 {
        self.lines.iter().map(|line| line.requested).sum()
    }
}

pub struct FulfillmentEngine {
    payments: Arc<dyn PaymentStore>,
    tickets: Arc<dyn TicketStore>,
    journal: Arc<dyn FulfillmentJournal>,
    ledger: InventoryLedger,
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
}

impl FulfillmentEngine {
    pub fn new(stores: &Stores, notifier: Arc<dyn Notifier>, notify_timeout: Duration) -> Self {
        Self {
            payments: stores.payments.clone(),
            tickets: stores.tickets.clone(),
            journal: stores.journal.clone(),
            ledger: InventoryLedger::new(stores.events.clone()),
            notifier,
            notify_timeout,
        }
    }

    #[tracing::instrument(name = "fulfill", skip_all, fields(reference = %charge.reference))]
    pub async fn fulfill(
        &self,
        charge: ChargeConfirmation,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        let record = self.find(&charge.reference).await?;

        match record.status {
            PaymentStatus::Completed => {
                self.report_duplicate(&record).await;
                return Ok(FulfillmentOutcome::AlreadyProcessed);
            }
            PaymentStatus::Failed | PaymentStatus::Refunded => {
                error!(
                    reference = %record.reference,
                    status = %record.status,
                    "Success webhook for a payment already closed; not fulfilling"
                );
                return Err(FulfillmentError::InvalidState {
                    reference: record.reference,
                    status: record.status,
                    attempted: PaymentStatus::Completed,
                });
            }
            PaymentStatus::Pending => {}
        }

        let order = resolve_order(&record, charge.metadata)?;
        check_amount(&record, charge.amount_minor_units);
        let journal = self.open_lines(&record, &order).await?;

        // Claim. Only one concurrent delivery gets past this point.
        let change = StatusChange::complete(Utc::now());
        if self.transition(&record.reference, &change).await? == TransitionOutcome::AlreadyApplied {
            info!(reference = %record.reference, "Lost claim to a concurrent delivery");
            return Ok(FulfillmentOutcome::AlreadyProcessed);
        }
        info!(reference = %record.reference, "Payment completed");

        let mut tickets = Vec::new();
        let mut lines = Vec::with_capacity(order.ticket_details.len());
        for (line, item) in journal.iter().zip(&order.ticket_details) {
            let report = self
                .fulfill_line(&record, &order, line, item, &mut tickets)
                .await;
            lines.push(report);
        }

        let mut notifications_sent = 0;
        for ticket in &tickets {
            notifications_sent +=
                notify_best_effort(self.notifier.as_ref(), ticket, self.notify_timeout).await;
        }

        let report = FulfillmentReport {
            reference: record.reference,
            lines,
            tickets,
            notifications_sent,
        };

        if report.is_complete() {
            info!(
                reference = %report.reference,
                tickets = report.tickets.len(),
                "Fulfillment complete"
            );
        } else {
            error!(
                reference = %report.reference,
                requested = report.requested(),
                minted = report.tickets.len(),
                "Payment short-ticketed; operator follow-up required"
            );
        }

        Ok(FulfillmentOutcome::Fulfilled(report))
    }

    /// Marks a pending payment failed. Repeated failure notices are no-ops.
    #[tracing::instrument(name = "fail_payment", skip_all, fields(reference = %reference))]
    pub async fn fail(
        &self,
        reference: &str,
        reason: &str,
    ) -> Result<TransitionOutcome, FulfillmentError> {
        let outcome = self
            .transition(reference, &StatusChange::fail(Utc::now(), reason))
            .await?;
        info!(reference, reason, ?outcome, "Payment marked failed");
        Ok(outcome)
    }

    /// Marks a completed payment refunded. Settlement happens elsewhere.
    #[tracing::instrument(name = "refund_payment", skip_all, fields(reference = %reference))]
    pub async fn refund(&self, reference: &str) -> Result<TransitionOutcome, FulfillmentError> {
        let outcome = self
            .transition(reference, &StatusChange::refund())
            .await?;
        info!(reference, ?outcome, "Payment marked refunded");
        Ok(outcome)
    }

    async fn find(&self, reference: &str) -> Result<PaymentRecord, FulfillmentError> {
        match self.payments.get_by_reference(reference).await? {
            Some(record) => Ok(record),
            None => {
                error!(reference, "Webhook references an unknown payment; ledger desync");
                Err(FulfillmentError::UnmatchedReference(reference.to_string()))
            }
        }
    }

    async fn transition(
        &self,
        reference: &str,
        change: &StatusChange,
    ) -> Result<TransitionOutcome, FulfillmentError> {
        let current = self.find(reference).await?;
        if current.status == change.to {
            return Ok(TransitionOutcome::AlreadyApplied);
        }
        if current.status != change.from {
            return Err(FulfillmentError::InvalidState {
                reference: reference.to_string(),
                status: current.status,
                attempted: change.to,
            });
        }

        if self.payments.update_status(reference, change).await?.is_some() {
            return Ok(TransitionOutcome::Applied);
        }

        // Someone else moved it between our read and the swap.
        let current = self.find(reference).await?;
        if current.status == change.to {
            Ok(TransitionOutcome::AlreadyApplied)
        } else {
            Err(FulfillmentError::InvalidState {
                reference: reference.to_string(),
                status: current.status,
                attempted: change.to,
            })
        }
    }

    /// Journal lines for `reference` that were opened but never settled.
    pub async fn unsettled(&self, reference: &str) -> Result<Vec<FulfillmentLine>, AppError> {
        let lines = self.journal.lines_for(reference).await?;
        Ok(lines
            .into_iter()
            .filter(|line| line.status == LineStatus::Intent)
            .collect())
    }

    async fn report_duplicate(&self, record: &PaymentRecord) {
        info!(reference = %record.reference, "Duplicate delivery for completed payment");
        match self.unsettled(&record.reference).await {
            Ok(open) if !open.is_empty() => {
                let indexes: Vec<i32> = open.iter().map(|line| line.line_index).collect();
                error!(
                    reference = %record.reference,
                    open_lines = ?indexes,
                    "Completed payment has unsettled fulfillment lines"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(reference = %record.reference, error = %e, "Could not read fulfillment journal"),
        }
    }

    /// Writes an `intent` row per line item. Reopening an existing line returns
    /// it unchanged, so a redelivery after a failure here starts cleanly.
    async fn open_lines(
        &self,
        record: &PaymentRecord,
        order: &OrderDetails,
    ) -> Result<Vec<FulfillmentLine>, FulfillmentError> {
        let mut lines = Vec::with_capacity(order.ticket_details.len());
        for (index, item) in order.ticket_details.iter().enumerate() {
            let line_index = i32::try_from(index).map_err(|_| {
                AppError::ValidationError(format!("Line index {} is out of range", index))
            })?;
            let line = self
                .journal
                .open_line(NewFulfillmentLine {
                    payment_reference: record.reference.clone(),
                    line_index,
                    ticket_type_id: item.ticket_type_id,
                    requested: quantity_as_i32(item.quantity)?,
                })
                .await
                .map_err(|e| {
                    error!(
                        reference = %record.reference,
                        line_index,
                        error = %e,
                        "Could not journal line; payment left pending"
                    );
                    e
                })?;
            lines.push(line);
        }
        Ok(lines)
    }

    async fn fulfill_line(
        &self,
        record: &PaymentRecord,
        order: &OrderDetails,
        line: &FulfillmentLine,
        item: &LineItem,
        minted_so_far: &mut Vec<Ticket>,
    ) -> LineReport {
        let mut report = LineReport {
            ticket_type_id: item.ticket_type_id,
            requested: item.quantity,
            reserved: 0,
            minted: 0,
            status: LineStatus::Intent,
        };

        let settlement = match self.process_line(record, order, item, minted_so_far).await {
            Ok(settlement) => settlement,
            Err(e) => {
                error!(
                    reference = %record.reference,
                    line_index = line.line_index,
                    ticket_type_id = %item.ticket_type_id,
                    error = %e,
                    "Line interrupted; left open for reconciliation"
                );
                return report;
            }
        };

        report.status = settlement.status;
        report.reserved = u32::try_from(settlement.reserved).unwrap_or_default();
        report.minted = u32::try_from(settlement.minted).unwrap_or_default();

        if let Err(e) = self.journal.settle_line(line.id, &settlement).await {
            error!(
                reference = %record.reference,
                line_index = line.line_index,
                error = %e,
                "Could not settle journal line"
            );
        }
        report
    }

    async fn process_line(
        &self,
        record: &PaymentRecord,
        order: &OrderDetails,
        item: &LineItem,
        minted_so_far: &mut Vec<Ticket>,
    ) -> Result<LineSettlement, AppError> {
        let ticket_type = match self.ledger.ticket_type(item.ticket_type_id).await? {
            Some(ticket_type) if ticket_type.event_id == order.event_id => ticket_type,
            Some(_) => {
                warn!(
                    reference = %record.reference,
                    ticket_type_id = %item.ticket_type_id,
                    "Ticket type belongs to another event"
                );
                return Ok(LineSettlement::rejected("ticket type belongs to another event"));
            }
            None => {
                warn!(
                    reference = %record.reference,
                    ticket_type_id = %item.ticket_type_id,
                    "Ticket type not found"
                );
                return Ok(LineSettlement::rejected("ticket type not found"));
            }
        };

        match self.ledger.try_reserve(ticket_type.id, item.quantity).await? {
            Reservation::Insufficient { available } => {
                error!(
                    reference = %record.reference,
                    ticket_type_id = %ticket_type.id,
                    ticket_type = %ticket_type.name,
                    requested = item.quantity,
                    available,
                    "Sold out after capture; refund required"
                );
                return Ok(LineSettlement::sold_out(format!(
                    "requested {}, available {}",
                    item.quantity, available
                )));
            }
            Reservation::Reserved { .. } => {}
        }

        let quantity = quantity_as_i32(item.quantity)?;
        let mut minted = 0i32;
        let mut unstamped = 0i32;
        let mut mint_error = None;

        while minted < quantity {
            let attendee = order.attendee_for(minted_so_far.len()).clone();
            let ticket = match self
                .tickets
                .create(NewTicket {
                    event_id: order.event_id,
                    ticket_type_id: ticket_type.id,
                    user_id: record.user_id,
                    payment_reference: record.reference.clone(),
                    attendee,
                })
                .await
            {
                Ok(ticket) => ticket,
                Err(e) => {
                    mint_error = Some(e);
                    break;
                }
            };
            minted += 1;

            let payload = ticket.qr_payload();
            match self.tickets.update_qr(ticket.id, &payload).await {
                Ok(stamped) => minted_so_far.push(stamped),
                Err(e) => {
                    warn!(ticket_id = %ticket.id, error = %e, "QR stamping failed");
                    unstamped += 1;
                    minted_so_far.push(ticket);
                }
            }
        }

        if let Some(e) = mint_error {
            let unminted = quantity - minted;
            error!(
                reference = %record.reference,
                ticket_type_id = %ticket_type.id,
                minted,
                unminted,
                error = %e,
                "Ticket creation failed after reservation"
            );
            let reserved = match self.ledger.release(ticket_type.id, unminted.unsigned_abs()).await {
                Ok(()) => minted,
                Err(release_err) => {
                    error!(
                        ticket_type_id = %ticket_type.id,
                        unminted,
                        error = %release_err,
                        "Compensating release failed; sold count overstated"
                    );
                    quantity
                }
            };
            return Ok(LineSettlement::short(
                reserved,
                minted,
                format!("minted {} of {}: {}", minted, quantity, e),
            ));
        }

        if unstamped > 0 {
            return Ok(LineSettlement::short(
                quantity,
                minted,
                format!("{} tickets issued without QR payload", unstamped),
            ));
        }

        Ok(LineSettlement::ticketed(quantity))
    }
}

/// The order persisted at initiation wins; echoed metadata is only used for
/// payments created without one.
fn resolve_order(
    record: &PaymentRecord,
    metadata: Option<OrderDetails>,
) -> Result<OrderDetails, FulfillmentError> {
    if let Some(order) = record.order() {
        if let Some(echoed) = metadata.as_ref() {
            if echoed.event_id != order.event_id {
                error!(
                    reference = %record.reference,
                    stored = %order.event_id,
                    echoed = %echoed.event_id,
                    "Echoed metadata names a different event"
                );
                return Err(FulfillmentError::MetadataMismatch(record.reference.clone()));
            }
            if echoed.ticket_details != order.ticket_details {
                warn!(
                    reference = %record.reference,
                    "Echoed line items differ from the stored order; using stored order"
                );
            }
        }
        return Ok(order.clone());
    }

    match metadata {
        Some(order) if order.event_id == record.event_id => Ok(order),
        Some(_) => {
            error!(reference = %record.reference, "Metadata event does not match payment");
            Err(FulfillmentError::MetadataMismatch(record.reference.clone()))
        }
        None => {
            error!(reference = %record.reference, "No order details to fulfill");
            Err(FulfillmentError::MissingOrder(record.reference.clone()))
        }
    }
}

fn check_amount(record: &PaymentRecord, reported_minor_units: i64) {
    match to_minor_units(record.amount) {
        Ok(expected) if expected == reported_minor_units => {}
        Ok(expected) => warn!(
            reference = %record.reference,
            expected,
            reported = reported_minor_units,
            "Charged amount differs from payment amount"
        ),
        Err(e) => warn!(reference = %record.reference, error = %e, "Could not check amount"),
    }
}
