use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::{
    Event, FulfillmentLine, LineSettlement, LineStatus, NewFulfillmentLine, NewPayment, NewTicket,
    PaymentRecord, StatusChange, Ticket, TicketType,
};
use crate::store::{
    quantity_as_i32, EventStore, FulfillmentJournal, PaymentStore, Reservation, TicketStore,
};
use crate::utils::error::AppError;

const EVENT_COLUMNS: &str = "id, host_id, title, location, start_time, created_at, updated_at";

const TICKET_TYPE_COLUMNS: &str = "id, event_id, name, description, price, total_quantity, \
     sold_quantity, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, reference, event_id, user_id, amount, currency, status, method, \
     failure_reason, processed_at, order_details, created_at, updated_at";

const TICKET_COLUMNS: &str = "id, event_id, ticket_type_id, user_id, payment_reference, \
     attendee_full_name, attendee_email, attendee_phone, qr_code, created_at, updated_at";

const LINE_COLUMNS: &str = "id, payment_reference, line_index, ticket_type_id, requested, \
     reserved, minted, status, detail, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let event = sqlx::query_as::<_, Event>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    async fn get_ticket_type(&self, id: Uuid) -> Result<Option<TicketType>, AppError> {
        let sql = format!("SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE id = $1");
        let ticket_type = sqlx::query_as::<_, TicketType>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket_type)
    }

    async fn try_reserve(&self, id: Uuid, quantity: u32) -> Result<Reservation, AppError> {
        let quantity = quantity_as_i32(quantity)?;

        // The WHERE clause is the capacity check; a single statement keeps the
        // read and the write on the same row version.
        let sold: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE ticket_types
            SET sold_quantity = sold_quantity + $2, updated_at = NOW()
            WHERE id = $1 AND sold_quantity + $2 <= total_quantity
            RETURNING sold_quantity
            "#,
        )
        .bind(id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(sold) = sold {
            debug!(ticket_type_id = %id, quantity, sold, "Reserved inventory");
            return Ok(Reservation::Reserved { sold });
        }

        match self.get_ticket_type(id).await? {
            Some(ticket_type) => Ok(Reservation::Insufficient {
                available: ticket_type.total_quantity - ticket_type.sold_quantity,
            }),
            None => Err(AppError::NotFound(format!(
                "Ticket type '{}' was not found",
                id
            ))),
        }
    }

    async fn release(&self, id: Uuid, quantity: u32) -> Result<(), AppError> {
        let quantity = quantity_as_i32(quantity)?;
        let result = sqlx::query(
            r#"
            UPDATE ticket_types
            SET sold_quantity = sold_quantity - $2, updated_at = NOW()
            WHERE id = $1 AND sold_quantity >= $2
            "#,
        )
        .bind(id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            error!(ticket_type_id = %id, quantity, "Release matched no ticket type row");
            return Err(AppError::InternalServerError(format!(
                "Could not release {} units of ticket type {}",
                quantity, id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn create(&self, payment: NewPayment) -> Result<PaymentRecord, AppError> {
        let sql = format!(
            r#"
            INSERT INTO payments (id, reference, event_id, user_id, amount, currency, status, method, order_details)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8)
            RETURNING {PAYMENT_COLUMNS}
            "#
        );
        let result = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&payment.reference)
            .bind(payment.event_id)
            .bind(payment.user_id)
            .bind(payment.amount)
            .bind(&payment.currency)
            .bind(payment.method)
            .bind(sqlx::types::Json(&payment.order))
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(record) => Ok(record),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(AppError::Conflict(
                format!("Payment reference '{}' already exists", payment.reference),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_by_reference(&self, reference: &str) -> Result<Option<PaymentRecord>, AppError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1");
        let record = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
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

        let sql = format!(
            r#"
            UPDATE payments
            SET status = $3,
                processed_at = COALESCE($4, processed_at),
                failure_reason = COALESCE($5, failure_reason),
                updated_at = NOW()
            WHERE reference = $1 AND status = $2
            RETURNING {PAYMENT_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(reference)
            .bind(change.from)
            .bind(change.to)
            .bind(change.processed_at)
            .bind(change.failure_reason.as_deref())
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }
}

#[async_trait]
impl TicketStore for PgStore {
    async fn create(&self, ticket: NewTicket) -> Result<Ticket, AppError> {
        let sql = format!(
            r#"
            INSERT INTO tickets (id, event_id, ticket_type_id, user_id, payment_reference,
                                 attendee_full_name, attendee_email, attendee_phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TICKET_COLUMNS}
            "#
        );
        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(Uuid::new_v4())
            .bind(ticket.event_id)
            .bind(ticket.ticket_type_id)
            .bind(ticket.user_id)
            .bind(&ticket.payment_reference)
            .bind(&ticket.attendee.full_name)
            .bind(&ticket.attendee.email)
            .bind(&ticket.attendee.phone)
            .fetch_one(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn update_qr(&self, id: Uuid, qr_code: &str) -> Result<Ticket, AppError> {
        let sql = format!(
            "UPDATE tickets SET qr_code = $2, updated_at = NOW() WHERE id = $1 RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, Ticket>(&sql)
            .bind(id)
            .bind(qr_code)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ticket '{}' was not found", id)))
    }

    async fn list_by_payment(&self, reference: &str) -> Result<Vec<Ticket>, AppError> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE payment_reference = $1 ORDER BY created_at"
        );
        let tickets = sqlx::query_as::<_, Ticket>(&sql)
            .bind(reference)
            .fetch_all(&self.pool)
            .await?;
        Ok(tickets)
    }
}

#[async_trait]
impl FulfillmentJournal for PgStore {
    async fn open_line(&self, line: NewFulfillmentLine) -> Result<FulfillmentLine, AppError> {
        let sql = format!(
            r#"
            INSERT INTO fulfillment_lines (id, payment_reference, line_index, ticket_type_id, requested, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (payment_reference, line_index)
            DO UPDATE SET updated_at = fulfillment_lines.updated_at
            RETURNING {LINE_COLUMNS}
            "#
        );
        let line = sqlx::query_as::<_, FulfillmentLine>(&sql)
            .bind(Uuid::new_v4())
            .bind(&line.payment_reference)
            .bind(line.line_index)
            .bind(line.ticket_type_id)
            .bind(line.requested)
            .bind(LineStatus::Intent)
            .fetch_one(&self.pool)
            .await?;
        Ok(line)
    }

    async fn settle_line(&self, id: Uuid, settlement: &LineSettlement) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE fulfillment_lines
            SET status = $2, reserved = $3, minted = $4, detail = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(settlement.status)
        .bind(settlement.reserved)
        .bind(settlement.minted)
        .bind(settlement.detail.as_deref())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Fulfillment line '{}' was not found",
                id
            )));
        }
        Ok(())
    }

    async fn lines_for(&self, reference: &str) -> Result<Vec<FulfillmentLine>, AppError> {
        let sql = format!(
            "SELECT {LINE_COLUMNS} FROM fulfillment_lines WHERE payment_reference = $1 ORDER BY line_index"
        );
        let lines = sqlx::query_as::<_, FulfillmentLine>(&sql)
            .bind(reference)
            .fetch_all(&self.pool)
            .await?;
        Ok(lines)
    }
}
