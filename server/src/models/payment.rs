use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

use crate::models::order::OrderDetails;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Closed transition table. Every status write goes through this check.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Completed, PaymentStatus::Refunded)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    #[default]
    Card,
    Wallet,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal payment transition {from} -> {to}")]
pub struct TransitionError {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
}

/// A status change requested against a stored payment.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl StatusChange {
    pub fn complete(at: DateTime<Utc>) -> Self {
        Self {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Completed,
            processed_at: Some(at),
            failure_reason: None,
        }
    }

    pub fn fail(at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Failed,
            processed_at: Some(at),
            failure_reason: Some(reason.into()),
        }
    }

    /// Keeps the completion timestamp; `processed_at` records when the charge
    /// was settled, not when it was reversed.
    pub fn refund() -> Self {
        Self {
            from: PaymentStatus::Completed,
            to: PaymentStatus::Refunded,
            processed_at: None,
            failure_reason: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub reference: String,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub failure_reason: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub order_details: Option<sqlx::types::Json<OrderDetails>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Applies a status change in memory, enforcing the transition table.
    pub fn apply(&mut self, change: &StatusChange) -> Result<(), TransitionError> {
        if self.status != change.from || !change.from.can_transition_to(change.to) {
            return Err(TransitionError {
                from: self.status,
                to: change.to,
            });
        }
        self.status = change.to;
        if change.processed_at.is_some() {
            self.processed_at = change.processed_at;
        }
        if change.failure_reason.is_some() {
            self.failure_reason = change.failure_reason.clone();
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn order(&self) -> Option<&OrderDetails> {
        self.order_details.as_ref().map(|json| &json.0)
    }
}

/// Fields supplied when a pending payment is first written.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub reference: String,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub order: OrderDetails,
}

impl NewPayment {
    pub fn into_record(self, now: DateTime<Utc>) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            reference: self.reference,
            event_id: self.event_id,
            user_id: self.user_id,
            amount: self.amount,
            currency: self.currency,
            status: PaymentStatus::Pending,
            method: self.method,
            failure_reason: None,
            processed_at: None,
            order_details: Some(sqlx::types::Json(self.order)),
            created_at: now,
            updated_at: now,
        }
    }
}
