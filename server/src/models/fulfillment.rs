use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Progress of a single line item within one fulfillment attempt.
///
/// A line is opened as `Intent` before inventory is touched. A line still in
/// `Intent` after processing ended means the process stopped between reserving
/// and minting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "fulfillment_line_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Intent,
    Ticketed,
    SoldOut,
    Short,
    Rejected,
}

impl LineStatus {
    /// Lines an operator has to act on (refund or re-issue).
    pub fn needs_follow_up(self) -> bool {
        !matches!(self, LineStatus::Ticketed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FulfillmentLine {
    pub id: Uuid,
    pub payment_reference: String,
    pub line_index: i32,
    pub ticket_type_id: Uuid,
    pub requested: i32,
    pub reserved: i32,
    pub minted: i32,
    pub status: LineStatus,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFulfillmentLine {
    pub payment_reference: String,
    pub line_index: i32,
    pub ticket_type_id: Uuid,
    pub requested: i32,
}

/// Final accounting for a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSettlement {
    pub status: LineStatus,
    pub reserved: i32,
    pub minted: i32,
    pub detail: Option<String>,
}

impl LineSettlement {
    pub fn ticketed(quantity: i32) -> Self {
        Self {
            status: LineStatus::Ticketed,
            reserved: quantity,
            minted: quantity,
            detail: None,
        }
    }

    pub fn sold_out(detail: impl Into<String>) -> Self {
        Self {
            status: LineStatus::SoldOut,
            reserved: 0,
            minted: 0,
            detail: Some(detail.into()),
        }
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            status: LineStatus::Rejected,
            reserved: 0,
            minted: 0,
            detail: Some(detail.into()),
        }
    }

    pub fn short(reserved: i32, minted: i32, detail: impl Into<String>) -> Self {
        Self {
            status: LineStatus::Short,
            reserved,
            minted,
            detail: Some(detail.into()),
        }
    }
}
