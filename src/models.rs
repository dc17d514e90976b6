//! Core data models used throughout the sync pipeline.
//!
//! The `*Record` types are the typed fetch boundary: the POS client converts
//! its wire payloads into them, and everything downstream (writer, document
//! builder, orchestrator) only sees these. Instants are stored in SQLite as
//! RFC 3339 text with millisecond precision so that stored values sort
//! lexicographically and round-trip exactly.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{SyncError, SyncResult};

/// A customer as reported by the POS API.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub total_visits: i64,
    pub total_spent: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// A single sold item on a receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItemRecord {
    pub item_name: String,
    pub quantity: i64,
    pub price: Decimal,
}

/// A receipt with its line items, as reported by the POS API.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptRecord {
    pub receipt_number: String,
    pub created_at: DateTime<Utc>,
    pub total_money: Decimal,
    pub total_tax: Decimal,
    pub source: Option<String>,
    pub customer_id: Option<String>,
    pub line_items: Vec<LineItemRecord>,
}

/// A closed-open fetch window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Build a window, rejecting one whose end precedes its start.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> SyncResult<Self> {
        if end < start {
            return Err(SyncError::WatermarkAhead {
                watermark: start,
                now: end,
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        *instant >= self.start && *instant < self.end
    }
}

/// One row of the append-only `sync_log`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatermarkEntry {
    pub id: i64,
    pub last_sync_timestamp: DateTime<Utc>,
    pub receipts_synced: i64,
    pub customers_synced: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Current instant truncated to the precision the store keeps.
pub fn now_instant() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_instant(raw: &str) -> SyncResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::Persistence(format!("invalid stored instant '{}': {}", raw, e)))
}
