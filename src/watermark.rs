//! Append-only watermark log (`sync_log`).
//!
//! The watermark is the instant up to which POS data has been synchronized.
//! It is never updated in place: each successful sync appends a row, and the
//! current watermark is the most recently appended one. Reads and appends take
//! a `&mut SqliteConnection` so they can run inside the orchestrator's
//! transaction (`&mut *tx`) or on a plain pooled connection.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use crate::error::{SyncError, SyncResult};
use crate::models::{format_instant, now_instant, parse_instant, WatermarkEntry};

/// Returns the current watermark, or [`SyncError::NoWatermark`] on first run.
pub async fn get_last_sync(conn: &mut SqliteConnection) -> SyncResult<DateTime<Utc>> {
    latest(conn)
        .await?
        .map(|entry| entry.last_sync_timestamp)
        .ok_or(SyncError::NoWatermark)
}

/// The most recent log entry, if any.
pub async fn latest(conn: &mut SqliteConnection) -> SyncResult<Option<WatermarkEntry>> {
    let mut entries = history(conn, 1).await?;
    Ok(entries.pop())
}

/// Appends a new watermark entry.
pub async fn advance(
    conn: &mut SqliteConnection,
    instant: DateTime<Utc>,
    receipts_synced: i64,
    customers_synced: i64,
) -> SyncResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_log (last_sync_timestamp, receipts_synced, customers_synced, recorded_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(format_instant(&instant))
    .bind(receipts_synced)
    .bind(customers_synced)
    .bind(format_instant(&now_instant()))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Up to `limit` entries, newest first.
pub async fn history(conn: &mut SqliteConnection, limit: i64) -> SyncResult<Vec<WatermarkEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, last_sync_timestamp, receipts_synced, customers_synced, recorded_at
        FROM sync_log
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            let last_sync: String = row.get("last_sync_timestamp");
            let recorded_at: String = row.get("recorded_at");
            Ok(WatermarkEntry {
                id: row.get("id"),
                last_sync_timestamp: parse_instant(&last_sync)?,
                receipts_synced: row.get("receipts_synced"),
                customers_synced: row.get("customers_synced"),
                recorded_at: parse_instant(&recorded_at)?,
            })
        })
        .collect()
}

/// Provisions an initial watermark. Refuses to move the log backwards.
pub async fn seed(conn: &mut SqliteConnection, instant: DateTime<Utc>) -> SyncResult<()> {
    if let Some(current) = latest(conn).await? {
        if instant < current.last_sync_timestamp {
            return Err(SyncError::Persistence(format!(
                "cannot seed {} behind the current watermark {}",
                format_instant(&instant),
                format_instant(&current.last_sync_timestamp)
            )));
        }
    }
    advance(conn, instant, 0, 0).await
}
