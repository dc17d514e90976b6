//! Sync status and watermark history.
//!
//! Used by `possync status` and `GET /sync-status`. An empty watermark log is
//! reported as "no sync yet" rather than an error.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::{SyncError, SyncResult};
use crate::models::{format_instant, WatermarkEntry};
use crate::watermark;

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub synced: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub message: String,
}

/// Human-readable rendering of a watermark, e.g. `August 1, 2025 at 00:00:00 UTC`.
pub fn format_display(instant: &DateTime<Utc>) -> String {
    instant.format("%B %-d, %Y at %H:%M:%S UTC").to_string()
}

pub async fn sync_status(pool: &SqlitePool) -> SyncResult<SyncStatus> {
    let mut conn = pool.acquire().await?;
    match watermark::get_last_sync(&mut conn).await {
        Ok(last) => Ok(SyncStatus {
            synced: true,
            last_sync: Some(last),
            message: format_display(&last),
        }),
        Err(SyncError::NoWatermark) => Ok(SyncStatus {
            synced: false,
            last_sync: None,
            message: "no sync yet".to_string(),
        }),
        Err(e) => Err(e),
    }
}

pub async fn sync_history(pool: &SqlitePool, limit: i64) -> SyncResult<Vec<WatermarkEntry>> {
    let mut conn = pool.acquire().await?;
    watermark::history(&mut conn, limit).await
}

/// CLI entry point for `possync status`.
pub async fn run_status(config: &Config, history: Option<i64>) -> Result<()> {
    let pool = db::connect(config).await?;
    let status = sync_status(&pool).await?;

    match status.last_sync {
        Some(ref last) => {
            println!("last sync:    {}", status.message);
            println!("watermark:    {}", format_instant(last));
        }
        None => println!("last sync:    {}", status.message),
    }

    if let Some(limit) = history {
        let entries = sync_history(&pool, limit).await?;
        println!();
        println!("{:<6} {:<26} {:>9} {:>10}", "ID", "WATERMARK", "RECEIPTS", "CUSTOMERS");
        for entry in &entries {
            println!(
                "{:<6} {:<26} {:>9} {:>10}",
                entry.id,
                format_instant(&entry.last_sync_timestamp),
                entry.receipts_synced,
                entry.customers_synced
            );
        }
    }

    pool.close().await;
    Ok(())
}

/// CLI entry point for `possync seed`.
pub async fn run_seed(config: &Config, at: DateTime<Utc>) -> Result<()> {
    let pool = db::connect(config).await?;
    let mut conn = pool.acquire().await?;
    watermark::seed(&mut conn, at).await?;
    drop(conn);
    pool.close().await;

    println!("watermark seeded: {}", format_instant(&at));
    Ok(())
}
