use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates the four sync relations on an already-open pool. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Create customers table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            name TEXT,
            email TEXT,
            phone TEXT,
            total_visits INTEGER NOT NULL DEFAULT 0 CHECK (total_visits >= 0),
            total_spent TEXT NOT NULL DEFAULT '0' CHECK (CAST(total_spent AS REAL) >= 0),
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create receipts table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS receipts (
            receipt_number TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            total_money TEXT NOT NULL,
            total_tax TEXT NOT NULL,
            source TEXT,
            customer_id TEXT,
            FOREIGN KEY (customer_id) REFERENCES customers(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create line_items table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS line_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            receipt_number TEXT NOT NULL,
            item_name TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            price TEXT NOT NULL CHECK (CAST(price AS REAL) >= 0),
            FOREIGN KEY (receipt_number) REFERENCES receipts(receipt_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create the append-only watermark log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            last_sync_timestamp TEXT NOT NULL,
            receipts_synced INTEGER NOT NULL DEFAULT 0,
            customers_synced INTEGER NOT NULL DEFAULT 0,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_line_items_receipt ON line_items(receipt_number)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_receipts_customer ON receipts(customer_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_receipts_created_at ON receipts(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
