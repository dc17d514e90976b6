//! Upsert writer: applies a fetched batch to the relational store.
//!
//! All functions take the orchestrator's connection (`&mut *tx`) so the
//! whole batch commits or rolls back together. Per receipt the required
//! order is: [`ensure_customer_stub`] (when the receipt names a customer),
//! [`insert_receipt`], then [`insert_line_items`].

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::{SyncError, SyncResult};
use crate::models::{format_instant, CustomerRecord, LineItemRecord, ReceiptRecord};

/// Inserts or merges each customer by id. Merges are last-write-wins.
pub async fn upsert_customers(
    conn: &mut SqliteConnection,
    customers: &[CustomerRecord],
) -> SyncResult<u64> {
    let mut written = 0u64;
    for customer in customers {
        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, phone, total_visits, total_spent, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                phone = excluded.phone,
                total_visits = excluded.total_visits,
                total_spent = excluded.total_spent,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(customer.total_visits)
        .bind(customer.total_spent.to_string())
        .bind(format_instant(&customer.updated_at))
        .execute(&mut *conn)
        .await?;
        written += 1;
    }
    Ok(written)
}

/// Inserts a placeholder customer unless a row with this id already exists.
///
/// Returns `true` when a stub was created.
pub async fn ensure_customer_stub(
    conn: &mut SqliteConnection,
    customer_id: &str,
    fallback_name: &str,
    instant: DateTime<Utc>,
) -> SyncResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO customers (id, name, total_visits, total_spent, updated_at)
        VALUES (?, ?, 0, '0', ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(customer_id)
    .bind(fallback_name)
    .bind(format_instant(&instant))
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Inserts a receipt. An existing receipt number is a [`SyncError::DuplicateReceipt`].
pub async fn insert_receipt(conn: &mut SqliteConnection, receipt: &ReceiptRecord) -> SyncResult<()> {
    sqlx::query(
        r#"
        INSERT INTO receipts (receipt_number, created_at, total_money, total_tax, source, customer_id)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&receipt.receipt_number)
    .bind(format_instant(&receipt.created_at))
    .bind(receipt.total_money.to_string())
    .bind(receipt.total_tax.to_string())
    .bind(&receipt.source)
    .bind(&receipt.customer_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => SyncError::DuplicateReceipt {
            receipt_number: receipt.receipt_number.clone(),
        },
        other => other.into(),
    })?;

    Ok(())
}

pub async fn insert_line_items(
    conn: &mut SqliteConnection,
    receipt_number: &str,
    items: &[LineItemRecord],
) -> SyncResult<u64> {
    for item in items {
        sqlx::query(
            "INSERT INTO line_items (receipt_number, item_name, quantity, price) VALUES (?, ?, ?, ?)",
        )
        .bind(receipt_number)
        .bind(&item.item_name)
        .bind(item.quantity)
        .bind(item.price.to_string())
        .execute(&mut *conn)
        .await?;
    }
    Ok(items.len() as u64)
}
