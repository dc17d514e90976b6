//! Sync orchestration.
//!
//! Coordinates one incremental sync: watermark read → POS fetch → customer
//! upsert → receipt and line item insert → summary building and indexing →
//! watermark append. Everything from the watermark read to the append runs
//! inside a single SQLite transaction; any error (or the wall-clock timeout)
//! drops the transaction, which rolls the batch back and leaves the watermark
//! untouched.
//!
//! # Phases
//!
//! ```text
//! Idle → WatermarkRead → Fetching → Writing → DocumentBuilding → WatermarkAdvance → Committed
//!   └──────────────┴───────────┴─────────┴──────────────┴──────────────────┴──→ Failed
//! ```
//!
//! # Single flight
//!
//! A [`SyncEngine`] owns a gate that admits one orchestration at a time. A
//! trigger that arrives while another sync holds it fails immediately with
//! [`SyncError::AlreadyRunning`] instead of queueing behind it.

use std::fmt;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::Mutex;

use crate::config::{Config, SyncConfig};
use crate::db;
use crate::document::build_summary;
use crate::error::{SyncError, SyncResult};
use crate::indexer::{create_indexer, DocumentIndex};
use crate::models::{format_instant, now_instant, SyncWindow};
use crate::pos_client::PosClient;
use crate::watermark;
use crate::writer;

/// Orchestration state. `Committed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    WatermarkRead,
    Fetching,
    Writing,
    DocumentBuilding,
    WatermarkAdvance,
    Committed,
    Failed,
}

impl SyncPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncPhase::Committed | SyncPhase::Failed)
    }

    /// Moves to `next` unless already terminal.
    pub fn advance(&mut self, next: SyncPhase) {
        if self.is_terminal() {
            return;
        }
        tracing::debug!(from = %self, to = %next, "sync phase");
        *self = next;
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::WatermarkRead => "watermark_read",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Writing => "writing",
            SyncPhase::DocumentBuilding => "document_building",
            SyncPhase::WatermarkAdvance => "watermark_advance",
            SyncPhase::Committed => "committed",
            SyncPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters for a committed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSummary {
    pub window: SyncWindow,
    pub customers_synced: u64,
    pub receipts_synced: u64,
    pub line_items_synced: u64,
    pub stubs_created: u64,
    pub documents_indexed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Both fetches came back empty; nothing written, watermark unchanged.
    NoNewData { window: SyncWindow },
    Synced(SyncSummary),
}

/// What a sync would fetch, without writing anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncPreview {
    pub window: SyncWindow,
    pub customers: usize,
    pub receipts: usize,
    pub line_items: usize,
}

pub struct SyncEngine {
    pool: SqlitePool,
    pos: PosClient,
    indexer: Box<dyn DocumentIndex>,
    settings: SyncConfig,
    gate: Mutex<()>,
    last_phase: StdMutex<SyncPhase>,
}

impl SyncEngine {
    pub fn new(
        pool: SqlitePool,
        pos: PosClient,
        indexer: Box<dyn DocumentIndex>,
        settings: SyncConfig,
    ) -> Self {
        Self {
            pool,
            pos,
            indexer,
            settings,
            gate: Mutex::new(()),
            last_phase: StdMutex::new(SyncPhase::Idle),
        }
    }

    /// Wires the engine from configuration. Requires `POS_API_TOKEN`.
    pub fn from_config(config: &Config, pool: SqlitePool) -> Result<Self> {
        let pos = PosClient::from_config(config)?;
        let indexer = create_indexer(&config.indexing)?;
        Ok(Self::new(pool, pos, indexer, config.sync.clone()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Phase reached by the most recent orchestration.
    pub fn last_phase(&self) -> SyncPhase {
        self.last_phase
            .lock()
            .map(|p| *p)
            .unwrap_or(SyncPhase::Failed)
    }

    /// Runs one sync to completion, or rolls it back entirely.
    pub async fn run(&self) -> SyncResult<SyncOutcome> {
        let _gate = self.gate.try_lock().map_err(|_| SyncError::AlreadyRunning)?;

        let limit = Duration::from_secs(self.settings.timeout_secs);
        let mut phase = SyncPhase::Idle;
        // The deadline covers the work up to the commit, not the commit itself.
        let prepared = tokio::time::timeout(limit, self.execute(&mut phase)).await;
        let result = match prepared {
            Ok(Ok((tx, outcome))) => match tx.commit().await {
                Ok(()) => {
                    phase.advance(SyncPhase::Committed);
                    Ok(outcome)
                }
                Err(e) => Err(e.into()),
            },
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SyncError::TimedOut(limit)),
        };

        match result {
            Ok(ref outcome) => log_outcome(outcome),
            Err(ref e) => {
                tracing::error!(phase = %phase, error = %e, "sync failed; batch rolled back");
                phase = SyncPhase::Failed;
            }
        }
        if let Ok(mut last) = self.last_phase.lock() {
            *last = phase;
        }

        result
    }

    /// Fetches the pending window and reports counts without writing.
    pub async fn preview(&self) -> SyncResult<SyncPreview> {
        let start = {
            let mut conn = self.pool.acquire().await?;
            self.window_start(&mut conn).await?
        };
        let window = SyncWindow::new(start, now_instant())?;

        let customers = self.pos.fetch_customers(&window).await?;
        let receipts = self.pos.fetch_receipts(&window).await?;

        Ok(SyncPreview {
            window,
            customers: customers.len(),
            receipts: receipts.len(),
            line_items: receipts.iter().map(|r| r.line_items.len()).sum(),
        })
    }

    /// Performs everything short of the commit and hands back the open
    /// transaction. Dropping it on any error rolls the batch back.
    async fn execute(
        &self,
        phase: &mut SyncPhase,
    ) -> SyncResult<(Transaction<'static, Sqlite>, SyncOutcome)> {
        let mut tx = self.pool.begin().await?;

        phase.advance(SyncPhase::WatermarkRead);
        let last_sync = self.window_start(&mut tx).await?;

        // One `now` bounds both fetches and becomes the next watermark.
        let now = now_instant();
        let window = SyncWindow::new(last_sync, now)?;

        phase.advance(SyncPhase::Fetching);
        let customers = self.pos.fetch_customers(&window).await?;
        let receipts = self.pos.fetch_receipts(&window).await?;
        tracing::info!(
            customers = customers.len(),
            receipts = receipts.len(),
            window_start = %format_instant(&window.start),
            window_end = %format_instant(&window.end),
            "fetched POS delta"
        );

        if customers.is_empty() && receipts.is_empty() {
            return Ok((tx, SyncOutcome::NoNewData { window }));
        }

        phase.advance(SyncPhase::Writing);
        let customers_synced = writer::upsert_customers(&mut tx, &customers).await?;
        let mut stubs_created = 0u64;
        let mut line_items_synced = 0u64;
        for receipt in &receipts {
            if let Some(ref customer_id) = receipt.customer_id {
                let created = writer::ensure_customer_stub(
                    &mut tx,
                    customer_id,
                    &self.settings.stub_customer_name,
                    now,
                )
                .await?;
                if created {
                    stubs_created += 1;
                }
            }
            writer::insert_receipt(&mut tx, receipt).await?;
            line_items_synced +=
                writer::insert_line_items(&mut tx, &receipt.receipt_number, &receipt.line_items)
                    .await?;
        }

        phase.advance(SyncPhase::DocumentBuilding);
        let documents: Vec<String> = receipts
            .iter()
            .map(|r| build_summary(r, &r.line_items))
            .collect();
        if !documents.is_empty() {
            self.indexer.index(&documents).await?;
            tracing::debug!(indexer = self.indexer.name(), count = documents.len(), "documents handed off");
        }

        phase.advance(SyncPhase::WatermarkAdvance);
        watermark::advance(&mut tx, now, receipts.len() as i64, customers_synced as i64).await?;

        Ok((
            tx,
            SyncOutcome::Synced(SyncSummary {
                window,
                customers_synced,
                receipts_synced: receipts.len() as u64,
                line_items_synced,
                stubs_created,
                documents_indexed: documents.len() as u64,
            }),
        ))
    }

    /// The stored watermark, or the configured initial one on first run.
    async fn window_start(&self, conn: &mut SqliteConnection) -> SyncResult<DateTime<Utc>> {
        match watermark::get_last_sync(conn).await {
            Err(SyncError::NoWatermark) => match self.settings.initial_watermark {
                Some(initial) => {
                    tracing::info!(initial = %format_instant(&initial), "no watermark yet; using configured initial watermark");
                    Ok(initial)
                }
                None => Err(SyncError::NoWatermark),
            },
            other => other,
        }
    }
}

fn log_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::NoNewData { .. } => tracing::info!("sync committed: no new data"),
        SyncOutcome::Synced(s) => tracing::info!(
            customers = s.customers_synced,
            receipts = s.receipts_synced,
            line_items = s.line_items_synced,
            stubs = s.stubs_created,
            documents = s.documents_indexed,
            "sync committed"
        ),
    }
}

/// CLI entry point for `possync sync`.
pub async fn run_sync(config: &Config, dry_run: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let engine = SyncEngine::from_config(config, pool)?;

    if dry_run {
        let preview = engine.preview().await?;
        println!("sync pos (dry-run)");
        print_window(&preview.window);
        println!("  customers found: {}", preview.customers);
        println!("  receipts found: {}", preview.receipts);
        println!("  line items found: {}", preview.line_items);
        engine.pool().close().await;
        return Ok(());
    }

    let outcome = engine.run().await;
    engine.pool().close().await;

    println!("sync pos");
    match outcome? {
        SyncOutcome::NoNewData { window } => {
            print_window(&window);
            println!("  no new data");
        }
        SyncOutcome::Synced(summary) => {
            print_window(&summary.window);
            println!("  customers upserted: {}", summary.customers_synced);
            println!("  receipts inserted: {}", summary.receipts_synced);
            println!("  line items inserted: {}", summary.line_items_synced);
            println!("  customer stubs created: {}", summary.stubs_created);
            println!("  documents indexed: {}", summary.documents_indexed);
            println!("  watermark: {}", format_instant(&summary.window.end));
        }
    }
    println!("ok");

    Ok(())
}

fn print_window(window: &SyncWindow) {
    println!(
        "  window: {} .. {}",
        format_instant(&window.start),
        format_instant(&window.end)
    );
}
