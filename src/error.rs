//! Error taxonomy for the sync engine.
//!
//! Every variant raised inside an orchestration aborts the whole batch: the
//! transaction is rolled back and the watermark stays where it was. Callers
//! outside the library (CLI, HTTP layer) collapse these into `anyhow` errors
//! or generic failure responses.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced by the watermark store, fetcher, writer, indexer and
/// orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The watermark log is empty and no initial watermark is configured.
    #[error("no watermark recorded yet (seed one with `possync seed` or set sync.initial_watermark)")]
    NoWatermark,

    /// Transport failure or non-2xx response from the POS API.
    #[error("remote fetch failed: {0}")]
    RemoteFetch(String),

    /// A fetched receipt number already exists in storage.
    #[error("duplicate receipt: {receipt_number}")]
    DuplicateReceipt { receipt_number: String },

    /// The indexing collaborator was unreachable, timed out or rejected the batch.
    #[error("indexing unavailable: {0}")]
    IndexingUnavailable(String),

    /// Any other storage failure (constraint violation, I/O, bad stored value).
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The stored watermark lies in the future: a clock or seeding problem.
    #[error("watermark {watermark} is ahead of the current time {now}; check the system clock or the seeded watermark")]
    WatermarkAhead {
        watermark: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Another sync holds the single-flight gate.
    #[error("a sync is already in progress")]
    AlreadyRunning,

    /// The orchestration exceeded its wall-clock limit.
    #[error("sync timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Persistence(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
