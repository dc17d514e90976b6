//! Indexing collaborator abstraction.
//!
//! Receipt summaries produced during a sync are handed to an external
//! indexing/embedding service in a single call per batch. Implementations:
//! - **[`HttpIndexer`]** — `POST {indexing.url}` with `{"documents": [...]}`.
//! - **[`DisabledIndexer`]** — used when `indexing.url` is not configured.
//!   It accepts an empty batch and refuses any other, so receipts are never
//!   committed behind the watermark without their summaries.
//!
//! Any failure (transport, timeout, non-2xx) is reported as
//! [`SyncError::IndexingUnavailable`] and aborts the surrounding sync, so the
//! watermark never advances past documents the indexer did not receive.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::IndexingConfig;
use crate::error::{SyncError, SyncResult};

#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Short label used in logs (e.g. `"http"`, `"disabled"`).
    fn name(&self) -> &str;

    /// Delivers one batch of documents. All-or-nothing from the caller's view.
    async fn index(&self, documents: &[String]) -> SyncResult<()>;
}

/// Creates the indexer configured by `[indexing]`.
pub fn create_indexer(config: &IndexingConfig) -> SyncResult<Box<dyn DocumentIndex>> {
    match config.url {
        Some(ref url) => Ok(Box::new(HttpIndexer::new(url, config.timeout_secs)?)),
        None => Ok(Box::new(DisabledIndexer)),
    }
}

// ============ Disabled ============

pub struct DisabledIndexer;

#[async_trait]
impl DocumentIndex for DisabledIndexer {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn index(&self, documents: &[String]) -> SyncResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        tracing::warn!(
            count = documents.len(),
            "indexing.url not configured; refusing to drop receipt summaries"
        );
        Err(SyncError::IndexingUnavailable(format!(
            "indexing.url is not configured; {} receipt summaries cannot be forwarded",
            documents.len()
        )))
    }
}

// ============ HTTP ============

pub struct HttpIndexer {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct IndexRequest<'a> {
    documents: &'a [String],
}

impl HttpIndexer {
    pub fn new(url: &str, timeout_secs: u64) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SyncError::IndexingUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl DocumentIndex for HttpIndexer {
    fn name(&self) -> &str {
        "http"
    }

    async fn index(&self, documents: &[String]) -> SyncResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&IndexRequest { documents })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SyncError::IndexingUnavailable(format!("timed out calling {}", self.url))
                } else {
                    SyncError::IndexingUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::IndexingUnavailable(format!(
                "indexer returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}
