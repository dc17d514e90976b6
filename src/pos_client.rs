//! POS API client.
//!
//! Fetches customers and receipts created inside a [`SyncWindow`] using
//! `GET /customers` and `GET /receipts` with bearer-token auth. Payloads are
//! decoded into private wire structs and converted to the crate's typed
//! records, so nothing downstream depends on the API's field names.
//!
//! # Pagination
//!
//! Each request asks for `limit = pos.page_size` items. When the response
//! carries a non-empty `cursor`, the next page is requested with
//! `cursor=<value>` until the cursor is absent. At most `pos.max_pages`
//! pages are read per entity type; a window that needs more fails the fetch
//! instead of silently truncating it.
//!
//! # Window bounds
//!
//! The API's `created_at_max` filter is inclusive, so records created exactly
//! at the window end are dropped client-side to keep the window closed-open.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};

use crate::config::{self, Config, PosConfig};
use crate::error::{SyncError, SyncResult};
use crate::models::{format_instant, CustomerRecord, LineItemRecord, ReceiptRecord, SyncWindow};

#[derive(Clone)]
pub struct PosClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    page_size: usize,
    max_pages: usize,
}

impl PosClient {
    pub fn new(config: &PosConfig, token: impl Into<String>) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::RemoteFetch(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            page_size: config.page_size,
            max_pages: config.max_pages,
        })
    }

    /// Builds a client from config, reading the token from `POS_API_TOKEN`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let token = config::pos_token()?;
        Ok(Self::new(&config.pos, token)?)
    }

    pub async fn fetch_customers(&self, window: &SyncWindow) -> SyncResult<Vec<CustomerRecord>> {
        let customers: Vec<ApiCustomer> = self.fetch_all::<CustomerPage>("customers", window).await?;
        Ok(customers
            .into_iter()
            .filter(|c| c.created_at.map_or(true, |at| window.contains(&at)))
            .map(CustomerRecord::from)
            .collect())
    }

    pub async fn fetch_receipts(&self, window: &SyncWindow) -> SyncResult<Vec<ReceiptRecord>> {
        let receipts: Vec<ApiReceipt> = self.fetch_all::<ReceiptPage>("receipts", window).await?;
        Ok(receipts
            .into_iter()
            .filter(|r| window.contains(&r.created_at))
            .map(ReceiptRecord::from)
            .collect())
    }

    async fn fetch_all<P>(&self, resource: &str, window: &SyncWindow) -> SyncResult<Vec<P::Item>>
    where
        P: Page + DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, resource);
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for page_no in 0..self.max_pages {
            let mut query = vec![
                ("created_at_min", format_instant(&window.start)),
                ("created_at_max", format_instant(&window.end)),
                ("limit", self.page_size.to_string()),
            ];
            if let Some(ref c) = cursor {
                query.push(("cursor", c.clone()));
            }

            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await
                .map_err(|e| SyncError::RemoteFetch(format!("GET /{}: {}", resource, e)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::RemoteFetch(format!(
                    "GET /{} returned {}: {}",
                    resource, status, body
                )));
            }

            let body = response
                .text()
                .await
                .map_err(|e| SyncError::RemoteFetch(format!("GET /{}: {}", resource, e)))?;
            let page: P = serde_json::from_str(&body).map_err(|e| {
                SyncError::RemoteFetch(format!("GET /{}: invalid payload: {}", resource, e))
            })?;
            let (page_items, next) = page.into_parts();
            tracing::debug!(resource, page = page_no, count = page_items.len(), "fetched page");
            items.extend(page_items);

            match next.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => return Ok(items),
            }
        }

        Err(SyncError::RemoteFetch(format!(
            "GET /{}: window needs more than {} pages of {}",
            resource, self.max_pages, self.page_size
        )))
    }
}

// ============ Wire format ============

trait Page {
    type Item;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

#[derive(Deserialize)]
struct CustomerPage {
    #[serde(default)]
    customers: Vec<ApiCustomer>,
    #[serde(default)]
    cursor: Option<String>,
}

impl Page for CustomerPage {
    type Item = ApiCustomer;
    fn into_parts(self) -> (Vec<ApiCustomer>, Option<String>) {
        (self.customers, self.cursor)
    }
}

#[derive(Deserialize)]
struct ReceiptPage {
    #[serde(default)]
    receipts: Vec<ApiReceipt>,
    #[serde(default)]
    cursor: Option<String>,
}

impl Page for ReceiptPage {
    type Item = ApiReceipt;
    fn into_parts(self) -> (Vec<ApiReceipt>, Option<String>) {
        (self.receipts, self.cursor)
    }
}

#[derive(Deserialize)]
struct ApiCustomer {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    total_visits: i64,
    #[serde(default)]
    total_spent: Decimal,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<ApiCustomer> for CustomerRecord {
    fn from(c: ApiCustomer) -> Self {
        CustomerRecord {
            id: c.id,
            name: c.name,
            email: c.email,
            phone: c.phone_number,
            total_visits: c.total_visits,
            total_spent: c.total_spent,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Deserialize)]
struct ApiReceipt {
    receipt_number: String,
    created_at: DateTime<Utc>,
    total_money: Decimal,
    #[serde(default)]
    total_tax: Decimal,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    customer_id: Option<String>,
    #[serde(default)]
    line_items: Vec<ApiLineItem>,
}

impl From<ApiReceipt> for ReceiptRecord {
    fn from(r: ApiReceipt) -> Self {
        ReceiptRecord {
            receipt_number: r.receipt_number,
            created_at: r.created_at,
            total_money: r.total_money,
            total_tax: r.total_tax,
            source: r.source,
            customer_id: r.customer_id.filter(|id| !id.is_empty()),
            line_items: r
                .line_items
                .into_iter()
                .map(|li| LineItemRecord {
                    item_name: li.item_name,
                    quantity: li.quantity,
                    price: li.price,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct ApiLineItem {
    item_name: String,
    #[serde(deserialize_with = "whole_quantity")]
    quantity: i64,
    price: Decimal,
}

/// The API reports quantities as JSON numbers that may carry a `.0`.
/// Only positive whole numbers that fit an `i64` are accepted.
fn whole_quantity<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.fract() != 0.0 {
        return Err(D::Error::custom(format!("fractional quantity {}", raw)));
    }
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    if raw < 1.0 || raw >= i64::MAX as f64 {
        return Err(D::Error::custom(format!("quantity {} out of range", raw)));
    }
    Ok(raw as i64)
}
