//! End-to-end tests for the sync orchestrator.
//!
//! Each test runs a real [`SyncEngine`] against a temp-file SQLite database,
//! with `wiremock` servers standing in for the POS API and the indexing
//! service.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pos_sync::config::Config;
use pos_sync::error::SyncError;
use pos_sync::indexer::{DisabledIndexer, HttpIndexer};
use pos_sync::pos_client::PosClient;
use pos_sync::status::sync_history;
use pos_sync::sync::{SyncEngine, SyncOutcome, SyncPhase};
use pos_sync::{db, migrate, watermark, writer};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ─── Fixtures ───────────────────────────────────────────────────────

struct Harness {
    _tmp: TempDir,
    pool: SqlitePool,
    pos: MockServer,
    index: MockServer,
    config: Config,
}

async fn harness(sync_section: &str) -> Harness {
    let tmp = TempDir::new().unwrap();
    let pos = MockServer::start().await;
    let index = MockServer::start().await;
    let config_content = format!(
        r#"
[db]
path = "{}"

[pos]
base_url = "{}"
page_size = 50
timeout_secs = 10

[indexing]
url = "{}/documents"
timeout_secs = 5

{}
"#,
        tmp.path().join("pos.sqlite").display(),
        pos.uri(),
        index.uri(),
        sync_section
    );
    let config: Config = toml::from_str(&config_content).unwrap();
    let pool = db::connect(&config).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();

    Harness {
        _tmp: tmp,
        pool,
        pos,
        index,
        config,
    }
}

impl Harness {
    fn engine(&self) -> SyncEngine {
        let pos = PosClient::new(&self.config.pos, "test-token").unwrap();
        let indexer = HttpIndexer::new(
            self.config.indexing.url.as_deref().unwrap(),
            self.config.indexing.timeout_secs,
        )
        .unwrap();
        SyncEngine::new(
            self.pool.clone(),
            pos,
            Box::new(indexer),
            self.config.sync.clone(),
        )
    }

    fn engine_without_indexer(&self) -> SyncEngine {
        let pos = PosClient::new(&self.config.pos, "test-token").unwrap();
        SyncEngine::new(
            self.pool.clone(),
            pos,
            Box::new(DisabledIndexer),
            self.config.sync.clone(),
        )
    }

    async fn seed(&self, at: DateTime<Utc>) {
        let mut conn = self.pool.acquire().await.unwrap();
        watermark::seed(&mut conn, at).await.unwrap();
    }

    async fn last_sync(&self) -> DateTime<Utc> {
        let mut conn = self.pool.acquire().await.unwrap();
        watermark::get_last_sync(&mut conn).await.unwrap()
    }

    async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    async fn mock_customers(&self, customers: Value) {
        Mock::given(method("GET"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "customers": customers })))
            .mount(&self.pos)
            .await;
    }

    async fn mock_receipts(&self, receipts: Value) {
        Mock::given(method("GET"))
            .and(path("/receipts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "receipts": receipts })))
            .mount(&self.pos)
            .await;
    }

    async fn mock_indexer_ok(&self) {
        Mock::given(method("POST"))
            .and(path("/documents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&self.index)
            .await;
    }

    async fn indexed_batches(&self) -> Vec<Value> {
        self.index
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.body_json::<Value>().unwrap())
            .collect()
    }
}

fn aug_first() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap()
}

fn receipt(number: &str, customer_id: Option<&str>, items: Value) -> Value {
    json!({
        "receipt_number": number,
        "created_at": "2025-08-02T09:30:00Z",
        "total_money": "12.50",
        "total_tax": "1.00",
        "source": "POS",
        "customer_id": customer_id,
        "line_items": items
    })
}

fn customer(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "email": "ana@example.com",
        "phone_number": "+34600000000",
        "total_visits": 7,
        "total_spent": "88.40",
        "updated_at": "2025-08-02T08:00:00Z"
    })
}

// ─── Tests ──────────────────────────────────────────────────────────

/// A receipt whose customer is unknown creates a stub, is inserted once with
/// its line items, produces one forwarded summary, and advances the
/// watermark to the captured `now`.
#[tokio::test]
async fn test_receipt_with_unknown_customer_creates_stub() {
    let h = harness("").await;
    h.seed(aug_first()).await;
    h.mock_customers(json!([])).await;
    h.mock_receipts(json!([receipt(
        "R-100",
        Some("C1"),
        json!([
            { "item_name": "Latte", "quantity": 2, "price": "4.50" },
            { "item_name": "Muffin", "quantity": 1, "price": "3.50" }
        ])
    )]))
    .await;
    h.mock_indexer_ok().await;

    let engine = h.engine();
    let outcome = engine.run().await.unwrap();

    let summary = match outcome {
        SyncOutcome::Synced(s) => s,
        other => panic!("expected Synced, got {:?}", other),
    };
    assert_eq!(summary.window.start, aug_first());
    assert_eq!(summary.receipts_synced, 1);
    assert_eq!(summary.line_items_synced, 2);
    assert_eq!(summary.stubs_created, 1);
    assert_eq!(summary.documents_indexed, 1);
    assert_eq!(engine.last_phase(), SyncPhase::Committed);

    let stub_name: String = sqlx::query_scalar("SELECT name FROM customers WHERE id = 'C1'")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(stub_name, "Unknown Customer");
    assert_eq!(h.count("receipts").await, 1);
    let items: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM line_items WHERE receipt_number = 'R-100'")
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(items, 2);

    let batches = h.indexed_batches().await;
    assert_eq!(batches.len(), 1);
    let docs = batches[0]["documents"].as_array().unwrap();
    assert_eq!(docs.len(), 1);
    let doc = docs[0].as_str().unwrap();
    assert!(doc.starts_with("On 2025-08-02 09:30:00 UTC, receipt R-100 was created totaling $12.50."));
    assert!(doc.ends_with("Items sold: 2 of Latte, 1 of Muffin."));

    assert_eq!(h.last_sync().await, summary.window.end);
}

#[tokio::test]
async fn test_empty_window_is_no_op() {
    let h = harness("").await;
    h.seed(aug_first()).await;
    h.mock_customers(json!([])).await;
    h.mock_receipts(json!([])).await;

    let outcome = h.engine().run().await.unwrap();

    assert!(matches!(outcome, SyncOutcome::NoNewData { .. }));
    assert_eq!(h.last_sync().await, aug_first());
    assert_eq!(sync_history(&h.pool, 10).await.unwrap().len(), 1);
    assert!(h.indexed_batches().await.is_empty());
}

/// A line item failing partway through a receipt discards the whole batch,
/// including customers upserted earlier in the same run.
#[tokio::test]
async fn test_line_item_failure_rolls_back_batch() {
    let h = harness("").await;
    h.seed(aug_first()).await;
    h.mock_customers(json!([customer("C1", "Ana")])).await;
    h.mock_receipts(json!([receipt(
        "R-200",
        Some("C1"),
        json!([
            { "item_name": "Latte", "quantity": 1, "price": "4.50" },
            { "item_name": "Broken", "quantity": 1, "price": "-1.00" }
        ])
    )]))
    .await;
    h.mock_indexer_ok().await;

    let engine = h.engine();
    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, SyncError::Persistence(_)));
    assert_eq!(engine.last_phase(), SyncPhase::Failed);
    assert_eq!(h.count("customers").await, 0);
    assert_eq!(h.count("receipts").await, 0);
    assert_eq!(h.count("line_items").await, 0);
    assert_eq!(h.last_sync().await, aug_first());
    assert!(h.indexed_batches().await.is_empty());
}

#[tokio::test]
async fn test_existing_receipt_number_fails_sync() {
    let h = harness("").await;
    h.seed(aug_first()).await;
    {
        let mut conn = h.pool.acquire().await.unwrap();
        let existing = pos_sync::models::ReceiptRecord {
            receipt_number: "R-300".to_string(),
            created_at: aug_first(),
            total_money: rust_decimal::Decimal::new(500, 2),
            total_tax: rust_decimal::Decimal::ZERO,
            source: None,
            customer_id: None,
            line_items: vec![],
        };
        writer::insert_receipt(&mut conn, &existing).await.unwrap();
    }
    h.mock_customers(json!([])).await;
    h.mock_receipts(json!([receipt(
        "R-300",
        None,
        json!([{ "item_name": "Tea", "quantity": 1, "price": "2.00" }])
    )]))
    .await;
    h.mock_indexer_ok().await;

    let err = h.engine().run().await.unwrap_err();

    assert!(matches!(err, SyncError::DuplicateReceipt { ref receipt_number } if receipt_number == "R-300"));
    assert_eq!(h.count("receipts").await, 1);
    assert_eq!(h.count("line_items").await, 0);
    assert_eq!(h.last_sync().await, aug_first());
}

#[tokio::test]
async fn test_indexing_failure_rolls_back() {
    let h = harness("").await;
    h.seed(aug_first()).await;
    h.mock_customers(json!([customer("C1", "Ana")])).await;
    h.mock_receipts(json!([receipt(
        "R-400",
        Some("C1"),
        json!([{ "item_name": "Latte", "quantity": 1, "price": "4.50" }])
    )]))
    .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("indexer down"))
        .mount(&h.index)
        .await;

    let err = h.engine().run().await.unwrap_err();

    assert!(matches!(err, SyncError::IndexingUnavailable(_)));
    assert_eq!(h.count("customers").await, 0);
    assert_eq!(h.count("receipts").await, 0);
    assert_eq!(h.last_sync().await, aug_first());
}

#[tokio::test]
async fn test_receipt_fetch_failure_discards_customers() {
    let h = harness("").await;
    h.seed(aug_first()).await;
    h.mock_customers(json!([customer("C1", "Ana")])).await;
    Mock::given(method("GET"))
        .and(path("/receipts"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&h.pos)
        .await;

    let err = h.engine().run().await.unwrap_err();

    assert!(matches!(err, SyncError::RemoteFetch(_)));
    assert_eq!(h.count("customers").await, 0);
    assert_eq!(h.last_sync().await, aug_first());
}

/// Repeated syncs re-deliver the same customer: one row remains, and each
/// watermark entry equals that run's captured `now`, in increasing order.
#[tokio::test]
async fn test_watermark_log_is_monotonic() {
    let h = harness("").await;
    h.seed(aug_first()).await;
    h.mock_customers(json!([{
        "id": "C1", "name": "Ana", "total_visits": 2, "total_spent": 10,
        "updated_at": "2025-08-02T08:00:00Z"
    }]))
    .await;
    h.mock_receipts(json!([])).await;

    let engine = h.engine();
    let mut ends = Vec::new();
    for _ in 0..3 {
        match engine.run().await.unwrap() {
            SyncOutcome::Synced(s) => ends.push(s.window.end),
            other => panic!("expected Synced, got {:?}", other),
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let log = sync_history(&h.pool, 10).await.unwrap();
    assert_eq!(log.len(), 4);
    let mut stamps: Vec<DateTime<Utc>> = log.iter().map(|e| e.last_sync_timestamp).collect();
    stamps.reverse();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(&stamps[1..], &ends[..]);
    assert_eq!(h.count("customers").await, 1);
}

#[tokio::test]
async fn test_missing_watermark_is_reported() {
    let h = harness("").await;
    h.mock_customers(json!([])).await;
    h.mock_receipts(json!([])).await;

    let err = h.engine().run().await.unwrap_err();

    assert!(matches!(err, SyncError::NoWatermark));
    assert!(h.pos.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_configured_initial_watermark_used_on_first_run() {
    let h = harness(
        r#"
[sync]
initial_watermark = "2025-08-01T00:00:00Z"
"#,
    )
    .await;
    h.mock_customers(json!([customer("C1", "Ana")])).await;
    h.mock_receipts(json!([])).await;

    let outcome = h.engine().run().await.unwrap();

    match outcome {
        SyncOutcome::Synced(s) => {
            assert_eq!(s.window.start, aug_first());
            assert_eq!(s.customers_synced, 1);
            assert_eq!(h.last_sync().await, s.window.end);
        }
        other => panic!("expected Synced, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_trigger_is_rejected() {
    let h = harness("").await;
    h.seed(aug_first()).await;
    Mock::given(method("GET"))
        .and(path("/customers"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "customers": [] }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&h.pos)
        .await;
    h.mock_receipts(json!([])).await;

    let engine = h.engine();
    let (first, second) = tokio::join!(engine.run(), engine.run());

    assert!(matches!(first, Ok(SyncOutcome::NoNewData { .. })));
    assert!(matches!(second, Err(SyncError::AlreadyRunning)));
}

#[tokio::test]
async fn test_orchestration_timeout_rolls_back() {
    let h = harness(
        r#"
[sync]
timeout_secs = 1
"#,
    )
    .await;
    h.seed(aug_first()).await;
    h.mock_customers(json!([customer("C1", "Ana")])).await;
    Mock::given(method("GET"))
        .and(path("/receipts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "receipts": [] }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&h.pos)
        .await;

    let engine = h.engine();
    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, SyncError::TimedOut(_)));
    assert_eq!(engine.last_phase(), SyncPhase::Failed);
    assert_eq!(h.last_sync().await, aug_first());
    assert_eq!(h.count("customers").await, 0);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let h = harness("").await;
    h.seed(aug_first()).await;
    h.mock_customers(json!([customer("C1", "Ana")])).await;
    h.mock_receipts(json!([receipt(
        "R-500",
        Some("C1"),
        json!([{ "item_name": "Latte", "quantity": 3, "price": "4.50" }])
    )]))
    .await;

    let preview = h.engine().preview().await.unwrap();

    assert_eq!(preview.customers, 1);
    assert_eq!(preview.receipts, 1);
    assert_eq!(preview.line_items, 1);
    assert_eq!(h.count("customers").await, 0);
    assert_eq!(h.last_sync().await, aug_first());
}

/// Without an indexing service, receipts must not be committed: their
/// summaries would be lost behind the advanced watermark.
#[tokio::test]
async fn test_receipts_without_indexer_are_not_committed() {
    let h = harness("").await;
    h.seed(aug_first()).await;
    h.mock_customers(json!([customer("C1", "Ana")])).await;
    h.mock_receipts(json!([receipt(
        "R-600",
        Some("C1"),
        json!([{ "item_name": "Latte", "quantity": 1, "price": "4.50" }])
    )]))
    .await;

    let engine = h.engine_without_indexer();
    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, SyncError::IndexingUnavailable(_)));
    assert_eq!(engine.last_phase(), SyncPhase::Failed);
    assert_eq!(h.count("customers").await, 0);
    assert_eq!(h.count("receipts").await, 0);
    assert_eq!(h.last_sync().await, aug_first());
}

#[tokio::test]
async fn test_customers_only_sync_needs_no_indexer() {
    let h = harness("").await;
    h.seed(aug_first()).await;
    h.mock_customers(json!([customer("C1", "Ana")])).await;
    h.mock_receipts(json!([])).await;

    let outcome = h.engine_without_indexer().run().await.unwrap();

    match outcome {
        SyncOutcome::Synced(s) => {
            assert_eq!(s.customers_synced, 1);
            assert_eq!(s.documents_indexed, 0);
            assert_eq!(h.last_sync().await, s.window.end);
        }
        other => panic!("expected Synced, got {:?}", other),
    }
}

#[tokio::test]
async fn test_future_watermark_is_reported() {
    let h = harness("").await;
    let ahead = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap();
    h.seed(ahead).await;

    let err = h.engine().run().await.unwrap_err();

    assert!(matches!(err, SyncError::WatermarkAhead { watermark, .. } if watermark == ahead));
    assert!(h.pos.received_requests().await.unwrap().is_empty());
    assert_eq!(h.last_sync().await, ahead);
}

/// Work that finishes inside the time limit is committed and reported as
/// committed, even when little of the limit is left for the commit.
#[tokio::test]
async fn test_work_finishing_near_deadline_commits() {
    let h = harness(
        r#"
[sync]
timeout_secs = 1
"#,
    )
    .await;
    h.seed(aug_first()).await;
    Mock::given(method("GET"))
        .and(path("/customers"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "customers": [customer("C1", "Ana")] }))
                .set_delay(Duration::from_millis(700)),
        )
        .mount(&h.pos)
        .await;
    h.mock_receipts(json!([])).await;

    let engine = h.engine();
    let outcome = engine.run().await.unwrap();

    let SyncOutcome::Synced(summary) = outcome else {
        panic!("expected Synced");
    };
    assert_eq!(engine.last_phase(), SyncPhase::Committed);
    assert_eq!(h.last_sync().await, summary.window.end);
    assert_eq!(h.count("customers").await, 1);
}
