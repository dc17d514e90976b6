//! HTTP surface for triggering and inspecting syncs.
//!
//! A thin axum layer over [`SyncEngine`], the sync status view and the
//! analysis forwarder.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/sync-status` | Latest watermark, or "no sync yet" |
//! | `POST` | `/sync` | Run one sync and return its counters |
//! | `POST` | `/chat` | Forward `{question}` to the analysis service |
//! | `POST` | `/analyze` | Forward `{question}` to the analysis service |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "sync_failed", "message": "sync failed" } }
//! ```
//!
//! Internal causes are logged server-side and never returned to callers.
//! Error codes: `bad_request` (400), `sync_in_progress` (409),
//! `sync_failed` (500), `internal` (500), `analysis_failed` (502),
//! `analysis_unavailable` (503).

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::analysis::AnalysisClient;
use crate::config::Config;
use crate::db;
use crate::error::SyncError;
use crate::status::{sync_status, SyncStatus};
use crate::sync::{SyncEngine, SyncOutcome};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<SyncEngine>,
    analysis: Option<AnalysisClient>,
}

/// Starts the HTTP server using the configured POS source and indexer.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let engine = SyncEngine::from_config(config, pool)?;
    serve(config, Arc::new(engine)).await
}

/// Serves the API on `[server].bind` with an already-built engine.
pub async fn serve(config: &Config, engine: Arc<SyncEngine>) -> anyhow::Result<()> {
    let state = AppState {
        engine,
        analysis: AnalysisClient::from_config(&config.analysis)?,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/sync-status", get(handle_sync_status))
        .route("/sync", post(handle_sync))
        .route("/chat", post(handle_chat))
        .route("/analyze", post(handle_analyze))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "HTTP server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message.to_string(),
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &'static str, message: &'static str) -> AppError {
    AppError {
        status,
        code,
        message,
    }
}

/// Maps a sync failure to a generic response; the cause stays in the log.
fn sync_error(err: SyncError) -> AppError {
    match err {
        SyncError::AlreadyRunning => app_error(
            StatusCode::CONFLICT,
            "sync_in_progress",
            "a sync is already in progress",
        ),
        other => {
            tracing::error!(error = %other, "sync request failed");
            app_error(StatusCode::INTERNAL_SERVER_ERROR, "sync_failed", "sync failed")
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /sync-status ============

async fn handle_sync_status(State(state): State<AppState>) -> Result<Json<SyncStatus>, AppError> {
    sync_status(state.engine.pool()).await.map(Json).map_err(|e| {
        tracing::error!(error = %e, "failed to read sync status");
        app_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "could not read sync status",
        )
    })
}

// ============ POST /sync ============

async fn handle_sync(State(state): State<AppState>) -> Result<Json<SyncOutcome>, AppError> {
    state.engine.run().await.map(Json).map_err(sync_error)
}

// ============ POST /chat, /analyze ============

#[derive(Deserialize)]
struct QuestionRequest {
    question: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<QuestionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    forward_question(&state, "chat", &req.question).await
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<QuestionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    forward_question(&state, "analyze", &req.question).await
}

async fn forward_question(
    state: &AppState,
    endpoint: &str,
    question: &str,
) -> Result<Json<serde_json::Value>, AppError> {
    if question.trim().is_empty() {
        return Err(app_error(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "question must not be empty",
        ));
    }

    let client = state.analysis.as_ref().ok_or_else(|| {
        app_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "analysis_unavailable",
            "analysis service is not configured",
        )
    })?;

    client.ask(endpoint, question).await.map(Json).map_err(|e| {
        tracing::error!(endpoint, error = %e, "analysis request failed");
        app_error(
            StatusCode::BAD_GATEWAY,
            "analysis_failed",
            "analysis request failed",
        )
    })
}
