//! HTTP API for multi-session question answering.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Answer a question within a session |
//! | `GET`  | `/sessions/{id}/history` | Turns recorded for a session |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Request / response
//!
//! ```json
//! POST /query
//! { "query": "Pahalgam attack", "session_id": "optional" }
//!
//! 200 { "response": "...", "kind": "generated", "session_id": "..." }
//! ```
//!
//! A missing `session_id` starts a new session; its id is returned so the
//! client can continue the conversation. The session is only stored once it
//! has a recorded turn. Each session owns its memory, so concurrent
//! requests on different sessions never share history. At most
//! `[server].max_sessions` are kept.
//!
//! # Errors
//!
//! ```json
//! { "error": "query must not be empty" }
//! ```
//!
//! Blank query or malformed body → 400. Missing API key or rejected
//! credentials → 500 with `kind: "config_error"`. Model retries exhausted → 502 with
//! `kind: "model_failure"`. Unknown session on the history route → 404.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends
//! can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::memory::{ConversationMemory, SessionStore};
use crate::models::{Answer, ConversationTurn};
use crate::pipeline::Pipeline;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, max_sessions: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            sessions: Arc::new(SessionStore::new(max_sessions)),
        }
    }
}

/// Build the router. Split out from [`run_server`] so tests can serve it
/// on an ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/query", post(handle_query))
        .route("/sessions/{id}/history", get(handle_history))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config)?;
    let app = router(AppState::new(pipeline, config.server.max_sessions));

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

struct AppError {
    status: StatusCode,
    message: String,
    kind: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            kind: self.kind,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
        kind: None,
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: message.into(),
        kind: None,
    }
}

/// Map an error-kind answer to its HTTP status. `None` for answers that
/// are returned to the client as a normal response.
fn answer_error(answer: &Answer) -> Option<AppError> {
    let status = match answer {
        Answer::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Answer::ModelFailure(_) => StatusCode::BAD_GATEWAY,
        _ => return None,
    };
    Some(AppError {
        status,
        message: answer.text().to_string(),
        kind: Some(answer.kind().as_str()),
    })
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

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct QueryResponse {
    response: String,
    kind: &'static str,
    session_id: String,
}

async fn handle_query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(req) = body.map_err(|rejection| bad_request(rejection.body_text()))?;
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let query = req.query.as_str();

    let existing = req.session_id.filter(|s| !s.trim().is_empty());
    tracing::info!(session = ?existing, "query received");
    tracing::debug!(%query, "query text");

    let (session_id, answer) = match existing {
        Some(id) => {
            let handle = state.sessions.get_or_create(&id).await;
            let mut memory = handle.lock().await;
            let answer = state.pipeline.ask(query, &mut memory).await;
            (id, answer)
        }
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            let mut memory = ConversationMemory::new();
            let answer = state.pipeline.ask(query, &mut memory).await;
            if !memory.is_empty() {
                state.sessions.insert(&id, memory).await;
            }
            (id, answer)
        }
    };

    if let Some(err) = answer_error(&answer) {
        return Err(err);
    }

    Ok(Json(QueryResponse {
        kind: answer.kind().as_str(),
        response: answer.text().to_string(),
        session_id,
    }))
}

// ============ GET /sessions/{id}/history ============

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    turns: Vec<ConversationTurn>,
}

async fn handle_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let handle = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;
    let turns = handle.lock().await.turns().to_vec();
    Ok(Json(HistoryResponse {
        session_id: id,
        turns,
    }))
}
