//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/answers` | Answer a requirement (cached per `requirement_id`) |
//! | `GET` | `/answers?prefix=` | List cached answers |
//! | `GET` | `/answers/{id}` | Fetch one cached answer |
//! | `DELETE` | `/answers/{id}` | Drop a cached answer |
//! | `POST` | `/evidence` | Consolidate pre-scored candidates |
//! | `DELETE` | `/sessions/{id}` | Forget a rotation session |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "requirement_id must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `internal` (500).

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use policy_audit_core::consolidate::{ConsolidateParams, ConsolidatedEvidence, EvidenceRequest};
use policy_audit_core::models::{Answer, AnswerRecord};

use crate::answer::{AnswerOutcome, AnswerService, DEFAULT_SESSION};
use crate::config::Config;
use crate::db;
use crate::evidence::consolidate_request;
use crate::sqlite_store::SqliteStore;

#[derive(Clone)]
struct AppState {
    service: AnswerService,
    evidence: ConsolidateParams,
}

/// Build the router. Separate from [`run_server`] so tests can serve it on
/// an ephemeral port.
pub fn router(service: AnswerService, evidence: ConsolidateParams) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/answers", post(handle_answer).get(handle_list_answers))
        .route(
            "/answers/{id}",
            get(handle_get_answer).delete(handle_delete_answer),
        )
        .route("/evidence", post(handle_evidence))
        .route("/sessions/{id}", delete(handle_reset_session))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { service, evidence })
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let service = AnswerService::new(Arc::new(SqliteStore::new(pool)), &config.engine);
    let app = router(service, config.evidence.params());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "audit server listening");
    println!("Audit server listening on http://{}", config.server.bind);

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
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        code: "timeout",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

/// Validation failures surface as 400, everything else as 500.
fn classify(err: anyhow::Error) -> AppError {
    let msg = format!("{:#}", err);
    if msg.contains("must not be empty") || msg.contains("invalid") {
        bad_request(msg)
    } else {
        tracing::error!(error = %msg, "request failed");
        internal(msg)
    }
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v)
        .map_err(|rejection| bad_request(rejection.body_text()))
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

// ============ /answers ============

#[derive(Deserialize)]
struct AnswerBody {
    #[serde(alias = "question_id")]
    requirement_id: String,
    #[serde(alias = "question")]
    requirement: String,
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    refresh: bool,
}

async fn handle_answer(
    State(state): State<AppState>,
    body: Result<Json<AnswerBody>, JsonRejection>,
) -> Result<Json<AnswerOutcome>, AppError> {
    let body = json_body(body)?;
    let session = body.session.as_deref().unwrap_or(DEFAULT_SESSION);
    let outcome = state
        .service
        .answer(&body.requirement_id, &body.requirement, session, body.refresh)
        .await
        .map_err(classify)?;

    if let Answer::Error { message } = &outcome.record.answer {
        return Err(if message.contains("timed out") {
            timeout_error(message.clone())
        } else {
            internal(message.clone())
        });
    }
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct ListQuery {
    prefix: Option<String>,
}

#[derive(Serialize)]
struct AnswerList {
    answers: Vec<AnswerRecord>,
}

async fn handle_list_answers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<AnswerList>, AppError> {
    let answers = state
        .service
        .store()
        .list_answers(query.prefix.as_deref())
        .await
        .map_err(classify)?;
    Ok(Json(AnswerList { answers }))
}

async fn handle_get_answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AnswerRecord>, AppError> {
    state
        .service
        .store()
        .get_answer(&id)
        .await
        .map_err(classify)?
        .map(Json)
        .ok_or_else(|| not_found(format!("no answer for requirement: {}", id)))
}

async fn handle_delete_answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state
        .service
        .store()
        .delete_answer(&id)
        .await
        .map_err(classify)?;
    if !deleted {
        return Err(not_found(format!("no answer for requirement: {}", id)));
    }
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// ============ POST /evidence ============

async fn handle_evidence(
    State(state): State<AppState>,
    body: Result<Json<EvidenceRequest>, JsonRejection>,
) -> Result<Json<ConsolidatedEvidence>, AppError> {
    let request = json_body(body)?;
    consolidate_request(&request, &state.evidence)
        .map(Json)
        .map_err(classify)
}

// ============ DELETE /sessions/{id} ============

async fn handle_reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.service.registry().reset(&id) {
        return Err(not_found(format!("no rotation session: {}", id)));
    }
    Ok(Json(serde_json::json!({ "reset": id })))
}
