//! HTTP surface for code submission

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::ExecutionRequest;
use crate::engine::ExecutionEngine;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ExecutionEngine>,
}

impl AppState {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self { engine }
    }
}

/// Body of `POST /submitcode`
#[derive(Debug, Deserialize)]
pub struct SubmitCodeRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: String,
    /// Java class name
    #[serde(default)]
    pub filename: Option<String>,
}

impl From<SubmitCodeRequest> for ExecutionRequest {
    fn from(body: SubmitCodeRequest) -> Self {
        Self {
            language: body.language,
            source_code: body.code,
            stdin: body.input,
            aux_filename: body.filename,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitCodeResponse {
    pub ans: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/submitcode", post(submit_code))
        .route("/languages", get(list_languages))
        .route("/health", get(health))
        .with_state(state)
}

/// POST /submitcode
async fn submit_code(
    State(state): State<AppState>,
    Json(body): Json<SubmitCodeRequest>,
) -> Response {
    let request = ExecutionRequest::from(body);
    info!(
        "Received submission: language={}, code_bytes={}, input_bytes={}",
        request.language,
        request.source_code.len(),
        request.stdin.len()
    );

    match state.engine.run(&request).await {
        Ok(outcome) => Json(SubmitCodeResponse { ans: outcome.text }).into_response(),
        Err(e) if e.is_request_error() => {
            warn!("Rejected submission: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Unexpected Input" })),
            )
                .into_response()
        }
        Err(e) => {
            // Details stay in the log; callers only learn that it failed
            error!("Execution failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

/// GET /languages
async fn list_languages(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.engine.languages().supported())
}

/// GET /health
async fn health(State(state): State<AppState>) -> Response {
    if state.engine.is_ready().await {
        Json(json!({ "status": "ok" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        )
            .into_response()
    }
}
