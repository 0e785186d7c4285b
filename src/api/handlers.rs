use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::runs::{self, RunRecord};
use crate::server::AppState;

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub message: &'static str,
    pub prompt: String,
    pub run_id: Uuid,
}

pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "Momentum agent API is running" }))
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".to_string()));
    }

    let run_id = runs::launch(&state.runs, &state.orchestrator, prompt.to_string()).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            message: "Agent run initiated successfully.",
            prompt: prompt.to_string(),
            run_id,
        }),
    ))
}

pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunRecord>, ApiError> {
    state
        .runs
        .get(run_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("run {run_id} not found")))
}
