use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::checkpoint::CheckpointStore;
use super::engine::{JourneyEngine, JourneyError};

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    /// Defaults to the new thread id when absent or blank.
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    #[serde(default)]
    pub value: Value,
}

/// Router builder exposing the journey boundary over HTTP.
pub fn journey_router<C>(engine: Arc<JourneyEngine<C>>) -> Router
where
    C: CheckpointStore + 'static,
{
    Router::new()
        .route("/api/v1/journeys", post(start_handler::<C>))
        .route("/api/v1/journeys/:thread_id", get(state_handler::<C>))
        .route("/api/v1/journeys/:thread_id/resume", post(resume_handler::<C>))
        .route("/api/v1/journeys/:thread_id/reset", post(reset_handler::<C>))
        .with_state(engine)
}

fn error_response(error: JourneyError) -> Response {
    let status = match &error {
        JourneyError::ThreadNotFound(_) => StatusCode::NOT_FOUND,
        JourneyError::ResumeMismatch { .. } => StatusCode::CONFLICT,
        JourneyError::GuardExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        JourneyError::UnknownStep(_) | JourneyError::Checkpoint(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = match &error {
        JourneyError::GuardExceeded {
            thread_id,
            guard_counter,
            limit,
        } => json!({
            "error": error.to_string(),
            "thread_id": thread_id,
            "termination": "guard_exceeded",
            "guard_counter": guard_counter,
            "limit": limit,
        }),
        _ => json!({
            "error": error.to_string(),
        }),
    };
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn start_handler<C>(
    State(engine): State<Arc<JourneyEngine<C>>>,
    axum::Json(request): axum::Json<StartRequest>,
) -> Response
where
    C: CheckpointStore + 'static,
{
    let user_id = request.user_id.unwrap_or_default();
    match engine.start(&user_id).await {
        Ok(outcome) => (StatusCode::CREATED, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn resume_handler<C>(
    State(engine): State<Arc<JourneyEngine<C>>>,
    Path(thread_id): Path<String>,
    axum::Json(request): axum::Json<ResumeRequest>,
) -> Response
where
    C: CheckpointStore + 'static,
{
    match engine.resume(&thread_id, request.value).await {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn state_handler<C>(
    State(engine): State<Arc<JourneyEngine<C>>>,
    Path(thread_id): Path<String>,
) -> Response
where
    C: CheckpointStore + 'static,
{
    match engine.get_state(&thread_id) {
        Ok(snapshot) => (StatusCode::OK, axum::Json(snapshot)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reset_handler<C>(
    State(engine): State<Arc<JourneyEngine<C>>>,
    Path(thread_id): Path<String>,
) -> Response
where
    C: CheckpointStore + 'static,
{
    match engine.reset(&thread_id).await {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}
