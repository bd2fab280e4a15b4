use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use gate_core::ledger::{ActionRecord, ActionStatus, FailureKind};
use gate_core::types::Command;
use gate_core::Outcome;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 1000;

/// HTTP status for a recorded outcome. Business outcomes are 200; FAILED
/// maps to the kind of infrastructure failure.
pub fn status_for(outcome: &Outcome) -> StatusCode {
    match (outcome.status, outcome.failure) {
        (ActionStatus::Failed, Some(FailureKind::RemoteError)) => StatusCode::BAD_GATEWAY,
        (ActionStatus::Failed, Some(FailureKind::Timeout)) => StatusCode::GATEWAY_TIMEOUT,
        (ActionStatus::Failed, Some(FailureKind::InvalidParams)) => StatusCode::UNPROCESSABLE_ENTITY,
        (ActionStatus::Failed, Some(FailureKind::Cancelled)) => StatusCode::SERVICE_UNAVAILABLE,
        (ActionStatus::Failed, None) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    }
}

/// POST /v1/actions: submit a command and wait for its terminal state.
///
/// The submission runs on its own task. If the client goes away the drop
/// guard cancels it, and the task still records the action as CANCELLED.
pub async fn submit_action(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Outcome>), AppError> {
    let command: Command = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("invalid command: {e}")))?;

    let (handle, token) = app.orchestrator.spawn_submission(command);
    let _guard = token.drop_guard();
    let outcome = handle
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok((status_for(&outcome), Json(outcome)))
}

/// GET /v1/actions/{action_id}
pub async fn get_action(
    State(app): State<AppState>,
    Path(action_id): Path<String>,
) -> Result<Json<ActionRecord>, AppError> {
    match app.orchestrator.ledger().get(&action_id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::not_found(format!("action '{action_id}' not found"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    limit: Option<usize>,
}

/// GET /v1/actions?limit=N: newest first.
pub async fn list_actions(
    State(app): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<ActionRecord>>, AppError> {
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    Ok(Json(app.orchestrator.ledger().list(limit).await?))
}
