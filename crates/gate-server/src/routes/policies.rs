use axum::extract::{Path, State};
use axum::Json;
use gate_core::policy::{PolicySnapshot, PolicyStore};
use gate_core::types::{CommandType, Policy, PolicyMode};
use gate_core::GateError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

/// GET /v1/policies: the current snapshot with its version.
pub async fn list_policies(State(app): State<AppState>) -> Json<PolicySnapshot> {
    Json(app.policies.snapshot().as_ref().clone())
}

#[derive(Debug, Deserialize)]
pub struct PolicyBody {
    mode: PolicyMode,
    #[serde(default)]
    rationale: String,
}

/// PUT /v1/policies/{command_type}: insert or replace. Actions already in
/// flight keep the snapshot they started with.
pub async fn put_policy(
    State(app): State<AppState>,
    Path(command_type): Path<String>,
    Json(body): Json<PolicyBody>,
) -> Result<Json<Value>, AppError> {
    let command_type = CommandType::new(command_type).map_err(GateError::from)?;
    let policy = Policy::new(command_type, body.mode, body.rationale);
    let version = app.policies.upsert(policy.clone());
    tracing::info!(command_type = %policy.command_type, mode = %policy.mode, version, "policy updated");
    Ok(Json(json!({ "version": version, "policy": policy })))
}

/// DELETE /v1/policies/{command_type}
pub async fn delete_policy(
    State(app): State<AppState>,
    Path(command_type): Path<String>,
) -> Result<Json<Value>, AppError> {
    let command_type = CommandType::new(command_type).map_err(GateError::from)?;
    let removed = app
        .policies
        .remove(&command_type)
        .ok_or_else(|| GateError::PolicyNotFound(command_type.to_string()))?;
    tracing::info!(command_type = %removed.command_type, "policy removed");
    Ok(Json(json!({
        "version": app.policies.snapshot().version(),
        "removed": removed,
    })))
}
