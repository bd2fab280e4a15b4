use axum::extract::State;
use axum::Json;
use gate_core::policy::PolicyStore;
use gate_core::types::{Command, CommandType, Params, Severity};
use gate_core::validator::{assess, Assessment, Decision};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateBody {
    command_type: String,
    #[serde(default)]
    params: Params,
    #[serde(default)]
    severity: Option<Severity>,
}

/// POST /v1/validate: dry-run the validator. No record, no judges, no
/// dispatch. A configured risk screen also runs unless policy already blocks.
pub async fn validate_command(
    State(app): State<AppState>,
    Json(body): Json<ValidateBody>,
) -> Result<Json<Assessment>, AppError> {
    let command_type = CommandType::new(body.command_type).map_err(gate_core::GateError::from)?;
    let command = Command::new("dry-run", command_type, body.params, body.severity);
    let snapshot = app.policies.snapshot();
    let mut assessment = assess(&command, &snapshot).map_err(gate_core::GateError::from)?;
    if assessment.decision != Decision::Block {
        if let Some(report) = app.orchestrator.prescreen(&command).await {
            assessment = assessment.with_screen(report);
        }
    }
    Ok(Json(assessment))
}
