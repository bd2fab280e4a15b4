use axum::extract::State;
use axum::Json;
use gate_core::policy::PolicyStore;
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
pub async fn health(State(app): State<AppState>) -> Json<Value> {
    let orch = &app.orchestrator;
    let panel = orch.panel();
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "started_at": app.started_at,
        "tools_registered": orch.bridge().tools_registered(),
        "components": {
            "validator": true,
            "judge": !panel.is_empty(),
            "judges": panel.judge_ids(),
            "policies": app.policies.snapshot().len(),
            "ledger": app.ledger_kind,
            "signing": app.signing.is_enabled(),
            "circuit": orch.breaker().map(|b| b.state()),
            "screen": orch.screen().is_some(),
        }
    }))
}
