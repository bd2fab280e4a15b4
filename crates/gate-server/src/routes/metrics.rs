use axum::extract::State;
use axum::Json;
use gate_core::metrics::MetricsSnapshot;

use crate::state::AppState;

/// GET /v1/metrics: counters and the most recent decisions.
pub async fn get_metrics(State(app): State<AppState>) -> Json<MetricsSnapshot> {
    Json(app.orchestrator.metrics().snapshot())
}
