use axum::extract::State;
use axum::Json;
use serde_json::json;

use super::AppState;

pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let engine = state.service.engine();
    Json(json!({
        "status": "healthy",
        "rules": engine.rule_count(),
        "spans_submitted": engine.stats().submitted(),
        "spans_dropped": engine.stats().dropped(),
        "violations": engine.stats().violations(),
        "traces_evicted": engine.evicted_traces(),
    }))
}
