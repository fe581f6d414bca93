use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use betrace_common::span::Span;
use betrace_common::time::now_unix_ns;

use super::AppState;

/// One decoded span in, no violation reply: firings travel to the exporter
/// out of band. 202 regardless of backpressure; drops show up in stats.
pub async fn ingest_span(
    State(state): State<AppState>,
    Json(span): Json<Span>,
) -> (StatusCode, Json<serde_json::Value>) {
    let accepted = state.service.engine().submit(span, now_unix_ns()).await;
    (StatusCode::ACCEPTED, Json(json!({ "accepted": accepted })))
}

/// Synchronous rule debugging: evaluates the span against the active
/// span-scoped rules and returns the matches instead of exporting them.
pub async fn evaluate_span(
    State(state): State<AppState>,
    Json(span): Json<Span>,
) -> Json<serde_json::Value> {
    let span_id = span.span_id.clone();
    let matches = state.service.engine().evaluate_span(&span, now_unix_ns());
    Json(json!({
        "span_id": span_id,
        "matches": matches,
    }))
}

#[derive(Deserialize)]
pub struct EvaluateBatchRequest {
    pub spans: Vec<Span>,
}

/// Batch variant of `evaluate_span`: one result entry per span, in request
/// order, all against the same firing timestamp.
pub async fn evaluate_batch(
    State(state): State<AppState>,
    Json(body): Json<EvaluateBatchRequest>,
) -> Json<serde_json::Value> {
    let now = now_unix_ns();
    let engine = state.service.engine();
    let results: Vec<serde_json::Value> = body
        .spans
        .iter()
        .map(|span| {
            json!({
                "span_id": span.span_id,
                "matches": engine.evaluate_span(span, now),
            })
        })
        .collect();
    Json(json!({ "results": results }))
}

/// Operator flush: close and evaluate every open trace context now.
pub async fn flush_traces(State(state): State<AppState>) -> Json<serde_json::Value> {
    let flushed = state.service.engine().flush_traces().await;
    Json(json!({ "flushed_traces": flushed }))
}
