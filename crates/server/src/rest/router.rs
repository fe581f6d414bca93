use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use betrace_engine::RuleService;

use super::{health, ingest, rules};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RuleService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route(
            "/v1/rules",
            get(rules::list_rules).post(rules::create_rule),
        )
        .route("/v1/rules/validate", post(rules::validate_rule))
        .route(
            "/v1/rules/:rule_id",
            get(rules::get_rule)
                .put(rules::update_rule)
                .delete(rules::delete_rule),
        )
        .route("/v1/rules/:rule_id/stats", get(rules::rule_stats))
        .route("/v1/ingest", post(ingest::ingest_span))
        .route("/v1/evaluate", post(ingest::evaluate_span))
        .route("/v1/evaluate/batch", post(ingest::evaluate_batch))
        .route("/v1/traces/flush", post(ingest::flush_traces))
        .with_state(state)
}
