use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use betrace_common::violation::Severity;
use betrace_dsl::DslError;
use betrace_engine::stats::RuleStats;
use betrace_engine::{CreateRule, EngineError, RuleView, UpdateRule};

use super::AppState;

#[derive(Deserialize)]
pub struct CreateRuleRequest {
    pub id: Option<String>,
    pub name: String,
    pub source: String,
    pub severity: Option<Severity>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateRuleRequest {
    pub name: Option<String>,
    pub source: Option<String>,
    pub severity: Option<Severity>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub source: String,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(err: EngineError) -> ApiError {
    let status = match &err {
        EngineError::Rule(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::DuplicateId(_) => StatusCode::CONFLICT,
        EngineError::Capacity(_) => StatusCode::TOO_MANY_REQUESTS,
        EngineError::Busy(_) | EngineError::DeadlineExceeded => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

pub async fn list_rules(State(state): State<AppState>) -> Json<Vec<RuleView>> {
    Json(state.service.list())
}

pub async fn get_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> Result<Json<RuleView>, ApiError> {
    state.service.get(&rule_id).map(Json).map_err(api_error)
}

pub async fn create_rule(
    State(state): State<AppState>,
    Json(body): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<RuleView>), ApiError> {
    let view = state
        .service
        .create(CreateRule {
            id: body.id,
            name: body.name,
            source: body.source,
            severity: body.severity.unwrap_or(Severity::Medium),
            enabled: body.enabled.unwrap_or(true),
            description: body.description.unwrap_or_default(),
        })
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn update_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
    Json(body): Json<UpdateRuleRequest>,
) -> Result<Json<RuleView>, ApiError> {
    state
        .service
        .update(
            &rule_id,
            UpdateRule {
                name: body.name,
                source: body.source,
                severity: body.severity,
                enabled: body.enabled,
                description: body.description,
            },
        )
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.delete(&rule_id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct RuleStatsResponse {
    pub rule_id: String,
    #[serde(flatten)]
    pub stats: RuleStats,
}

pub async fn rule_stats(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> Result<Json<RuleStatsResponse>, ApiError> {
    // 404 for unknown ids rather than all-zero counters
    state.service.get(&rule_id).map_err(api_error)?;
    Ok(Json(RuleStatsResponse {
        stats: state.service.engine().stats().rule(&rule_id),
        rule_id,
    }))
}

/// Never fails at the HTTP level: the verdict rides in the body.
pub async fn validate_rule(
    State(state): State<AppState>,
    Json(body): Json<ValidateRequest>,
) -> Json<serde_json::Value> {
    match state.service.validate(&body.source) {
        Ok(()) => Json(json!({ "valid": true })),
        Err(e) => {
            let mut response = json!({ "valid": false, "error": e.to_string() });
            if let DslError::Parse { line, col, .. } = e {
                response["line"] = json!(line);
                response["col"] = json!(col);
            }
            Json(response)
        }
    }
}
