use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;

use crate::common::AppState;
use crate::engine::PassReport;
use crate::error::AppResult;
use crate::services::rules::{self, RuleDetail, RuleInput};

use super::types::RulesQuery;

/// List rules
#[utoipa::path(
    get,
    path = "/api/rules",
    params(RulesQuery),
    responses(
        (status = 200, description = "Rules retrieved successfully", body = Vec<RuleDetail>),
    ),
    tag = "rules"
)]
pub async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<RulesQuery>,
) -> AppResult<Json<Vec<RuleDetail>>> {
    Ok(Json(rules::list_rules(&state.db, query.user_id).await?))
}

/// Create a rule
///
/// The expression is parsed and its variables checked against the bound
/// sensors before the rule is stored.
#[utoipa::path(
    post,
    path = "/api/rules",
    request_body = RuleInput,
    responses(
        (status = 201, description = "Rule created", body = RuleDetail),
        (status = 400, description = "Invalid expression, bindings or commands"),
    ),
    tag = "rules"
)]
pub async fn create_rule(
    State(state): State<AppState>,
    Json(input): Json<RuleInput>,
) -> AppResult<(StatusCode, Json<RuleDetail>)> {
    let rule = rules::create_rule(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// Get a rule
#[utoipa::path(
    get,
    path = "/api/rules/{rule_id}",
    params(
        ("rule_id" = Uuid, Path, description = "Rule UUID"),
    ),
    responses(
        (status = 200, description = "Rule retrieved successfully", body = RuleDetail),
        (status = 404, description = "Rule not found"),
    ),
    tag = "rules"
)]
pub async fn get_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
) -> AppResult<Json<RuleDetail>> {
    Ok(Json(rules::get_rule(&state.db, rule_id).await?))
}

/// Replace a rule
#[utoipa::path(
    put,
    path = "/api/rules/{rule_id}",
    params(
        ("rule_id" = Uuid, Path, description = "Rule UUID"),
    ),
    request_body = RuleInput,
    responses(
        (status = 200, description = "Rule updated", body = RuleDetail),
        (status = 400, description = "Invalid expression, bindings or commands"),
        (status = 404, description = "Rule not found"),
    ),
    tag = "rules"
)]
pub async fn update_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
    Json(input): Json<RuleInput>,
) -> AppResult<Json<RuleDetail>> {
    Ok(Json(
        rules::update_rule(&state.db, &state.engine, rule_id, input).await?,
    ))
}

/// Delete a rule and its alerts
#[utoipa::path(
    delete,
    path = "/api/rules/{rule_id}",
    params(
        ("rule_id" = Uuid, Path, description = "Rule UUID"),
    ),
    responses(
        (status = 204, description = "Rule deleted"),
        (status = 404, description = "Rule not found"),
    ),
    tag = "rules"
)]
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    rules::delete_rule(&state.db, &state.engine, rule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Enable a rule
#[utoipa::path(
    post,
    path = "/api/rules/{rule_id}/enable",
    params(
        ("rule_id" = Uuid, Path, description = "Rule UUID"),
    ),
    responses(
        (status = 200, description = "Rule enabled", body = RuleDetail),
        (status = 404, description = "Rule not found"),
    ),
    tag = "rules"
)]
pub async fn enable_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
) -> AppResult<Json<RuleDetail>> {
    Ok(Json(rules::set_enabled(&state.db, rule_id, true).await?))
}

/// Disable a rule
#[utoipa::path(
    post,
    path = "/api/rules/{rule_id}/disable",
    params(
        ("rule_id" = Uuid, Path, description = "Rule UUID"),
    ),
    responses(
        (status = 200, description = "Rule disabled", body = RuleDetail),
        (status = 404, description = "Rule not found"),
    ),
    tag = "rules"
)]
pub async fn disable_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
) -> AppResult<Json<RuleDetail>> {
    Ok(Json(rules::set_enabled(&state.db, rule_id, false).await?))
}

/// Run an evaluation pass now
///
/// Evaluates every enabled rule once and returns the pass report. Safe to
/// call while the scheduler is running.
#[utoipa::path(
    post,
    path = "/api/evaluate",
    responses(
        (status = 200, description = "Pass completed", body = PassReport),
    ),
    tag = "rules"
)]
pub async fn evaluate(State(state): State<AppState>) -> AppResult<Json<PassReport>> {
    Ok(Json(state.engine.run_pass(Utc::now(), None).await?))
}
