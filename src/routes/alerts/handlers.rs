use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use uuid::Uuid;

use crate::common::AppState;
use crate::engine::alerts;
use crate::entity::alerts as alert_entity;
use crate::error::{AppError, AppResult};

use super::types::{AckRequest, AlertResponse, AlertsQuery};

/// Upper bound for the `limit` query parameter.
const MAX_LIMIT: u64 = 1000;

/// List alerts matching the query filters, newest first
#[utoipa::path(
    get,
    path = "/api/alerts",
    params(AlertsQuery),
    responses(
        (status = 200, description = "Alerts retrieved successfully", body = Vec<AlertResponse>),
    ),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> AppResult<Json<Vec<AlertResponse>>> {
    let mut db_query = alert_entity::Entity::find();

    if let Some(alert_state) = query.state {
        db_query = db_query.filter(alert_entity::Column::State.eq(alert_state));
    }
    if let Some(rule_id) = query.rule_id {
        db_query = db_query.filter(alert_entity::Column::RuleId.eq(rule_id));
    }

    let alerts_list = db_query
        .order_by_desc(alert_entity::Column::StartedAt)
        .limit(query.limit.clamp(1, MAX_LIMIT))
        .all(&state.db)
        .await?;

    Ok(Json(alerts_list.into_iter().map(Into::into).collect()))
}

/// Fetch one alert
#[utoipa::path(
    get,
    path = "/api/alerts/{alert_id}",
    params(
        ("alert_id" = Uuid, Path, description = "Alert UUID"),
    ),
    responses(
        (status = 200, description = "Alert retrieved successfully", body = AlertResponse),
        (status = 404, description = "Alert not found"),
    ),
    tag = "alerts"
)]
pub async fn get_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> AppResult<Json<AlertResponse>> {
    let alert = alert_entity::Entity::find_by_id(alert_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Alert not found".to_string()))?;

    Ok(Json(alert.into()))
}

/// Acknowledge an open alert
///
/// Acknowledging an already acknowledged alert returns it unchanged.
#[utoipa::path(
    post,
    path = "/api/alerts/{alert_id}/ack",
    params(
        ("alert_id" = Uuid, Path, description = "Alert UUID"),
    ),
    request_body = AckRequest,
    responses(
        (status = 200, description = "Alert acknowledged", body = AlertResponse),
        (status = 404, description = "Alert not found"),
        (status = 409, description = "Alert already closed"),
    ),
    tag = "alerts"
)]
pub async fn ack_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
    Json(request): Json<AckRequest>,
) -> AppResult<Json<AlertResponse>> {
    let alert = alerts::acknowledge(&state.db, alert_id, request.user_id, Utc::now()).await?;
    Ok(Json(alert.into()))
}
