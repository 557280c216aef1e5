use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::common::AppState;
use crate::error::AppResult;
use crate::services::readings::{self, NewReading};
use crate::store::Reading;

fn default_window() -> i64 {
    3600
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SeriesQuery {
    /// Lookback in seconds (default: 3600)
    #[serde(default = "default_window")]
    pub window: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SeriesResponse {
    pub sensor_id: Uuid,
    pub window: i64,
    /// Readings in ascending time order
    pub readings: Vec<Reading>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LatestResponse {
    pub sensor_id: Uuid,
    /// Most recent reading within the last 30 days, if any
    pub reading: Option<Reading>,
}

/// Ingest a reading
///
/// The value is clamped into the sensor's `[min_val, max_val]` bounds.
#[utoipa::path(
    post,
    path = "/api/sensors/{sensor_id}/readings",
    params(
        ("sensor_id" = Uuid, Path, description = "Sensor UUID"),
    ),
    request_body = NewReading,
    responses(
        (status = 201, description = "Reading stored", body = Reading),
        (status = 400, description = "Inactive sensor or non-finite value"),
        (status = 404, description = "Sensor not found"),
        (status = 504, description = "Readings store timed out"),
    ),
    tag = "readings"
)]
pub async fn post_reading(
    State(state): State<AppState>,
    Path(sensor_id): Path<Uuid>,
    Json(input): Json<NewReading>,
) -> AppResult<(StatusCode, Json<Reading>)> {
    let reading = readings::ingest(
        &state.db,
        state.readings.as_ref(),
        state.config.store_timeout(),
        sensor_id,
        input,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(reading)))
}

/// Get a sensor's readings over a trailing window
#[utoipa::path(
    get,
    path = "/api/sensors/{sensor_id}/readings",
    params(
        ("sensor_id" = Uuid, Path, description = "Sensor UUID"),
        SeriesQuery,
    ),
    responses(
        (status = 200, description = "Readings retrieved successfully", body = SeriesResponse),
        (status = 400, description = "Invalid window"),
        (status = 404, description = "Sensor not found"),
    ),
    tag = "readings"
)]
pub async fn get_series(
    State(state): State<AppState>,
    Path(sensor_id): Path<Uuid>,
    Query(query): Query<SeriesQuery>,
) -> AppResult<Json<SeriesResponse>> {
    let readings = readings::series(
        &state.db,
        state.readings.as_ref(),
        state.config.store_timeout(),
        sensor_id,
        query.window,
    )
    .await?;

    Ok(Json(SeriesResponse {
        sensor_id,
        window: query.window,
        readings,
    }))
}

/// Get a sensor's latest reading
#[utoipa::path(
    get,
    path = "/api/sensors/{sensor_id}/readings/latest",
    params(
        ("sensor_id" = Uuid, Path, description = "Sensor UUID"),
    ),
    responses(
        (status = 200, description = "Latest reading retrieved", body = LatestResponse),
        (status = 404, description = "Sensor not found"),
    ),
    tag = "readings"
)]
pub async fn get_latest(
    State(state): State<AppState>,
    Path(sensor_id): Path<Uuid>,
) -> AppResult<Json<LatestResponse>> {
    let reading = readings::latest(
        &state.db,
        state.readings.as_ref(),
        state.config.store_timeout(),
        sensor_id,
    )
    .await?;
    Ok(Json(LatestResponse { sensor_id, reading }))
}
