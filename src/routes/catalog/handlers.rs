use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::common::AppState;
use crate::error::AppResult;
use crate::services::catalog::{self, NewActuator, NewFacility, NewSensor, NewUnit};

use super::types::{
    ActuatorResponse, FacilityFilter, FacilityResponse, LinkResponse, SensorResponse, UnitResponse,
};

/// Create a facility
#[utoipa::path(
    post,
    path = "/api/facilities",
    request_body = NewFacility,
    responses(
        (status = 201, description = "Facility created", body = FacilityResponse),
        (status = 400, description = "Invalid facility"),
    ),
    tag = "catalog"
)]
pub async fn create_facility(
    State(state): State<AppState>,
    Json(input): Json<NewFacility>,
) -> AppResult<(StatusCode, Json<FacilityResponse>)> {
    let facility = catalog::create_facility(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(facility.into())))
}

/// List facilities
#[utoipa::path(
    get,
    path = "/api/facilities",
    responses(
        (status = 200, description = "Facilities retrieved successfully", body = Vec<FacilityResponse>),
    ),
    tag = "catalog"
)]
pub async fn list_facilities(State(state): State<AppState>) -> AppResult<Json<Vec<FacilityResponse>>> {
    let facilities = catalog::list_facilities(&state.db).await?;
    Ok(Json(facilities.into_iter().map(Into::into).collect()))
}

/// Delete a facility with its sensors and actuators
#[utoipa::path(
    delete,
    path = "/api/facilities/{facility_id}",
    params(
        ("facility_id" = Uuid, Path, description = "Facility UUID"),
    ),
    responses(
        (status = 204, description = "Facility deleted"),
        (status = 404, description = "Facility not found"),
    ),
    tag = "catalog"
)]
pub async fn delete_facility(
    State(state): State<AppState>,
    Path(facility_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    catalog::delete_facility(&state.db, facility_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create a measurement unit
#[utoipa::path(
    post,
    path = "/api/units",
    request_body = NewUnit,
    responses(
        (status = 201, description = "Unit created", body = UnitResponse),
        (status = 409, description = "Unit code already exists"),
    ),
    tag = "catalog"
)]
pub async fn create_unit(
    State(state): State<AppState>,
    Json(input): Json<NewUnit>,
) -> AppResult<(StatusCode, Json<UnitResponse>)> {
    let unit = catalog::create_unit(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(unit.into())))
}

/// List measurement units
#[utoipa::path(
    get,
    path = "/api/units",
    responses(
        (status = 200, description = "Units retrieved successfully", body = Vec<UnitResponse>),
    ),
    tag = "catalog"
)]
pub async fn list_units(State(state): State<AppState>) -> AppResult<Json<Vec<UnitResponse>>> {
    let units = catalog::list_units(&state.db).await?;
    Ok(Json(units.into_iter().map(Into::into).collect()))
}

/// Delete a unit; sensors using it lose their unit
#[utoipa::path(
    delete,
    path = "/api/units/{unit_id}",
    params(
        ("unit_id" = Uuid, Path, description = "Unit UUID"),
    ),
    responses(
        (status = 204, description = "Unit deleted"),
        (status = 404, description = "Unit not found"),
    ),
    tag = "catalog"
)]
pub async fn delete_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    catalog::delete_unit(&state.db, unit_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Register a sensor
#[utoipa::path(
    post,
    path = "/api/sensors",
    request_body = NewSensor,
    responses(
        (status = 201, description = "Sensor created", body = SensorResponse),
        (status = 400, description = "Invalid sensor"),
        (status = 409, description = "Sensor name already used in this facility"),
    ),
    tag = "catalog"
)]
pub async fn create_sensor(
    State(state): State<AppState>,
    Json(input): Json<NewSensor>,
) -> AppResult<(StatusCode, Json<SensorResponse>)> {
    let sensor = catalog::create_sensor(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(sensor.into())))
}

/// List sensors
#[utoipa::path(
    get,
    path = "/api/sensors",
    params(FacilityFilter),
    responses(
        (status = 200, description = "Sensors retrieved successfully", body = Vec<SensorResponse>),
    ),
    tag = "catalog"
)]
pub async fn list_sensors(
    State(state): State<AppState>,
    Query(filter): Query<FacilityFilter>,
) -> AppResult<Json<Vec<SensorResponse>>> {
    let sensors = catalog::list_sensors(&state.db, filter.facility_id).await?;
    Ok(Json(sensors.into_iter().map(Into::into).collect()))
}

/// Delete a sensor with its links and rule bindings
#[utoipa::path(
    delete,
    path = "/api/sensors/{sensor_id}",
    params(
        ("sensor_id" = Uuid, Path, description = "Sensor UUID"),
    ),
    responses(
        (status = 204, description = "Sensor deleted"),
        (status = 404, description = "Sensor not found"),
    ),
    tag = "catalog"
)]
pub async fn delete_sensor(
    State(state): State<AppState>,
    Path(sensor_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    catalog::delete_sensor(&state.db, sensor_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Register an actuator
#[utoipa::path(
    post,
    path = "/api/actuators",
    request_body = NewActuator,
    responses(
        (status = 201, description = "Actuator created", body = ActuatorResponse),
        (status = 400, description = "Invalid actuator"),
    ),
    tag = "catalog"
)]
pub async fn create_actuator(
    State(state): State<AppState>,
    Json(input): Json<NewActuator>,
) -> AppResult<(StatusCode, Json<ActuatorResponse>)> {
    let actuator = catalog::create_actuator(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(actuator.into())))
}

/// List actuators
#[utoipa::path(
    get,
    path = "/api/actuators",
    params(FacilityFilter),
    responses(
        (status = 200, description = "Actuators retrieved successfully", body = Vec<ActuatorResponse>),
    ),
    tag = "catalog"
)]
pub async fn list_actuators(
    State(state): State<AppState>,
    Query(filter): Query<FacilityFilter>,
) -> AppResult<Json<Vec<ActuatorResponse>>> {
    let actuators = catalog::list_actuators(&state.db, filter.facility_id).await?;
    Ok(Json(actuators.into_iter().map(Into::into).collect()))
}

/// Delete an actuator with its links, templates and command history
#[utoipa::path(
    delete,
    path = "/api/actuators/{actuator_id}",
    params(
        ("actuator_id" = Uuid, Path, description = "Actuator UUID"),
    ),
    responses(
        (status = 204, description = "Actuator deleted"),
        (status = 404, description = "Actuator not found"),
    ),
    tag = "catalog"
)]
pub async fn delete_actuator(
    State(state): State<AppState>,
    Path(actuator_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    catalog::delete_actuator(&state.db, actuator_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Link a sensor to an actuator
#[utoipa::path(
    put,
    path = "/api/actuators/{actuator_id}/sensors/{sensor_id}",
    params(
        ("actuator_id" = Uuid, Path, description = "Actuator UUID"),
        ("sensor_id" = Uuid, Path, description = "Sensor UUID"),
    ),
    responses(
        (status = 200, description = "Sensor linked", body = LinkResponse),
        (status = 404, description = "Sensor or actuator not found"),
    ),
    tag = "catalog"
)]
pub async fn link_sensor(
    State(state): State<AppState>,
    Path((actuator_id, sensor_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<LinkResponse>> {
    let link = catalog::link_sensor(&state.db, actuator_id, sensor_id).await?;
    Ok(Json(link.into()))
}
