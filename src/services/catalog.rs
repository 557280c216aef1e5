//! Facilities, units, sensors and actuators.
//!
//! Deletes cascade explicitly: removing a facility removes its sensors and
//! actuators, and removing either of those removes every row that points at
//! it. Readings stay in the readings store.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::actuators::{self, ActuatorType};
use crate::entity::facilities::{self, FacilityType};
use crate::entity::{
    alerts, command_args, commands, rule_commands, rule_sensors, sensor_actuators, sensors, units,
};
use crate::error::{AppError, AppResult};

/// Default sampling interval for new sensors, in seconds.
pub const DEFAULT_SAMPLING_S: i32 = 10;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewFacility {
    pub name: String,
    pub facility_type: FacilityType,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewUnit {
    pub code: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewSensor {
    pub user_id: Uuid,
    pub facility_id: Uuid,
    pub name: String,
    pub unit_id: Option<Uuid>,
    pub min_val: Option<f64>,
    pub max_val: Option<f64>,
    pub sampling_s: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewActuator {
    pub facility_id: Option<Uuid>,
    pub name: String,
    pub actuator_type: ActuatorType,
    pub range_min: Option<f64>,
    pub range_max: Option<f64>,
    pub step: Option<f64>,
    pub is_active: Option<bool>,
}

fn required_name(name: &str, what: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(format!("{what} name must not be empty")));
    }
    Ok(name.to_string())
}

fn check_bounds(min: Option<f64>, max: Option<f64>, what: &str) -> AppResult<()> {
    for bound in [min, max].into_iter().flatten() {
        if !bound.is_finite() {
            return Err(AppError::BadRequest(format!("{what} bounds must be finite")));
        }
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(AppError::BadRequest(format!(
                "{what} minimum {min} exceeds maximum {max}"
            )));
        }
    }
    Ok(())
}

// Facilities

/// # Errors
///
/// `BadRequest` on an empty name.
pub async fn create_facility(db: &DatabaseConnection, input: NewFacility) -> AppResult<facilities::Model> {
    let facility = facilities::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(required_name(&input.name, "facility")?),
        facility_type: Set(input.facility_type),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await?;

    tracing::info!(facility_id = %facility.id, name = %facility.name, "facility_created");
    Ok(facility)
}

/// # Errors
///
/// Propagates database errors.
pub async fn list_facilities(db: &DatabaseConnection) -> AppResult<Vec<facilities::Model>> {
    Ok(facilities::Entity::find()
        .order_by_asc(facilities::Column::Name)
        .all(db)
        .await?)
}

/// Delete a facility with its sensors and actuators.
///
/// # Errors
///
/// `NotFound` for an unknown id.
pub async fn delete_facility(db: &DatabaseConnection, id: Uuid) -> AppResult<()> {
    let txn = db.begin().await?;
    facilities::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Facility {id} not found")))?;

    let sensor_ids: Vec<Uuid> = sensors::Entity::find()
        .filter(sensors::Column::FacilityId.eq(id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();
    for sensor_id in &sensor_ids {
        purge_sensor(&txn, *sensor_id).await?;
    }

    let actuator_ids: Vec<Uuid> = actuators::Entity::find()
        .filter(actuators::Column::FacilityId.eq(id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect();
    for actuator_id in &actuator_ids {
        purge_actuator(&txn, *actuator_id).await?;
    }

    facilities::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    tracing::info!(
        facility_id = %id,
        sensors = sensor_ids.len(),
        actuators = actuator_ids.len(),
        "facility_deleted"
    );
    Ok(())
}

// Units

/// # Errors
///
/// `Conflict` when the code is taken.
pub async fn create_unit(db: &DatabaseConnection, input: NewUnit) -> AppResult<units::Model> {
    let code = required_name(&input.code, "unit")?;
    let taken = units::Entity::find()
        .filter(units::Column::Code.eq(code.as_str()))
        .one(db)
        .await?;
    if taken.is_some() {
        return Err(AppError::Conflict(format!("Unit code '{code}' already exists")));
    }

    Ok(units::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code),
        title: Set(input.title.trim().to_string()),
    }
    .insert(db)
    .await?)
}

/// # Errors
///
/// Propagates database errors.
pub async fn list_units(db: &DatabaseConnection) -> AppResult<Vec<units::Model>> {
    Ok(units::Entity::find()
        .order_by_asc(units::Column::Code)
        .all(db)
        .await?)
}

/// Delete a unit; sensors using it keep existing without a unit.
///
/// # Errors
///
/// `NotFound` for an unknown id.
pub async fn delete_unit(db: &DatabaseConnection, id: Uuid) -> AppResult<()> {
    let txn = db.begin().await?;
    units::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unit {id} not found")))?;

    sensors::Entity::update_many()
        .set(sensors::ActiveModel {
            unit_id: Set(None),
            ..Default::default()
        })
        .filter(sensors::Column::UnitId.eq(id))
        .exec(&txn)
        .await?;
    units::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;
    Ok(())
}

// Sensors

/// # Errors
///
/// `BadRequest` for invalid bounds or an unknown facility/unit, `Conflict`
/// when the facility already has a sensor with this name.
pub async fn create_sensor(db: &DatabaseConnection, input: NewSensor) -> AppResult<sensors::Model> {
    let name = required_name(&input.name, "sensor")?;
    check_bounds(input.min_val, input.max_val, "sensor")?;
    let sampling_s = input.sampling_s.unwrap_or(DEFAULT_SAMPLING_S);
    if sampling_s <= 0 {
        return Err(AppError::BadRequest("sampling_s must be positive".to_string()));
    }

    if facilities::Entity::find_by_id(input.facility_id).one(db).await?.is_none() {
        return Err(AppError::BadRequest(format!(
            "Facility {} does not exist",
            input.facility_id
        )));
    }
    if let Some(unit_id) = input.unit_id {
        if units::Entity::find_by_id(unit_id).one(db).await?.is_none() {
            return Err(AppError::BadRequest(format!("Unit {unit_id} does not exist")));
        }
    }

    let duplicate = sensors::Entity::find()
        .filter(sensors::Column::FacilityId.eq(input.facility_id))
        .filter(sensors::Column::Name.eq(name.as_str()))
        .one(db)
        .await?;
    if duplicate.is_some() {
        return Err(AppError::Conflict(format!(
            "Facility {} already has a sensor named '{name}'",
            input.facility_id
        )));
    }

    let sensor = sensors::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(input.user_id),
        facility_id: Set(input.facility_id),
        name: Set(name),
        unit_id: Set(input.unit_id),
        min_val: Set(input.min_val),
        max_val: Set(input.max_val),
        sampling_s: Set(sampling_s),
        is_active: Set(input.is_active.unwrap_or(true)),
        created_at: Set(Utc::now().into()),
        updated_at: Set(None),
    }
    .insert(db)
    .await?;

    tracing::info!(sensor_id = %sensor.id, facility_id = %sensor.facility_id, "sensor_created");
    Ok(sensor)
}

/// # Errors
///
/// Propagates database errors.
pub async fn list_sensors(
    db: &DatabaseConnection,
    facility_id: Option<Uuid>,
) -> AppResult<Vec<sensors::Model>> {
    let mut query = sensors::Entity::find();
    if let Some(facility_id) = facility_id {
        query = query.filter(sensors::Column::FacilityId.eq(facility_id));
    }
    Ok(query.order_by_asc(sensors::Column::Name).all(db).await?)
}

/// # Errors
///
/// `NotFound` for an unknown id.
pub async fn get_sensor<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<sensors::Model> {
    sensors::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sensor {id} not found")))
}

/// Delete a sensor, its actuator links and rule bindings.
///
/// # Errors
///
/// `NotFound` for an unknown id.
pub async fn delete_sensor(db: &DatabaseConnection, id: Uuid) -> AppResult<()> {
    let txn = db.begin().await?;
    get_sensor(&txn, id).await?;
    purge_sensor(&txn, id).await?;
    txn.commit().await?;

    tracing::info!(sensor_id = %id, "sensor_deleted");
    Ok(())
}

async fn purge_sensor<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<(), sea_orm::DbErr> {
    sensor_actuators::Entity::delete_many()
        .filter(sensor_actuators::Column::SensorId.eq(id))
        .exec(db)
        .await?;
    rule_sensors::Entity::delete_many()
        .filter(rule_sensors::Column::SensorId.eq(id))
        .exec(db)
        .await?;
    alerts::Entity::update_many()
        .set(alerts::ActiveModel {
            sensor_id: Set(None),
            ..Default::default()
        })
        .filter(alerts::Column::SensorId.eq(id))
        .exec(db)
        .await?;
    sensors::Entity::delete_by_id(id).exec(db).await?;
    Ok(())
}

// Actuators

/// # Errors
///
/// `BadRequest` for an invalid range or step, or an unknown facility.
pub async fn create_actuator(
    db: &DatabaseConnection,
    input: NewActuator,
) -> AppResult<actuators::Model> {
    let name = required_name(&input.name, "actuator")?;
    check_bounds(input.range_min, input.range_max, "actuator")?;
    if let Some(step) = input.step {
        if !step.is_finite() || step <= 0.0 {
            return Err(AppError::BadRequest("step must be a positive number".to_string()));
        }
    }
    if let Some(facility_id) = input.facility_id {
        if facilities::Entity::find_by_id(facility_id).one(db).await?.is_none() {
            return Err(AppError::BadRequest(format!(
                "Facility {facility_id} does not exist"
            )));
        }
    }

    let actuator = actuators::ActiveModel {
        id: Set(Uuid::new_v4()),
        facility_id: Set(input.facility_id),
        name: Set(name),
        actuator_type: Set(input.actuator_type),
        range_min: Set(input.range_min),
        range_max: Set(input.range_max),
        step: Set(input.step),
        is_active: Set(input.is_active.unwrap_or(true)),
        last_value: Set(None),
        created_at: Set(Utc::now().into()),
        updated_at: Set(None),
    }
    .insert(db)
    .await?;

    tracing::info!(actuator_id = %actuator.id, kind = ?actuator.actuator_type, "actuator_created");
    Ok(actuator)
}

/// # Errors
///
/// Propagates database errors.
pub async fn list_actuators(
    db: &DatabaseConnection,
    facility_id: Option<Uuid>,
) -> AppResult<Vec<actuators::Model>> {
    let mut query = actuators::Entity::find();
    if let Some(facility_id) = facility_id {
        query = query.filter(actuators::Column::FacilityId.eq(facility_id));
    }
    Ok(query.order_by_asc(actuators::Column::Name).all(db).await?)
}

/// Delete an actuator with its links, rule command templates and command
/// history.
///
/// # Errors
///
/// `NotFound` for an unknown id.
pub async fn delete_actuator(db: &DatabaseConnection, id: Uuid) -> AppResult<()> {
    let txn = db.begin().await?;
    actuators::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Actuator {id} not found")))?;
    purge_actuator(&txn, id).await?;
    txn.commit().await?;

    tracing::info!(actuator_id = %id, "actuator_deleted");
    Ok(())
}

async fn purge_actuator<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<(), sea_orm::DbErr> {
    let command_ids: Vec<Uuid> = commands::Entity::find()
        .filter(commands::Column::ActuatorId.eq(id))
        .all(db)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();
    if !command_ids.is_empty() {
        command_args::Entity::delete_many()
            .filter(command_args::Column::CommandId.is_in(command_ids))
            .exec(db)
            .await?;
    }
    commands::Entity::delete_many()
        .filter(commands::Column::ActuatorId.eq(id))
        .exec(db)
        .await?;
    rule_commands::Entity::delete_many()
        .filter(rule_commands::Column::ActuatorId.eq(id))
        .exec(db)
        .await?;
    sensor_actuators::Entity::delete_many()
        .filter(sensor_actuators::Column::ActuatorId.eq(id))
        .exec(db)
        .await?;
    actuators::Entity::delete_by_id(id).exec(db).await?;
    Ok(())
}

/// Link a sensor to an actuator. Linking twice is a no-op.
///
/// # Errors
///
/// `NotFound` when either side does not exist.
pub async fn link_sensor(
    db: &DatabaseConnection,
    actuator_id: Uuid,
    sensor_id: Uuid,
) -> AppResult<sensor_actuators::Model> {
    actuators::Entity::find_by_id(actuator_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Actuator {actuator_id} not found")))?;
    get_sensor(db, sensor_id).await?;

    if let Some(existing) = sensor_actuators::Entity::find_by_id((sensor_id, actuator_id))
        .one(db)
        .await?
    {
        return Ok(existing);
    }

    Ok(sensor_actuators::ActiveModel {
        sensor_id: Set(sensor_id),
        actuator_id: Set(actuator_id),
    }
    .insert(db)
    .await?)
}
