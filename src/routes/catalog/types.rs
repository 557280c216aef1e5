use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entity::actuators::{self, ActuatorType};
use crate::entity::facilities::{self, FacilityType};
use crate::entity::{sensor_actuators, sensors, units};

#[derive(Debug, Serialize, ToSchema)]
pub struct FacilityResponse {
    pub id: Uuid,
    pub name: String,
    pub facility_type: FacilityType,
    pub created_at: DateTime<Utc>,
}

impl From<facilities::Model> for FacilityResponse {
    fn from(f: facilities::Model) -> Self {
        Self {
            id: f.id,
            name: f.name,
            facility_type: f.facility_type,
            created_at: f.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnitResponse {
    pub id: Uuid,
    pub code: String,
    pub title: String,
}

impl From<units::Model> for UnitResponse {
    fn from(u: units::Model) -> Self {
        Self {
            id: u.id,
            code: u.code,
            title: u.title,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SensorResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub facility_id: Uuid,
    pub name: String,
    /// Name the sensor is bound under in rule expressions
    pub variable: String,
    pub unit_id: Option<Uuid>,
    pub min_val: Option<f64>,
    pub max_val: Option<f64>,
    pub sampling_s: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<sensors::Model> for SensorResponse {
    fn from(s: sensors::Model) -> Self {
        Self {
            variable: crate::engine::window::variable_name(&s.name),
            id: s.id,
            user_id: s.user_id,
            facility_id: s.facility_id,
            name: s.name,
            unit_id: s.unit_id,
            min_val: s.min_val,
            max_val: s.max_val,
            sampling_s: s.sampling_s,
            is_active: s.is_active,
            created_at: s.created_at.with_timezone(&Utc),
            updated_at: s.updated_at.map(|t| t.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActuatorResponse {
    pub id: Uuid,
    pub facility_id: Option<Uuid>,
    pub name: String,
    pub actuator_type: ActuatorType,
    pub range_min: Option<f64>,
    pub range_max: Option<f64>,
    pub step: Option<f64>,
    pub is_active: bool,
    /// Last value confirmed by a successful command
    pub last_value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<actuators::Model> for ActuatorResponse {
    fn from(a: actuators::Model) -> Self {
        Self {
            id: a.id,
            facility_id: a.facility_id,
            name: a.name,
            actuator_type: a.actuator_type,
            range_min: a.range_min,
            range_max: a.range_max,
            step: a.step,
            is_active: a.is_active,
            last_value: a.last_value,
            created_at: a.created_at.with_timezone(&Utc),
            updated_at: a.updated_at.map(|t| t.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkResponse {
    pub sensor_id: Uuid,
    pub actuator_id: Uuid,
}

impl From<sensor_actuators::Model> for LinkResponse {
    fn from(l: sensor_actuators::Model) -> Self {
        Self {
            sensor_id: l.sensor_id,
            actuator_id: l.actuator_id,
        }
    }
}

/// Query parameters for sensor and actuator listings
#[derive(Debug, Deserialize, IntoParams)]
pub struct FacilityFilter {
    /// Only return items belonging to this facility
    pub facility_id: Option<Uuid>,
}
