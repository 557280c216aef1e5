use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ActuatorType {
    /// Accepts `ON` / `OFF`.
    #[sea_orm(string_value = "binary")]
    Binary,
    /// Accepts `SET` on a stepped range.
    #[sea_orm(string_value = "level")]
    Level,
    /// Accepts `SET` on a continuous range.
    #[sea_orm(string_value = "setpoint")]
    Setpoint,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "actuators")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub facility_id: Option<Uuid>,
    pub name: String,
    pub actuator_type: ActuatorType,
    pub range_min: Option<f64>,
    pub range_max: Option<f64>,
    pub step: Option<f64>,
    pub is_active: bool,
    pub last_value: Option<f64>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::facilities::Entity",
        from = "Column::FacilityId",
        to = "super::facilities::Column::Id"
    )]
    Facility,
    #[sea_orm(has_many = "super::sensor_actuators::Entity")]
    SensorActuators,
    #[sea_orm(has_many = "super::commands::Entity")]
    Commands,
}

impl Related<super::facilities::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Facility.def()
    }
}

impl Related<super::sensor_actuators::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SensorActuators.def()
    }
}

impl Related<super::commands::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Commands.def()
    }
}

impl Related<super::sensors::Entity> for Entity {
    fn to() -> RelationDef {
        super::sensor_actuators::Relation::Sensor.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::sensor_actuators::Relation::Actuator.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
