use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sensors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub facility_id: Uuid,
    pub name: String,
    pub unit_id: Option<Uuid>,
    pub min_val: Option<f64>,
    pub max_val: Option<f64>,
    pub sampling_s: i32,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Clamp a raw value into the sensor's configured bounds.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        let value = self.min_val.map_or(value, |min| value.max(min));
        self.max_val.map_or(value, |max| value.min(max))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::facilities::Entity",
        from = "Column::FacilityId",
        to = "super::facilities::Column::Id"
    )]
    Facility,
    #[sea_orm(
        belongs_to = "super::units::Entity",
        from = "Column::UnitId",
        to = "super::units::Column::Id"
    )]
    Unit,
    #[sea_orm(has_many = "super::sensor_actuators::Entity")]
    SensorActuators,
    #[sea_orm(has_many = "super::rule_sensors::Entity")]
    RuleSensors,
}

impl Related<super::facilities::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Facility.def()
    }
}

impl Related<super::units::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Unit.def()
    }
}

impl Related<super::sensor_actuators::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SensorActuators.def()
    }
}

impl Related<super::rule_sensors::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RuleSensors.def()
    }
}

impl Related<super::actuators::Entity> for Entity {
    fn to() -> RelationDef {
        super::sensor_actuators::Relation::Actuator.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::sensor_actuators::Relation::Sensor.def().rev())
    }
}

impl Related<super::rules::Entity> for Entity {
    fn to() -> RelationDef {
        super::rule_sensors::Relation::Rule.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::rule_sensors::Relation::Sensor.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
