use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
pub enum FacilityType {
    #[sea_orm(string_value = "house")]
    House,
    #[sea_orm(string_value = "sauna")]
    Sauna,
    #[sea_orm(string_value = "greenhouse")]
    Greenhouse,
    #[sea_orm(string_value = "woodshed")]
    Woodshed,
    #[sea_orm(string_value = "garage")]
    Garage,
    #[sea_orm(string_value = "cellar")]
    Cellar,
    #[sea_orm(string_value = "pool")]
    Pool,
    #[sea_orm(string_value = "grill")]
    Grill,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "facilities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub facility_type: FacilityType,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sensors::Entity")]
    Sensors,
    #[sea_orm(has_many = "super::actuators::Entity")]
    Actuators,
}

impl Related<super::sensors::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sensors.def()
    }
}

impl Related<super::actuators::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Actuators.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
