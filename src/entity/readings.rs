use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Raw time-series points backing the SQL readings store.
///
/// The composite key enforces one value per (sensor, instant); writers
/// upsert, so the last write for an instant wins.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "readings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub sensor_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub time: DateTimeWithTimeZone,
    pub value: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
