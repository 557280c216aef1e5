use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[sea_orm(string_value = "info")]
    Info,
    #[sea_orm(string_value = "warning")]
    Warning,
    #[sea_orm(string_value = "critical")]
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub expression: String,
    pub window_s: i32,
    pub severity: Severity,
    pub enabled: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::rule_sensors::Entity")]
    RuleSensors,
    #[sea_orm(has_many = "super::rule_commands::Entity")]
    RuleCommands,
    #[sea_orm(has_many = "super::alerts::Entity")]
    Alerts,
}

impl Related<super::rule_sensors::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RuleSensors.def()
    }
}

impl Related<super::rule_commands::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RuleCommands.def()
    }
}

impl Related<super::alerts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Alerts.def()
    }
}

impl Related<super::sensors::Entity> for Entity {
    fn to() -> RelationDef {
        super::rule_sensors::Relation::Sensor.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::rule_sensors::Relation::Rule.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
