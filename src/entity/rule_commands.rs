use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A command template issued each time the owning rule's alert opens.
///
/// `args` is a JSON object of string values, copied into `command_args`
/// when the command is issued.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rule_commands")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub rule_id: Uuid,
    pub actuator_id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Json")]
    pub args: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::rules::Entity",
        from = "Column::RuleId",
        to = "super::rules::Column::Id"
    )]
    Rule,
    #[sea_orm(
        belongs_to = "super::actuators::Entity",
        from = "Column::ActuatorId",
        to = "super::actuators::Column::Id"
    )]
    Actuator,
}

impl Related<super::rules::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rule.def()
    }
}

impl Related<super::actuators::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Actuator.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
