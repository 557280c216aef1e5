use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    #[sea_orm(string_value = "queued")]
    Queued,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl CommandStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "commands")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub actuator_id: Uuid,
    pub name: String,
    /// `None` for rule-triggered commands.
    pub issued_by: Option<Uuid>,
    pub rule_id: Option<Uuid>,
    pub alert_id: Option<Uuid>,
    pub status: CommandStatus,
    pub issued_at: DateTimeWithTimeZone,
    pub sent_at: Option<DateTimeWithTimeZone>,
    pub completed_at: Option<DateTimeWithTimeZone>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_text: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::actuators::Entity",
        from = "Column::ActuatorId",
        to = "super::actuators::Column::Id"
    )]
    Actuator,
    #[sea_orm(has_many = "super::command_args::Entity")]
    Args,
}

impl Related<super::actuators::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Actuator.def()
    }
}

impl Related<super::command_args::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Args.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
