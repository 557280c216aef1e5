use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::commands::{self, CommandStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitCommand {
    pub actuator_id: Uuid,
    /// `ON`, `OFF` or `SET` (case-insensitive)
    pub name: String,
    /// Named arguments; `SET` requires `value`
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    /// User issuing the command
    pub issued_by: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OutcomeReport {
    pub success: bool,
    /// Failure reason; ignored on success
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommandResponse {
    pub id: Uuid,
    pub actuator_id: Uuid,
    pub name: String,
    pub args: BTreeMap<String, String>,
    pub issued_by: Option<Uuid>,
    /// Rule whose alert triggered the command
    pub rule_id: Option<Uuid>,
    pub alert_id: Option<Uuid>,
    pub status: CommandStatus,
    pub issued_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_text: Option<String>,
}

impl CommandResponse {
    pub fn new(c: commands::Model, args: BTreeMap<String, String>) -> Self {
        Self {
            id: c.id,
            actuator_id: c.actuator_id,
            name: c.name,
            args,
            issued_by: c.issued_by,
            rule_id: c.rule_id,
            alert_id: c.alert_id,
            status: c.status,
            issued_at: c.issued_at.with_timezone(&Utc),
            sent_at: c.sent_at.map(|t| t.with_timezone(&Utc)),
            completed_at: c.completed_at.map(|t| t.with_timezone(&Utc)),
            error_text: c.error_text,
        }
    }
}
