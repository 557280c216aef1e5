use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entity::alerts::{self, AlertState};
use crate::entity::rules::Severity;

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertResponse {
    pub id: Uuid,
    pub rule_id: Uuid,
    /// Set when the rule is bound to a single sensor
    pub sensor_id: Option<Uuid>,
    pub severity: Severity,
    pub state: AlertState,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub ack_by: Option<Uuid>,
    pub ack_at: Option<DateTime<Utc>>,
    /// The rule's inputs were stale at the last evaluation
    pub stale: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<alerts::Model> for AlertResponse {
    fn from(a: alerts::Model) -> Self {
        Self {
            id: a.id,
            rule_id: a.rule_id,
            sensor_id: a.sensor_id,
            severity: a.severity,
            state: a.state,
            message: a.message,
            started_at: a.started_at.with_timezone(&Utc),
            ended_at: a.ended_at.map(|t| t.with_timezone(&Utc)),
            ack_by: a.ack_by,
            ack_at: a.ack_at.map(|t| t.with_timezone(&Utc)),
            stale: a.stale,
            updated_at: a.updated_at.map(|t| t.with_timezone(&Utc)),
        }
    }
}

fn default_limit() -> u64 {
    100
}

/// Query parameters for the alerts endpoint
#[derive(Debug, Deserialize, IntoParams)]
pub struct AlertsQuery {
    /// Filter by state (open, ack, closed)
    pub state: Option<AlertState>,
    /// Filter by rule
    pub rule_id: Option<Uuid>,
    /// Maximum number of alerts, newest first (default: 100)
    #[serde(default = "default_limit")]
    pub limit: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AckRequest {
    /// User acknowledging the alert
    pub user_id: Uuid,
}
