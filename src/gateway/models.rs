use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Payload sent to the actuator gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub command_id: Uuid,
    pub actuator_id: Uuid,
    pub actuator_name: String,
    /// Normalised upper-case command name: `ON`, `OFF` or `SET`.
    pub command: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

/// How the gateway took the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Executed; the command is complete.
    Completed,
    /// Queued on the gateway side; the outcome arrives via callback.
    Accepted,
}
