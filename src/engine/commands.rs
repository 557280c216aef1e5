//! Actuator command dispatch.
//!
//! Commands move `queued -> sent -> success | failed`. Each step is a
//! conditional update on the current status, so a command is delivered at
//! most once and an outcome is recorded at most once. Failed commands are
//! not retried.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::entity::actuators::{self, ActuatorType};
use crate::entity::commands::{self, CommandStatus};
use crate::entity::{command_args, rule_commands};
use crate::gateway::{ActuatorGateway, Delivery, ExecuteRequest};

/// Relative tolerance when checking a level value against its step grid.
const STEP_EPSILON: f64 = 1e-9;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid command: {0}")]
    Invalid(String),

    #[error("command {0} not found")]
    NotFound(Uuid),

    #[error("command {id} is {status:?}")]
    WrongStatus { id: Uuid, status: CommandStatus },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// A command as requested by a user or a rule.
#[derive(Debug, Clone, Default)]
pub struct CommandRequest {
    pub actuator_id: Uuid,
    pub name: String,
    pub args: BTreeMap<String, String>,
    pub issued_by: Option<Uuid>,
    pub rule_id: Option<Uuid>,
    pub alert_id: Option<Uuid>,
}

/// A validated command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    On,
    Off,
    Set(f64),
}

impl Action {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Set(_) => "SET",
        }
    }

    /// Value the actuator reports once the command has succeeded.
    #[must_use]
    pub fn resulting_value(self) -> f64 {
        match self {
            Self::On => 1.0,
            Self::Off => 0.0,
            Self::Set(v) => v,
        }
    }
}

/// Check a command against the actuator it targets.
///
/// # Errors
///
/// Returns `CommandError::Invalid` describing the first violated constraint.
pub fn validate(
    actuator: &actuators::Model,
    name: &str,
    args: &BTreeMap<String, String>,
) -> Result<Action, CommandError> {
    if !actuator.is_active {
        return Err(CommandError::Invalid(format!(
            "actuator {} is inactive",
            actuator.id
        )));
    }

    let action = match name.trim().to_ascii_uppercase().as_str() {
        "ON" => Action::On,
        "OFF" => Action::Off,
        "SET" => Action::Set(set_value(args)?),
        other => {
            return Err(CommandError::Invalid(format!("unknown command `{other}`")));
        }
    };

    match (actuator.actuator_type, action) {
        (ActuatorType::Binary, Action::On | Action::Off) => Ok(action),
        (ActuatorType::Binary, Action::Set(_)) => Err(CommandError::Invalid(
            "SET is not supported by binary actuators".to_string(),
        )),
        (ActuatorType::Level | ActuatorType::Setpoint, Action::On | Action::Off) => {
            Err(CommandError::Invalid(format!(
                "{} is only supported by binary actuators",
                action.name()
            )))
        }
        (kind, Action::Set(value)) => {
            check_range(actuator, value)?;
            if kind == ActuatorType::Level {
                check_step(actuator, value)?;
            }
            Ok(action)
        }
    }
}

fn set_value(args: &BTreeMap<String, String>) -> Result<f64, CommandError> {
    let raw = args
        .get("value")
        .ok_or_else(|| CommandError::Invalid("SET requires a `value` argument".to_string()))?;
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| CommandError::Invalid(format!("`value` is not a number: {raw}")))?;
    if !value.is_finite() {
        return Err(CommandError::Invalid("`value` must be finite".to_string()));
    }
    Ok(value)
}

fn check_range(actuator: &actuators::Model, value: f64) -> Result<(), CommandError> {
    if let Some(min) = actuator.range_min.filter(|min| value < *min) {
        return Err(CommandError::Invalid(format!(
            "value {value} is below the minimum {min}"
        )));
    }
    if let Some(max) = actuator.range_max.filter(|max| value > *max) {
        return Err(CommandError::Invalid(format!(
            "value {value} is above the maximum {max}"
        )));
    }
    Ok(())
}

fn check_step(actuator: &actuators::Model, value: f64) -> Result<(), CommandError> {
    let Some(step) = actuator.step.filter(|s| *s > 0.0) else {
        return Ok(());
    };
    let origin = actuator.range_min.unwrap_or(0.0);
    let steps = (value - origin) / step;
    if (steps - steps.round()).abs() > STEP_EPSILON * steps.abs().max(1.0) {
        return Err(CommandError::Invalid(format!(
            "value {value} is not a multiple of step {step} from {origin}"
        )));
    }
    Ok(())
}

/// Flatten a rule command's JSON arguments into string pairs.
#[must_use]
pub fn args_from_json(args: &serde_json::Value) -> BTreeMap<String, String> {
    args.as_object()
        .map(|object| {
            object
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Validate and persist a command as `queued`, together with its arguments.
///
/// Run inside a transaction when the caller needs the command and its
/// arguments to commit atomically with other writes.
///
/// # Errors
///
/// `Invalid` when the actuator is missing or the command does not fit it.
pub async fn submit<C: ConnectionTrait>(
    db: &C,
    request: &CommandRequest,
    at: DateTime<Utc>,
) -> Result<commands::Model, CommandError> {
    let actuator = actuators::Entity::find_by_id(request.actuator_id)
        .one(db)
        .await?
        .ok_or_else(|| {
            CommandError::Invalid(format!("actuator {} not found", request.actuator_id))
        })?;
    let action = validate(&actuator, &request.name, &request.args)?;

    let command = commands::ActiveModel {
        id: Set(Uuid::new_v4()),
        actuator_id: Set(actuator.id),
        name: Set(action.name().to_string()),
        issued_by: Set(request.issued_by),
        rule_id: Set(request.rule_id),
        alert_id: Set(request.alert_id),
        status: Set(CommandStatus::Queued),
        issued_at: Set(at.into()),
        sent_at: Set(None),
        completed_at: Set(None),
        error_text: Set(None),
    }
    .insert(db)
    .await?;

    if !request.args.is_empty() {
        command_args::Entity::insert_many(request.args.iter().map(|(name, value)| {
            command_args::ActiveModel {
                command_id: Set(command.id),
                name: Set(name.clone()),
                value: Set(value.clone()),
            }
        }))
        .exec_without_returning(db)
        .await?;
    }

    tracing::info!(
        command_id = %command.id,
        actuator_id = %actuator.id,
        command = %command.name,
        rule_id = ?request.rule_id,
        "command_queued"
    );
    Ok(command)
}

/// Queue a rule's command templates for a freshly opened alert.
///
/// Templates that no longer fit their actuator are skipped with a warning so
/// the alert still opens.
///
/// # Errors
///
/// Propagates database errors.
pub async fn queue_for_alert<C: ConnectionTrait>(
    db: &C,
    templates: &[rule_commands::Model],
    alert_id: Uuid,
    at: DateTime<Utc>,
) -> Result<Vec<commands::Model>, sea_orm::DbErr> {
    let mut queued = Vec::with_capacity(templates.len());
    for template in templates {
        let request = CommandRequest {
            actuator_id: template.actuator_id,
            name: template.name.clone(),
            args: args_from_json(&template.args),
            issued_by: None,
            rule_id: Some(template.rule_id),
            alert_id: Some(alert_id),
        };
        match submit(db, &request, at).await {
            Ok(command) => queued.push(command),
            Err(CommandError::Database(e)) => return Err(e),
            Err(e) => {
                tracing::warn!(
                    rule_id = %template.rule_id,
                    actuator_id = %template.actuator_id,
                    error = %e,
                    "rule_command_skipped"
                );
            }
        }
    }
    Ok(queued)
}

/// Loads, delivers and settles commands against the actuator gateway.
#[derive(Clone)]
pub struct CommandDispatcher {
    db: DatabaseConnection,
    gateway: Arc<dyn ActuatorGateway>,
    timeout: Duration,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(db: DatabaseConnection, gateway: Arc<dyn ActuatorGateway>, timeout: Duration) -> Self {
        Self {
            db,
            gateway,
            timeout,
        }
    }

    /// Validate and persist a command without delivering it.
    ///
    /// # Errors
    ///
    /// See [`submit`].
    pub async fn submit(&self, request: &CommandRequest) -> Result<commands::Model, CommandError> {
        let txn = self.db.begin().await?;
        let command = submit(&txn, request, Utc::now()).await?;
        txn.commit().await?;
        Ok(command)
    }

    /// Submit and deliver in the background. Returns the queued command.
    ///
    /// # Errors
    ///
    /// See [`submit`].
    pub async fn dispatch(&self, request: &CommandRequest) -> Result<commands::Model, CommandError> {
        let command = self.submit(request).await?;
        self.spawn_delivery(vec![command.id]);
        Ok(command)
    }

    /// Deliver already queued commands in the background, in order.
    pub fn spawn_delivery(&self, command_ids: Vec<Uuid>) {
        if command_ids.is_empty() {
            return;
        }
        let dispatcher = self.clone();
        tokio::spawn(async move {
            for id in command_ids {
                if let Err(e) = dispatcher.deliver(id).await {
                    tracing::error!(command_id = %id, error = %e, "command_delivery_failed");
                }
            }
        });
    }

    /// Deliver every command still `queued`, oldest first.
    ///
    /// Picks up commands whose background delivery never ran, for example
    /// because the process stopped right after they were committed. Commands
    /// claimed concurrently by another delivery are skipped.
    ///
    /// # Errors
    ///
    /// Propagates database errors from loading the backlog.
    pub async fn deliver_pending(&self) -> Result<usize, CommandError> {
        let pending = commands::Entity::find()
            .filter(commands::Column::Status.eq(CommandStatus::Queued))
            .order_by_asc(commands::Column::IssuedAt)
            .order_by_asc(commands::Column::Id)
            .all(&self.db)
            .await?;

        let mut delivered = 0;
        for command in pending {
            match self.deliver(command.id).await {
                Ok(_) => delivered += 1,
                Err(CommandError::WrongStatus { .. }) => {}
                Err(e) => {
                    tracing::error!(command_id = %command.id, error = %e, "command_delivery_failed");
                }
            }
        }
        if delivered > 0 {
            tracing::info!(delivered, "queued_commands_delivered");
        }
        Ok(delivered)
    }

    /// Move a queued command to `sent` and hand it to the gateway.
    ///
    /// Gateway errors and timeouts settle the command as `failed`; they are
    /// not returned as errors.
    ///
    /// # Errors
    ///
    /// `NotFound`, `WrongStatus` when the command is not queued, or a
    /// database error.
    pub async fn deliver(&self, command_id: Uuid) -> Result<commands::Model, CommandError> {
        let now = Utc::now().fixed_offset();
        let claimed = commands::Entity::update_many()
            .set(commands::ActiveModel {
                status: Set(CommandStatus::Sent),
                sent_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(commands::Column::Id.eq(command_id))
            .filter(commands::Column::Status.eq(CommandStatus::Queued))
            .exec(&self.db)
            .await?;

        let (command, args) = self.load(command_id).await?;
        if claimed.rows_affected == 0 {
            return Err(CommandError::WrongStatus {
                id: command_id,
                status: command.status,
            });
        }

        let actuator_name = actuators::Entity::find_by_id(command.actuator_id)
            .one(&self.db)
            .await?
            .map(|a| a.name)
            .unwrap_or_default();
        let request = ExecuteRequest {
            command_id,
            actuator_id: command.actuator_id,
            actuator_name,
            command: command.name.clone(),
            args,
        };

        tracing::debug!(command_id = %command_id, command = %request.command, "command_sent");
        let outcome = match tokio::time::timeout(self.timeout, self.gateway.execute(&request)).await {
            Ok(result) => result,
            Err(_) => Err(format!("gateway timed out after {:?}", self.timeout)),
        };

        match outcome {
            Ok(Delivery::Accepted) => Ok(command),
            Ok(Delivery::Completed) => self.settle(command_id, Ok(())).await,
            Err(reason) => self.settle(command_id, Err(reason)).await,
        }
    }

    /// Record the gateway's asynchronous report for a `sent` command.
    ///
    /// # Errors
    ///
    /// `NotFound`, `WrongStatus` when the command is not `sent`, or a
    /// database error.
    pub async fn record_outcome(
        &self,
        command_id: Uuid,
        outcome: Result<(), String>,
    ) -> Result<commands::Model, CommandError> {
        self.settle(command_id, outcome).await
    }

    /// A command and its arguments.
    ///
    /// # Errors
    ///
    /// `NotFound` or a database error.
    pub async fn load(
        &self,
        command_id: Uuid,
    ) -> Result<(commands::Model, BTreeMap<String, String>), CommandError> {
        let command = commands::Entity::find_by_id(command_id)
            .one(&self.db)
            .await?
            .ok_or(CommandError::NotFound(command_id))?;
        let args = command_args::Entity::find()
            .filter(command_args::Column::CommandId.eq(command_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|arg| (arg.name, arg.value))
            .collect();
        Ok((command, args))
    }

    async fn settle(
        &self,
        command_id: Uuid,
        outcome: Result<(), String>,
    ) -> Result<commands::Model, CommandError> {
        let (command, args) = self.load(command_id).await?;
        if command.status != CommandStatus::Sent {
            return Err(CommandError::WrongStatus {
                id: command_id,
                status: command.status,
            });
        }

        let now = Utc::now().fixed_offset();
        let (status, error_text) = match &outcome {
            Ok(()) => (CommandStatus::Success, None),
            Err(reason) => (CommandStatus::Failed, Some(reason.clone())),
        };

        let txn = self.db.begin().await?;
        let settled = commands::Entity::update_many()
            .set(commands::ActiveModel {
                status: Set(status),
                completed_at: Set(Some(now)),
                error_text: Set(error_text),
                ..Default::default()
            })
            .filter(commands::Column::Id.eq(command_id))
            .filter(commands::Column::Status.eq(CommandStatus::Sent))
            .exec(&txn)
            .await?;

        if settled.rows_affected == 0 {
            txn.rollback().await?;
            let (current, _) = self.load(command_id).await?;
            return Err(CommandError::WrongStatus {
                id: command_id,
                status: current.status,
            });
        }

        if outcome.is_ok() {
            if let Some(value) = resulting_value(&command.name, &args) {
                actuators::Entity::update_many()
                    .set(actuators::ActiveModel {
                        last_value: Set(Some(value)),
                        updated_at: Set(Some(now)),
                        ..Default::default()
                    })
                    .filter(actuators::Column::Id.eq(command.actuator_id))
                    .exec(&txn)
                    .await?;
            }
        }
        txn.commit().await?;

        match &outcome {
            Ok(()) => tracing::info!(command_id = %command_id, "command_succeeded"),
            Err(reason) => {
                tracing::warn!(command_id = %command_id, error = %reason, "command_failed");
            }
        }

        let (command, _) = self.load(command_id).await?;
        Ok(command)
    }
}

fn resulting_value(name: &str, args: &BTreeMap<String, String>) -> Option<f64> {
    match name {
        "ON" => Some(Action::On.resulting_value()),
        "OFF" => Some(Action::Off.resulting_value()),
        "SET" => set_value(args).ok(),
        _ => None,
    }
}
