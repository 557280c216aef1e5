use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use utoipa::ToSchema;
use uuid::Uuid;

use super::alerts::{self, AlertChange};
use super::commands::{self, CommandDispatcher};
use super::window::WindowAggregator;
use super::{EvalError, FailureKind};
use crate::entity::{rule_commands, rule_sensors, rules, sensors};
use crate::expr::{Environment, Expr, ExpressionCache};

/// A rule and everything its evaluation needs, read once per pass.
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    pub rule: rules::Model,
    pub sensors: Vec<sensors::Model>,
    pub commands: Vec<rule_commands::Model>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RuleFailure {
    pub rule_id: Uuid,
    pub sensor_id: Option<Uuid>,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Opened,
    Closed,
    Kept,
    Quiet,
    Stale,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RuleOutcome {
    pub rule_id: Uuid,
    pub status: OutcomeStatus,
    /// Condition result; absent when the rule could not be evaluated.
    pub active: Option<bool>,
    pub alert_id: Option<Uuid>,
    /// Commands queued by this evaluation.
    pub commands: Vec<Uuid>,
}

impl RuleOutcome {
    fn without_result(rule_id: Uuid, status: OutcomeStatus) -> Self {
        Self {
            rule_id,
            status,
            active: None,
            alert_id: None,
            commands: Vec::new(),
        }
    }
}

/// Summary of one evaluation pass, ordered by rule id.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PassReport {
    pub evaluated_at: DateTime<Utc>,
    pub rules_total: usize,
    pub evaluated: usize,
    pub opened: usize,
    pub closed: usize,
    pub skipped: usize,
    pub outcomes: Vec<RuleOutcome>,
    pub failures: Vec<RuleFailure>,
}

impl PassReport {
    /// Whether any rule failed on store trouble that a retry could clear.
    #[must_use]
    pub fn has_transient_failures(&self) -> bool {
        self.failures.iter().any(|f| {
            matches!(
                f.kind,
                FailureKind::StoreTimeout | FailureKind::StoreRead | FailureKind::StoreWrite
            )
        })
    }

    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Evaluates enabled rules and drives their alerts.
pub struct RuleEngine {
    db: DatabaseConnection,
    aggregator: WindowAggregator,
    expressions: ExpressionCache,
    dispatcher: CommandDispatcher,
    concurrency: usize,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl RuleEngine {
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        aggregator: WindowAggregator,
        expressions: ExpressionCache,
        dispatcher: CommandDispatcher,
        concurrency: usize,
    ) -> Self {
        Self {
            db,
            aggregator,
            expressions,
            dispatcher,
            concurrency: concurrency.max(1),
            locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn expressions(&self) -> &ExpressionCache {
        &self.expressions
    }

    /// Drop the lock slot of a deleted rule.
    pub fn forget_rule(&self, rule_id: Uuid) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&rule_id);
    }

    fn lock_for(&self, rule_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(rule_id)
            .or_default()
            .clone()
    }

    /// Enabled rules ordered by id, with their bindings and command templates.
    ///
    /// # Errors
    ///
    /// Propagates database errors.
    pub async fn snapshot(&self) -> Result<Vec<RuleSnapshot>, sea_orm::DbErr> {
        let rules = rules::Entity::find()
            .filter(rules::Column::Enabled.eq(true))
            .order_by_asc(rules::Column::Id)
            .all(&self.db)
            .await?;
        if rules.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rules.iter().map(|r| r.id).collect();

        let mut bound: HashMap<Uuid, Vec<sensors::Model>> = HashMap::new();
        for (binding, sensor) in rule_sensors::Entity::find()
            .filter(rule_sensors::Column::RuleId.is_in(ids.clone()))
            .find_also_related(sensors::Entity)
            .all(&self.db)
            .await?
        {
            if let Some(sensor) = sensor {
                bound.entry(binding.rule_id).or_default().push(sensor);
            }
        }

        let mut templates: HashMap<Uuid, Vec<rule_commands::Model>> = HashMap::new();
        for template in rule_commands::Entity::find()
            .filter(rule_commands::Column::RuleId.is_in(ids))
            .order_by_asc(rule_commands::Column::Id)
            .all(&self.db)
            .await?
        {
            templates.entry(template.rule_id).or_default().push(template);
        }

        Ok(rules
            .into_iter()
            .map(|rule| {
                let mut sensors = bound.remove(&rule.id).unwrap_or_default();
                sensors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
                RuleSnapshot {
                    commands: templates.remove(&rule.id).unwrap_or_default(),
                    sensors,
                    rule,
                }
            })
            .collect())
    }

    /// Evaluate every enabled rule as of `at`.
    ///
    /// Rules run with bounded parallelism. A rule that fails is recorded in
    /// the report and does not affect the others. Once `shutdown` reads
    /// `true`, rules that have not started are reported as skipped.
    ///
    /// # Errors
    ///
    /// Only a failure to read the rule snapshot aborts the pass.
    pub async fn run_pass(
        &self,
        at: DateTime<Utc>,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<PassReport, sea_orm::DbErr> {
        let snapshot = self.snapshot().await?;
        let rules_total = snapshot.len();
        tracing::debug!(rules = rules_total, at = %at, "evaluation_pass_started");

        let shutdown = &shutdown;
        let mut results: Vec<(RuleOutcome, Option<RuleFailure>)> = stream::iter(snapshot)
            .map(|rule| async move {
                if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                    return (
                        RuleOutcome::without_result(rule.rule.id, OutcomeStatus::Skipped),
                        None,
                    );
                }
                self.evaluate(&rule, at).await
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(outcome, _)| outcome.rule_id);

        let (outcomes, failures): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        let mut report = PassReport {
            evaluated_at: at,
            rules_total,
            evaluated: 0,
            opened: 0,
            closed: 0,
            skipped: 0,
            outcomes,
            failures: failures.into_iter().flatten().collect(),
        };
        report.opened = report.count(OutcomeStatus::Opened);
        report.closed = report.count(OutcomeStatus::Closed);
        report.skipped = report.count(OutcomeStatus::Skipped);
        report.evaluated = report
            .outcomes
            .iter()
            .filter(|o| o.active.is_some())
            .count();

        tracing::info!(
            rules = rules_total,
            evaluated = report.evaluated,
            opened = report.opened,
            closed = report.closed,
            failed = report.failures.len(),
            skipped = report.skipped,
            "evaluation_pass_finished"
        );
        Ok(report)
    }

    /// Evaluate one rule and apply the result to its alert.
    pub async fn evaluate(
        &self,
        snapshot: &RuleSnapshot,
        at: DateTime<Utc>,
    ) -> (RuleOutcome, Option<RuleFailure>) {
        let rule_id = snapshot.rule.id;

        match self.try_evaluate(snapshot, at).await {
            Ok(outcome) => (outcome, None),
            Err(error) => {
                let failure = RuleFailure {
                    rule_id,
                    sensor_id: error.sensor_id(),
                    kind: error.kind(),
                    message: error.to_string(),
                };
                tracing::warn!(
                    rule_id = %rule_id,
                    sensor_id = ?failure.sensor_id,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "rule_evaluation_failed"
                );

                let status = if matches!(error, EvalError::Stale { .. }) {
                    self.flag_stale(rule_id, at).await
                } else {
                    OutcomeStatus::Failed
                };
                (RuleOutcome::without_result(rule_id, status), Some(failure))
            }
        }
    }

    async fn flag_stale(&self, rule_id: Uuid, at: DateTime<Utc>) -> OutcomeStatus {
        let lock = self.lock_for(rule_id);
        let _guard = lock.lock().await;
        match alerts::mark_stale(&self.db, rule_id, at).await {
            Ok(_) => OutcomeStatus::Stale,
            Err(e) => {
                tracing::error!(rule_id = %rule_id, error = %e, "alert_stale_flag_failed");
                OutcomeStatus::Failed
            }
        }
    }

    async fn try_evaluate(
        &self,
        snapshot: &RuleSnapshot,
        at: DateTime<Utc>,
    ) -> Result<RuleOutcome, EvalError> {
        let rule = &snapshot.rule;
        let expr = self.expressions.get_or_parse(&rule.expression).await?;
        let env = self
            .aggregator
            .environment(&snapshot.sensors, rule.window_s, at)
            .await?;
        let active = expr.evaluate(&env)?;

        tracing::debug!(rule_id = %rule.id, active, "rule_evaluated");

        let sensor_id = match snapshot.sensors.as_slice() {
            [only] => Some(only.id),
            _ => None,
        };

        let lock = self.lock_for(rule.id);
        let _guard = lock.lock().await;

        let txn = self.db.begin().await?;
        let change = alerts::apply(
            &txn,
            rule,
            sensor_id,
            active,
            alert_message(rule, &expr, &env),
            at,
        )
        .await?;
        let queued = match &change {
            AlertChange::Opened(alert) => {
                commands::queue_for_alert(&txn, &snapshot.commands, alert.id, at).await?
            }
            _ => Vec::new(),
        };
        txn.commit().await?;

        let command_ids: Vec<Uuid> = queued.iter().map(|c| c.id).collect();
        self.dispatcher.spawn_delivery(command_ids.clone());

        let status = match change {
            AlertChange::Opened(_) => OutcomeStatus::Opened,
            AlertChange::Closed(_) => OutcomeStatus::Closed,
            AlertChange::Kept(_) => OutcomeStatus::Kept,
            AlertChange::Unchanged => OutcomeStatus::Quiet,
        };
        Ok(RuleOutcome {
            rule_id: rule.id,
            status,
            active: Some(active),
            alert_id: change.alert().map(|a| a.id),
            commands: command_ids,
        })
    }
}

/// `"<name> [<severity>]: <expression> (<var>=<value>, ...)"` over the
/// variables the expression references.
fn alert_message(rule: &rules::Model, expr: &Expr, env: &Environment) -> String {
    let values: Vec<String> = expr
        .variables()
        .into_iter()
        .filter_map(|name| env.get(name).map(|v| format!("{name}={v}")))
        .collect();

    if values.is_empty() {
        format!("{} [{}]: {}", rule.name, rule.severity, rule.expression)
    } else {
        format!(
            "{} [{}]: {} ({})",
            rule.name,
            rule.severity,
            rule.expression,
            values.join(", ")
        )
    }
}
