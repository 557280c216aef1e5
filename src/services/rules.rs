//! Rule CRUD.
//!
//! A rule is checked as a whole before anything is written: the expression
//! must parse, every bound sensor must exist, the bound sensors must not
//! collide on variable names, every variable the expression references must
//! be provided by a bound sensor, and every command template must fit its
//! actuator.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::engine::RuleEngine;
use crate::engine::commands;
use crate::engine::window::{binding_conflict, derived_names, variable_name};
use crate::entity::rules::{self, Severity};
use crate::entity::{actuators, alerts, rule_commands, rule_sensors, sensors};
use crate::error::{AppError, AppResult};
use crate::expr::parse;

/// Longest expression text accepted, in bytes.
pub const MAX_EXPRESSION_LEN: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RuleCommandInput {
    pub actuator_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RuleInput {
    pub user_id: Uuid,
    pub name: String,
    pub expression: String,
    #[serde(default)]
    pub window_s: i32,
    pub severity: Option<Severity>,
    pub enabled: Option<bool>,
    #[serde(default)]
    pub sensor_ids: Vec<Uuid>,
    #[serde(default)]
    pub commands: Vec<RuleCommandInput>,
}

/// A rule with its bindings and command templates.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RuleDetail {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub expression: String,
    pub window_s: i32,
    pub severity: Severity,
    pub enabled: bool,
    pub sensor_ids: Vec<Uuid>,
    /// Variable names the bound sensors provide.
    pub variables: Vec<String>,
    pub commands: Vec<RuleCommandInput>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: Option<chrono::DateTime<Utc>>,
}

/// Check a rule definition against the catalog.
///
/// # Errors
///
/// `BadRequest` describing the first problem found.
pub async fn validate<C: ConnectionTrait>(db: &C, input: &RuleInput) -> AppResult<Vec<sensors::Model>> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("rule name must not be empty".to_string()));
    }
    if input.window_s < 0 {
        return Err(AppError::BadRequest("window_s must not be negative".to_string()));
    }
    if input.expression.len() > MAX_EXPRESSION_LEN {
        return Err(AppError::BadRequest(format!(
            "expression must be at most {MAX_EXPRESSION_LEN} bytes"
        )));
    }
    let expr = parse(&input.expression)?;

    let requested: BTreeSet<Uuid> = input.sensor_ids.iter().copied().collect();
    let bound = if requested.is_empty() {
        Vec::new()
    } else {
        sensors::Entity::find()
            .filter(sensors::Column::Id.is_in(requested.iter().copied()))
            .all(db)
            .await?
    };
    if let Some(missing) = requested
        .iter()
        .find(|id| !bound.iter().any(|s| s.id == **id))
    {
        return Err(AppError::BadRequest(format!("Sensor {missing} does not exist")));
    }

    if let Some((name, first, second)) = binding_conflict(&bound, input.window_s) {
        return Err(AppError::BadRequest(format!(
            "Sensors {first} and {second} both bind variable `{name}`"
        )));
    }
    let available: BTreeSet<String> = bound
        .iter()
        .flat_map(|sensor| derived_names(&variable_name(&sensor.name), input.window_s))
        .collect();
    let unbound: Vec<&str> = expr
        .variables()
        .into_iter()
        .filter(|name| !available.contains(*name))
        .collect();
    if !unbound.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Expression references unbound variables: {}",
            unbound.join(", ")
        )));
    }

    for template in &input.commands {
        let actuator = actuators::Entity::find_by_id(template.actuator_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(format!("Actuator {} does not exist", template.actuator_id))
            })?;
        commands::validate(&actuator, &template.name, &template.args)?;
    }

    Ok(bound)
}

async fn write_children<C: ConnectionTrait>(
    db: &C,
    rule_id: Uuid,
    sensors: &[sensors::Model],
    templates: &[RuleCommandInput],
) -> Result<(), sea_orm::DbErr> {
    if !sensors.is_empty() {
        rule_sensors::Entity::insert_many(sensors.iter().map(|s| rule_sensors::ActiveModel {
            rule_id: Set(rule_id),
            sensor_id: Set(s.id),
        }))
        .exec_without_returning(db)
        .await?;
    }

    for template in templates {
        rule_commands::ActiveModel {
            id: Set(Uuid::new_v4()),
            rule_id: Set(rule_id),
            actuator_id: Set(template.actuator_id),
            name: Set(template.name.trim().to_ascii_uppercase()),
            args: Set(serde_json::json!(template.args)),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

async fn clear_children<C: ConnectionTrait>(db: &C, rule_id: Uuid) -> Result<(), sea_orm::DbErr> {
    rule_sensors::Entity::delete_many()
        .filter(rule_sensors::Column::RuleId.eq(rule_id))
        .exec(db)
        .await?;
    rule_commands::Entity::delete_many()
        .filter(rule_commands::Column::RuleId.eq(rule_id))
        .exec(db)
        .await?;
    Ok(())
}

/// # Errors
///
/// `BadRequest` when validation fails.
pub async fn create_rule(db: &DatabaseConnection, input: RuleInput) -> AppResult<RuleDetail> {
    let txn = db.begin().await?;
    let sensors = validate(&txn, &input).await?;

    let rule = rules::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(input.user_id),
        name: Set(input.name.trim().to_string()),
        expression: Set(input.expression.clone()),
        window_s: Set(input.window_s),
        severity: Set(input.severity.unwrap_or(Severity::Warning)),
        enabled: Set(input.enabled.unwrap_or(true)),
        created_at: Set(Utc::now().into()),
        updated_at: Set(None),
    }
    .insert(&txn)
    .await?;
    write_children(&txn, rule.id, &sensors, &input.commands).await?;
    txn.commit().await?;

    tracing::info!(rule_id = %rule.id, expression = %rule.expression, "rule_created");
    get_rule(db, rule.id).await
}

/// Replace a rule's definition, bindings and command templates.
///
/// # Errors
///
/// `NotFound` for an unknown id, `BadRequest` when validation fails.
pub async fn update_rule(
    db: &DatabaseConnection,
    engine: &RuleEngine,
    id: Uuid,
    input: RuleInput,
) -> AppResult<RuleDetail> {
    let txn = db.begin().await?;
    let existing = find_rule(&txn, id).await?;
    let sensors = validate(&txn, &input).await?;

    let previous_expression = existing.expression.clone();
    let mut rule: rules::ActiveModel = existing.into();
    rule.user_id = Set(input.user_id);
    rule.name = Set(input.name.trim().to_string());
    rule.expression = Set(input.expression.clone());
    rule.window_s = Set(input.window_s);
    if let Some(severity) = input.severity {
        rule.severity = Set(severity);
    }
    if let Some(enabled) = input.enabled {
        rule.enabled = Set(enabled);
    }
    rule.updated_at = Set(Some(Utc::now().into()));
    rule.update(&txn).await?;

    clear_children(&txn, id).await?;
    write_children(&txn, id, &sensors, &input.commands).await?;
    txn.commit().await?;

    if previous_expression != input.expression {
        engine.expressions().invalidate(&previous_expression).await;
    }
    tracing::info!(rule_id = %id, "rule_updated");
    get_rule(db, id).await
}

/// # Errors
///
/// `NotFound` for an unknown id.
pub async fn set_enabled(db: &DatabaseConnection, id: Uuid, enabled: bool) -> AppResult<RuleDetail> {
    let mut rule: rules::ActiveModel = find_rule(db, id).await?.into();
    rule.enabled = Set(enabled);
    rule.updated_at = Set(Some(Utc::now().into()));
    rule.update(db).await?;

    tracing::info!(rule_id = %id, enabled, "rule_toggled");
    get_rule(db, id).await
}

/// Delete a rule with its bindings, templates and alerts. Commands it issued
/// are kept as history.
///
/// # Errors
///
/// `NotFound` for an unknown id.
pub async fn delete_rule(db: &DatabaseConnection, engine: &RuleEngine, id: Uuid) -> AppResult<()> {
    let txn = db.begin().await?;
    find_rule(&txn, id).await?;
    clear_children(&txn, id).await?;
    alerts::Entity::delete_many()
        .filter(alerts::Column::RuleId.eq(id))
        .exec(&txn)
        .await?;
    rules::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    engine.forget_rule(id);
    tracing::info!(rule_id = %id, "rule_deleted");
    Ok(())
}

async fn find_rule<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<rules::Model> {
    rules::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Rule {id} not found")))
}

/// # Errors
///
/// `NotFound` for an unknown id.
pub async fn get_rule(db: &DatabaseConnection, id: Uuid) -> AppResult<RuleDetail> {
    let rule = find_rule(db, id).await?;
    let mut details = describe(db, vec![rule]).await?;
    details
        .pop()
        .ok_or_else(|| AppError::Internal(format!("Rule {id} vanished while loading")))
}

/// # Errors
///
/// Propagates database errors.
pub async fn list_rules(db: &DatabaseConnection, user_id: Option<Uuid>) -> AppResult<Vec<RuleDetail>> {
    let mut query = rules::Entity::find();
    if let Some(user_id) = user_id {
        query = query.filter(rules::Column::UserId.eq(user_id));
    }
    let rules = query.order_by_asc(rules::Column::Id).all(db).await?;
    describe(db, rules).await
}

async fn describe(db: &DatabaseConnection, rules: Vec<rules::Model>) -> AppResult<Vec<RuleDetail>> {
    if rules.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rules.iter().map(|r| r.id).collect();

    let mut bound: HashMap<Uuid, Vec<sensors::Model>> = HashMap::new();
    for (binding, sensor) in rule_sensors::Entity::find()
        .filter(rule_sensors::Column::RuleId.is_in(ids.clone()))
        .find_also_related(sensors::Entity)
        .all(db)
        .await?
    {
        if let Some(sensor) = sensor {
            bound.entry(binding.rule_id).or_default().push(sensor);
        }
    }

    let mut templates: HashMap<Uuid, Vec<RuleCommandInput>> = HashMap::new();
    for template in rule_commands::Entity::find()
        .filter(rule_commands::Column::RuleId.is_in(ids))
        .order_by_asc(rule_commands::Column::Id)
        .all(db)
        .await?
    {
        templates
            .entry(template.rule_id)
            .or_default()
            .push(RuleCommandInput {
                actuator_id: template.actuator_id,
                args: commands::args_from_json(&template.args),
                name: template.name,
            });
    }

    Ok(rules
        .into_iter()
        .map(|rule| {
            let mut sensors = bound.remove(&rule.id).unwrap_or_default();
            sensors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            let variables = sensors
                .iter()
                .flat_map(|s| derived_names(&variable_name(&s.name), rule.window_s))
                .collect();

            RuleDetail {
                id: rule.id,
                user_id: rule.user_id,
                name: rule.name,
                expression: rule.expression,
                window_s: rule.window_s,
                severity: rule.severity,
                enabled: rule.enabled,
                sensor_ids: sensors.iter().map(|s| s.id).collect(),
                variables,
                commands: templates.remove(&rule.id).unwrap_or_default(),
                created_at: rule.created_at.with_timezone(&Utc),
                updated_at: rule.updated_at.map(|t| t.with_timezone(&Utc)),
            }
        })
        .collect())
}
