//! Alert lifecycle.
//!
//! A rule has at most one non-closed alert. The rule engine serialises
//! transitions per rule; acknowledgement is a conditional update so it can
//! race a concurrent close without resurrecting the alert.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::entity::alerts::{self, AlertState};
use crate::entity::rules;

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert {0} not found")]
    NotFound(Uuid),

    #[error("alert {0} is already closed")]
    AlreadyClosed(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// What the state machine does with one evaluation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Open,
    Close,
    Keep,
    Nothing,
}

/// Transition table for a condition result against the current alert state.
#[must_use]
pub fn next(current: Option<AlertState>, active: bool) -> Transition {
    match (current.filter(|s| s.is_active()), active) {
        (None, true) => Transition::Open,
        (None, false) => Transition::Nothing,
        (Some(_), true) => Transition::Keep,
        (Some(_), false) => Transition::Close,
    }
}

/// Result of applying one evaluation to a rule's alert.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertChange {
    Opened(alerts::Model),
    Closed(alerts::Model),
    Kept(alerts::Model),
    Unchanged,
}

impl AlertChange {
    #[must_use]
    pub fn alert(&self) -> Option<&alerts::Model> {
        match self {
            Self::Opened(a) | Self::Closed(a) | Self::Kept(a) => Some(a),
            Self::Unchanged => None,
        }
    }
}

/// The rule's open or acknowledged alert, if any.
///
/// # Errors
///
/// Propagates database errors.
pub async fn current_alert<C: ConnectionTrait>(
    db: &C,
    rule_id: Uuid,
) -> Result<Option<alerts::Model>, sea_orm::DbErr> {
    alerts::Entity::find()
        .filter(alerts::Column::RuleId.eq(rule_id))
        .filter(alerts::Column::State.is_in([AlertState::Open, AlertState::Ack]))
        .order_by_desc(alerts::Column::StartedAt)
        .one(db)
        .await
}

/// Feed one evaluation result into the rule's alert.
///
/// Callers hold the rule's lock and run this inside a transaction.
///
/// # Errors
///
/// Propagates database errors; a concurrent open elsewhere trips the
/// one-active-alert-per-rule index.
pub async fn apply<C: ConnectionTrait>(
    db: &C,
    rule: &rules::Model,
    sensor_id: Option<Uuid>,
    active: bool,
    message: String,
    at: DateTime<Utc>,
) -> Result<AlertChange, sea_orm::DbErr> {
    let current = current_alert(db, rule.id).await?;
    let transition = next(current.as_ref().map(|a| a.state), active);

    match (transition, current) {
        (Transition::Open, _) => {
            let alert = alerts::ActiveModel {
                id: Set(Uuid::new_v4()),
                rule_id: Set(rule.id),
                sensor_id: Set(sensor_id),
                severity: Set(rule.severity),
                state: Set(AlertState::Open),
                message: Set(Some(message)),
                started_at: Set(at.into()),
                ended_at: Set(None),
                ack_by: Set(None),
                ack_at: Set(None),
                stale: Set(false),
                updated_at: Set(None),
            }
            .insert(db)
            .await?;

            tracing::info!(
                rule_id = %rule.id,
                alert_id = %alert.id,
                severity = %rule.severity,
                "alert_opened"
            );
            Ok(AlertChange::Opened(alert))
        }
        (Transition::Close, Some(alert)) => {
            let mut update: alerts::ActiveModel = alert.into();
            update.state = Set(AlertState::Closed);
            update.ended_at = Set(Some(at.into()));
            update.stale = Set(false);
            update.updated_at = Set(Some(at.into()));
            let alert = update.update(db).await?;

            tracing::info!(rule_id = %rule.id, alert_id = %alert.id, "alert_closed");
            Ok(AlertChange::Closed(alert))
        }
        (Transition::Keep, Some(alert)) if alert.stale => {
            let mut update: alerts::ActiveModel = alert.into();
            update.stale = Set(false);
            update.updated_at = Set(Some(at.into()));
            let alert = update.update(db).await?;

            tracing::debug!(rule_id = %rule.id, alert_id = %alert.id, "alert_stale_cleared");
            Ok(AlertChange::Kept(alert))
        }
        (Transition::Keep, Some(alert)) => Ok(AlertChange::Kept(alert)),
        _ => Ok(AlertChange::Unchanged),
    }
}

/// Flag the rule's active alert as running on stale inputs.
///
/// Returns the alert when the flag was newly set.
///
/// # Errors
///
/// Propagates database errors.
pub async fn mark_stale<C: ConnectionTrait>(
    db: &C,
    rule_id: Uuid,
    at: DateTime<Utc>,
) -> Result<Option<alerts::Model>, sea_orm::DbErr> {
    let Some(alert) = current_alert(db, rule_id).await? else {
        return Ok(None);
    };
    if alert.stale {
        return Ok(None);
    }

    let mut update: alerts::ActiveModel = alert.into();
    update.stale = Set(true);
    update.updated_at = Set(Some(at.into()));
    let alert = update.update(db).await?;

    tracing::info!(rule_id = %rule_id, alert_id = %alert.id, "alert_marked_stale");
    Ok(Some(alert))
}

/// Acknowledge an open alert on behalf of `user_id`.
///
/// Acknowledging an already acknowledged alert returns it unchanged, so the
/// first acknowledgement is the one recorded.
///
/// # Errors
///
/// `NotFound` for an unknown id, `AlreadyClosed` for a closed alert.
pub async fn acknowledge<C: ConnectionTrait>(
    db: &C,
    alert_id: Uuid,
    user_id: Uuid,
    at: DateTime<Utc>,
) -> Result<alerts::Model, AlertError> {
    let at = at.fixed_offset();

    let result = alerts::Entity::update_many()
        .set(alerts::ActiveModel {
            state: Set(AlertState::Ack),
            ack_by: Set(Some(user_id)),
            ack_at: Set(Some(at)),
            updated_at: Set(Some(at)),
            ..Default::default()
        })
        .filter(alerts::Column::Id.eq(alert_id))
        .filter(alerts::Column::State.eq(AlertState::Open))
        .exec(db)
        .await?;

    let alert = alerts::Entity::find_by_id(alert_id)
        .one(db)
        .await?
        .ok_or(AlertError::NotFound(alert_id))?;

    match alert.state {
        AlertState::Closed => Err(AlertError::AlreadyClosed(alert_id)),
        AlertState::Ack | AlertState::Open => {
            if result.rows_affected > 0 {
                tracing::info!(alert_id = %alert_id, user_id = %user_id, "alert_acknowledged");
            }
            Ok(alert)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use AlertState::{Ack, Closed, Open};

        assert_eq!(next(None, true), Transition::Open);
        assert_eq!(next(Some(Closed), true), Transition::Open);
        assert_eq!(next(Some(Open), true), Transition::Keep);
        assert_eq!(next(Some(Ack), true), Transition::Keep);
        assert_eq!(next(Some(Open), false), Transition::Close);
        assert_eq!(next(Some(Ack), false), Transition::Close);
        assert_eq!(next(None, false), Transition::Nothing);
        assert_eq!(next(Some(Closed), false), Transition::Nothing);
    }

    #[test]
    fn repeated_activity_opens_once() {
        let mut state: Option<AlertState> = None;
        let mut opened = 0;
        for active in [true, true, true, false, false, true] {
            match next(state, active) {
                Transition::Open => {
                    opened += 1;
                    state = Some(AlertState::Open);
                }
                Transition::Close => state = Some(AlertState::Closed),
                Transition::Keep | Transition::Nothing => {}
            }
        }
        assert_eq!(opened, 2);
        assert_eq!(state, Some(AlertState::Open));
    }
}
