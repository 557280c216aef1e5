//! Rule evaluation and alerting.
//!
//! A pass runs leaf-first: the window aggregator turns bound sensors into an
//! expression environment, the rule engine evaluates each enabled rule, the
//! alert state machine turns the boolean into lifecycle transitions, and the
//! command dispatcher issues the rule's commands on the open edge.

pub mod alerts;
pub mod commands;
pub mod rules;
pub mod window;

pub use alerts::{AlertChange, AlertError, Transition};
pub use commands::{CommandDispatcher, CommandError, CommandRequest};
pub use rules::{PassReport, RuleEngine, RuleFailure, RuleOutcome};
pub use window::WindowAggregator;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::expr::ExprError;
use crate::store::StoreError;

/// Why a single rule could not be evaluated during a pass.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Expression(#[from] ExprError),

    #[error("stale data for sensor {sensor_id}: {detail}")]
    Stale { sensor_id: Uuid, detail: String },

    #[error("readings store error for sensor {sensor_id}: {source}")]
    Store {
        sensor_id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("sensors {first} and {second} both bind variable `{name}`")]
    BindingConflict {
        name: String,
        first: Uuid,
        second: Uuid,
    },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Failure classification carried in a [`PassReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Parse,
    UnboundVariable,
    StaleData,
    StoreTimeout,
    StoreWrite,
    StoreRead,
    BindingConflict,
    Database,
}

impl EvalError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Expression(ExprError::Parse { .. }) => FailureKind::Parse,
            Self::Expression(ExprError::UnboundVariable(_)) => FailureKind::UnboundVariable,
            Self::Stale { .. } => FailureKind::StaleData,
            Self::Store { source, .. } => match source {
                StoreError::Timeout(_) => FailureKind::StoreTimeout,
                StoreError::Write(_) => FailureKind::StoreWrite,
                StoreError::Read(_) => FailureKind::StoreRead,
            },
            Self::BindingConflict { .. } => FailureKind::BindingConflict,
            Self::Database(_) => FailureKind::Database,
        }
    }

    /// The sensor the failure is attributable to, if any.
    #[must_use]
    pub fn sensor_id(&self) -> Option<Uuid> {
        match self {
            Self::Stale { sensor_id, .. } | Self::Store { sensor_id, .. } => Some(*sensor_id),
            Self::BindingConflict { second, .. } => Some(*second),
            Self::Expression(_) | Self::Database(_) => None,
        }
    }

    /// Store trouble is worth retrying; everything else is a property of the
    /// rule or its data and will fail the same way again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}
