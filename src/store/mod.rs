//! Readings store adapter.
//!
//! The time-series backend is an external collaborator; the engine only
//! needs to append points, fetch the latest point, and fetch a trailing
//! window. Every call made by the engine goes through [`with_timeout`].

mod db;
mod memory;

pub use db::DbReadingsStore;
pub use memory::MemoryReadingsStore;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

/// How far back `latest_reading` looks before reporting "no data".
pub const LATEST_LOOKBACK_DAYS: i64 = 30;

/// One time-stamped scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Reading {
    pub time: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store write failed: {0}")]
    Write(String),

    #[error("store read failed: {0}")]
    Read(String),
}

/// Append-only reading storage keyed by sensor.
///
/// Implementations keep one value per (sensor, instant); a second write for
/// the same instant replaces the first. Reads racing a write may observe
/// either value.
pub trait ReadingsStore: Send + Sync {
    fn write_reading(
        &self,
        sensor_id: Uuid,
        time: DateTime<Utc>,
        value: f64,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Most recent reading at or before `at`, within [`LATEST_LOOKBACK_DAYS`].
    fn latest_reading(
        &self,
        sensor_id: Uuid,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Option<Reading>, StoreError>>;

    /// Readings in `[until - window, until]`, ascending by time.
    fn windowed_series(
        &self,
        sensor_id: Uuid,
        until: DateTime<Utc>,
        window: chrono::Duration,
    ) -> BoxFuture<'_, Result<Vec<Reading>, StoreError>>;
}

/// Bound a store call; expiry becomes `StoreError::Timeout`.
///
/// # Errors
///
/// Returns the call's own error, or `StoreError::Timeout` after `limit`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}
