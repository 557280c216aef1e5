use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::catalog::get_sensor;
use crate::store::{Reading, ReadingsStore, with_timeout};

/// Longest window served by [`series`].
pub const MAX_SERIES_WINDOW_S: i64 = 31 * 24 * 3600;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewReading {
    pub value: f64,
    /// Defaults to the time of ingestion.
    pub time: Option<DateTime<Utc>>,
}

/// Validate, clamp and append one reading.
///
/// # Errors
///
/// `NotFound` for an unknown sensor, `BadRequest` for an inactive sensor or
/// a non-finite value, `Store` when the write fails or times out.
pub async fn ingest(
    db: &DatabaseConnection,
    store: &dyn ReadingsStore,
    timeout: Duration,
    sensor_id: Uuid,
    input: NewReading,
) -> AppResult<Reading> {
    let sensor = get_sensor(db, sensor_id).await?;
    if !sensor.is_active {
        return Err(AppError::BadRequest(format!("Sensor {sensor_id} is inactive")));
    }
    if !input.value.is_finite() {
        return Err(AppError::BadRequest("value must be a finite number".to_string()));
    }

    let reading = Reading {
        time: input.time.unwrap_or_else(Utc::now),
        value: sensor.clamp(input.value),
    };
    if reading.value != input.value {
        tracing::debug!(
            sensor_id = %sensor_id,
            raw = input.value,
            clamped = reading.value,
            "reading_clamped"
        );
    }

    with_timeout(timeout, store.write_reading(sensor_id, reading.time, reading.value)).await?;
    Ok(reading)
}

/// # Errors
///
/// `NotFound` for an unknown sensor, `Store` on store failure.
pub async fn latest(
    db: &DatabaseConnection,
    store: &dyn ReadingsStore,
    timeout: Duration,
    sensor_id: Uuid,
) -> AppResult<Option<Reading>> {
    get_sensor(db, sensor_id).await?;
    Ok(with_timeout(timeout, store.latest_reading(sensor_id, Utc::now())).await?)
}

/// Readings from the last `window_s` seconds, ascending.
///
/// # Errors
///
/// `BadRequest` for a window outside `1..=MAX_SERIES_WINDOW_S`, `NotFound` for an unknown
/// sensor, `Store` on store failure.
pub async fn series(
    db: &DatabaseConnection,
    store: &dyn ReadingsStore,
    timeout: Duration,
    sensor_id: Uuid,
    window_s: i64,
) -> AppResult<Vec<Reading>> {
    if window_s <= 0 || window_s > MAX_SERIES_WINDOW_S {
        return Err(AppError::BadRequest(format!(
            "window must be between 1 and {MAX_SERIES_WINDOW_S} seconds"
        )));
    }
    get_sensor(db, sensor_id).await?;
    let window = chrono::Duration::seconds(window_s);
    Ok(with_timeout(timeout, store.windowed_series(sensor_id, Utc::now(), window)).await?)
}
