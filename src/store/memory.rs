use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use uuid::Uuid;

use super::{LATEST_LOOKBACK_DAYS, Reading, ReadingsStore, StoreError};

/// Process-local readings store.
#[derive(Default)]
pub struct MemoryReadingsStore {
    series: RwLock<HashMap<Uuid, BTreeMap<DateTime<Utc>, f64>>>,
}

impl MemoryReadingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points held for `sensor_id`.
    #[must_use]
    pub fn len(&self, sensor_id: Uuid) -> usize {
        self.series
            .read()
            .map(|series| series.get(&sensor_id).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    fn read_range(
        &self,
        sensor_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StoreError> {
        let series = self
            .series
            .read()
            .map_err(|_| StoreError::Read("readings lock poisoned".to_string()))?;

        if from > until {
            return Ok(Vec::new());
        }

        Ok(series
            .get(&sensor_id)
            .map(|points| {
                points
                    .range(from..=until)
                    .map(|(time, value)| Reading {
                        time: *time,
                        value: *value,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl ReadingsStore for MemoryReadingsStore {
    fn write_reading(
        &self,
        sensor_id: Uuid,
        time: DateTime<Utc>,
        value: f64,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            let mut series = self
                .series
                .write()
                .map_err(|_| StoreError::Write("readings lock poisoned".to_string()))?;
            series.entry(sensor_id).or_default().insert(time, value);
            Ok(())
        }
        .boxed()
    }

    fn latest_reading(
        &self,
        sensor_id: Uuid,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Option<Reading>, StoreError>> {
        async move {
            let since = at - chrono::Duration::days(LATEST_LOOKBACK_DAYS);
            Ok(self.read_range(sensor_id, since, at)?.pop())
        }
        .boxed()
    }

    fn windowed_series(
        &self,
        sensor_id: Uuid,
        until: DateTime<Utc>,
        window: chrono::Duration,
    ) -> BoxFuture<'_, Result<Vec<Reading>, StoreError>> {
        async move { self.read_range(sensor_id, until - window, until) }.boxed()
    }
}
