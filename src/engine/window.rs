use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::EvalError;
use crate::entity::sensors;
use crate::expr::Environment;
use crate::store::{Reading, ReadingsStore, with_timeout};

/// Suffixes bound for every sensor of a windowed rule, besides the bare name.
pub const WINDOW_SUFFIXES: [&str; 5] = ["last", "min", "max", "avg", "count"];

/// Normalise a sensor name into an expression identifier.
///
/// `"CO2 Level"` becomes `co2_level`, `"2nd floor"` becomes `_2nd_floor`.
#[must_use]
pub fn variable_name(sensor_name: &str) -> String {
    let mut name: String = sensor_name
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Every variable a sensor contributes to a rule with the given window.
#[must_use]
pub fn derived_names(base: &str, window_s: i32) -> Vec<String> {
    let mut names = vec![base.to_string()];
    if window_s > 0 {
        names.extend(WINDOW_SUFFIXES.iter().map(|suffix| format!("{base}_{suffix}")));
    }
    names
}

/// The first variable two sensors would both bind, with the ids of the
/// sensor that bound it first and the one that collided.
#[must_use]
pub fn binding_conflict(sensors: &[sensors::Model], window_s: i32) -> Option<(String, Uuid, Uuid)> {
    let mut seen: HashMap<String, Uuid> = HashMap::new();
    for sensor in sensors {
        for name in derived_names(&variable_name(&sensor.name), window_s) {
            if let Some(first) = seen.insert(name.clone(), sensor.id) {
                return Some((name, first, sensor.id));
            }
        }
    }
    None
}

/// Summary of a non-empty window of finite readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub last: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

impl WindowStats {
    /// `None` when no finite value remains. `readings` must be ascending.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_readings(readings: &[Reading]) -> Option<Self> {
        let mut values = readings.iter().map(|r| r.value).filter(|v| v.is_finite());
        let first = values.next()?;

        let mut stats = Self {
            last: first,
            min: first,
            max: first,
            avg: 0.0,
            count: 1,
        };
        let mut sum = first;
        for value in values {
            stats.last = value;
            stats.min = stats.min.min(value);
            stats.max = stats.max.max(value);
            stats.count += 1;
            sum += value;
        }
        stats.avg = sum / stats.count as f64;
        Some(stats)
    }

    #[allow(clippy::cast_precision_loss)]
    fn bind(&self, base: &str, env: &mut Environment) {
        env.insert(base.to_string(), self.last);
        env.insert(format!("{base}_last"), self.last);
        env.insert(format!("{base}_min"), self.min);
        env.insert(format!("{base}_max"), self.max);
        env.insert(format!("{base}_avg"), self.avg);
        env.insert(format!("{base}_count"), self.count as f64);
    }
}

/// Resolves a rule's bound sensors into expression variables.
#[derive(Clone)]
pub struct WindowAggregator {
    store: Arc<dyn ReadingsStore>,
    timeout: Duration,
    stale_factor: u32,
}

impl WindowAggregator {
    #[must_use]
    pub fn new(store: Arc<dyn ReadingsStore>, timeout: Duration, stale_factor: u32) -> Self {
        Self {
            store,
            timeout,
            stale_factor,
        }
    }

    /// Age beyond which a sensor's latest reading no longer counts.
    #[must_use]
    pub fn freshness_horizon(&self, sampling_s: i32) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(sampling_s.max(1)) * i64::from(self.stale_factor))
    }

    /// Build the environment for one evaluation at `at`.
    ///
    /// Name collisions are reported before any store call is made.
    ///
    /// # Errors
    ///
    /// `BindingConflict` on colliding names, `Stale` when a sensor has no
    /// usable data, `Store` when the readings store fails or times out.
    pub async fn environment(
        &self,
        sensors: &[sensors::Model],
        window_s: i32,
        at: DateTime<Utc>,
    ) -> Result<Environment, EvalError> {
        if let Some((name, first, second)) = binding_conflict(sensors, window_s) {
            return Err(EvalError::BindingConflict {
                name,
                first,
                second,
            });
        }

        let mut env = Environment::new();
        for sensor in sensors {
            self.resolve(sensor, window_s, at, &mut env).await?;
        }
        Ok(env)
    }

    async fn resolve(
        &self,
        sensor: &sensors::Model,
        window_s: i32,
        at: DateTime<Utc>,
        env: &mut Environment,
    ) -> Result<(), EvalError> {
        let base = variable_name(&sensor.name);
        let store_error = |source| EvalError::Store {
            sensor_id: sensor.id,
            source,
        };

        if window_s <= 0 {
            let latest = with_timeout(self.timeout, self.store.latest_reading(sensor.id, at))
                .await
                .map_err(store_error)?;

            let horizon = self.freshness_horizon(sensor.sampling_s);
            let reading = match latest {
                Some(r) if at - r.time <= horizon && r.value.is_finite() => r,
                Some(r) => {
                    return Err(EvalError::Stale {
                        sensor_id: sensor.id,
                        detail: format!(
                            "latest reading at {} is older than {}s",
                            r.time.to_rfc3339(),
                            horizon.num_seconds()
                        ),
                    });
                }
                None => {
                    return Err(EvalError::Stale {
                        sensor_id: sensor.id,
                        detail: "no readings".to_string(),
                    });
                }
            };

            tracing::debug!(sensor_id = %sensor.id, variable = %base, value = reading.value, "sensor_resolved");
            env.insert(base, reading.value);
            return Ok(());
        }

        let window = chrono::Duration::seconds(i64::from(window_s));
        let series = with_timeout(
            self.timeout,
            self.store.windowed_series(sensor.id, at, window),
        )
        .await
        .map_err(store_error)?;

        let stats = WindowStats::from_readings(&series).ok_or_else(|| EvalError::Stale {
            sensor_id: sensor.id,
            detail: format!("no finite readings in the last {window_s}s"),
        })?;

        tracing::debug!(
            sensor_id = %sensor.id,
            variable = %base,
            count = stats.count,
            avg = stats.avg,
            "sensor_window_resolved"
        );
        stats.bind(&base, env);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryReadingsStore, StoreError};
    use chrono::TimeZone;
    use futures::FutureExt;
    use futures::future::BoxFuture;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    fn sensor(name: &str, sampling_s: i32) -> sensors::Model {
        sensors::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            facility_id: Uuid::nil(),
            name: name.to_string(),
            unit_id: None,
            min_val: None,
            max_val: None,
            sampling_s,
            is_active: true,
            created_at: t(0).into(),
            updated_at: None,
        }
    }

    fn aggregator(store: Arc<dyn ReadingsStore>) -> WindowAggregator {
        WindowAggregator::new(store, Duration::from_millis(200), 3)
    }

    #[test]
    fn variable_names_are_normalised() {
        assert_eq!(variable_name("Temp"), "temp");
        assert_eq!(variable_name("CO2 Level"), "co2_level");
        assert_eq!(variable_name("pm2.5"), "pm2_5");
        assert_eq!(variable_name("2nd-floor"), "_2nd_floor");
        assert_eq!(variable_name("Влажность"), "_________");
    }

    #[test]
    fn derived_names_depend_on_window() {
        assert_eq!(derived_names("temp", 0), vec!["temp"]);
        assert_eq!(
            derived_names("temp", 60),
            vec!["temp", "temp_last", "temp_min", "temp_max", "temp_avg", "temp_count"]
        );
    }

    #[test]
    fn stats_skip_non_finite_values() {
        let readings = [
            Reading { time: t(0), value: 1.0 },
            Reading { time: t(1), value: f64::NAN },
            Reading { time: t(2), value: 5.0 },
            Reading { time: t(3), value: f64::INFINITY },
        ];
        let stats = WindowStats::from_readings(&readings).unwrap();
        assert_eq!(stats.last, 5.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.avg, 3.0);
        assert_eq!(stats.count, 2);

        let empty = [Reading { time: t(0), value: f64::NAN }];
        assert!(WindowStats::from_readings(&empty).is_none());
    }

    #[tokio::test]
    async fn instantaneous_uses_fresh_latest_value() {
        let store = Arc::new(MemoryReadingsStore::new());
        let temp = sensor("Temp", 10);
        store.write_reading(temp.id, t(-5), 21.0).await.unwrap();
        store.write_reading(temp.id, t(-1), 22.0).await.unwrap();

        let env = aggregator(store).environment(&[temp], 0, t(0)).await.unwrap();
        assert_eq!(env.get("temp"), Some(&22.0));
        assert_eq!(env.len(), 1);
    }

    #[tokio::test]
    async fn old_or_missing_latest_is_stale() {
        let store = Arc::new(MemoryReadingsStore::new());
        let temp = sensor("temp", 10);
        let agg = aggregator(store.clone());

        let err = agg.environment(&[temp.clone()], 0, t(0)).await.unwrap_err();
        assert!(matches!(err, EvalError::Stale { sensor_id, .. } if sensor_id == temp.id));

        // horizon is 10s * 3
        store.write_reading(temp.id, t(-31), 20.0).await.unwrap();
        let err = agg.environment(&[temp.clone()], 0, t(0)).await.unwrap_err();
        assert!(matches!(err, EvalError::Stale { .. }));

        store.write_reading(temp.id, t(-30), 20.0).await.unwrap();
        assert!(agg.environment(&[temp], 0, t(0)).await.is_ok());
    }

    #[tokio::test]
    async fn windowed_rule_binds_aggregates() {
        let store = Arc::new(MemoryReadingsStore::new());
        let co2 = sensor("CO2", 10);
        for (secs, value) in [(-120, 9999.0), (-60, 800.0), (-30, 1000.0), (0, 1200.0)] {
            store.write_reading(co2.id, t(secs), value).await.unwrap();
        }

        let env = aggregator(store).environment(&[co2], 60, t(0)).await.unwrap();
        assert_eq!(env["co2"], 1200.0);
        assert_eq!(env["co2_last"], 1200.0);
        assert_eq!(env["co2_min"], 800.0);
        assert_eq!(env["co2_max"], 1200.0);
        assert_eq!(env["co2_avg"], 1000.0);
        assert_eq!(env["co2_count"], 3.0);
    }

    #[tokio::test]
    async fn empty_window_is_stale() {
        let store = Arc::new(MemoryReadingsStore::new());
        let co2 = sensor("co2", 10);
        store.write_reading(co2.id, t(-600), 500.0).await.unwrap();

        let err = aggregator(store).environment(&[co2], 60, t(0)).await.unwrap_err();
        assert!(matches!(err, EvalError::Stale { .. }));
    }

    #[tokio::test]
    async fn colliding_names_conflict() {
        let store = Arc::new(MemoryReadingsStore::new());
        let a = sensor("Room Temp", 10);
        let b = sensor("room-temp", 10);

        let err = aggregator(store).environment(&[a.clone(), b.clone()], 0, t(0)).await.unwrap_err();
        match err {
            EvalError::BindingConflict { name, first, second } => {
                assert_eq!(name, "room_temp");
                assert_eq!(first, a.id);
                assert_eq!(second, b.id);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn derived_names_conflict_with_bare_names() {
        let store = Arc::new(MemoryReadingsStore::new());
        let temp = sensor("temp", 10);
        let temp_avg = sensor("Temp Avg", 10);
        let sensors = [temp.clone(), temp_avg.clone()];

        assert!(binding_conflict(&sensors, 0).is_none());
        assert_eq!(
            binding_conflict(&sensors, 60),
            Some(("temp_avg".to_string(), temp.id, temp_avg.id))
        );

        let err = aggregator(store).environment(&sensors, 60, t(0)).await.unwrap_err();
        assert!(matches!(err, EvalError::BindingConflict { name, .. } if name == "temp_avg"));
    }

    struct SlowStore;

    impl ReadingsStore for SlowStore {
        fn write_reading(&self, _: Uuid, _: DateTime<Utc>, _: f64) -> BoxFuture<'_, Result<(), StoreError>> {
            async { Ok(()) }.boxed()
        }

        fn latest_reading(
            &self,
            _: Uuid,
            at: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<Option<Reading>, StoreError>> {
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Some(Reading { time: at, value: 1.0 }))
            }
            .boxed()
        }

        fn windowed_series(
            &self,
            _: Uuid,
            _: DateTime<Utc>,
            _: chrono::Duration,
        ) -> BoxFuture<'_, Result<Vec<Reading>, StoreError>> {
            async { Ok(Vec::new()) }.boxed()
        }
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let temp = sensor("temp", 10);
        let agg = WindowAggregator::new(Arc::new(SlowStore), Duration::from_millis(20), 3);

        let err = agg.environment(&[temp.clone()], 0, t(0)).await.unwrap_err();
        assert!(matches!(
            err,
            EvalError::Store { sensor_id, source: StoreError::Timeout(_) } if sensor_id == temp.id
        ));
    }
}
