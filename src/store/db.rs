use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use super::{LATEST_LOOKBACK_DAYS, Reading, ReadingsStore, StoreError};
use crate::entity::readings;

/// Readings kept in the application database's `readings` table.
#[derive(Clone)]
pub struct DbReadingsStore {
    db: DatabaseConnection,
}

impl DbReadingsStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_reading(row: readings::Model) -> Reading {
    Reading {
        time: row.time.with_timezone(&Utc),
        value: row.value,
    }
}

impl ReadingsStore for DbReadingsStore {
    fn write_reading(
        &self,
        sensor_id: Uuid,
        time: DateTime<Utc>,
        value: f64,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            let row = readings::ActiveModel {
                sensor_id: Set(sensor_id),
                time: Set(time.into()),
                value: Set(value),
            };

            readings::Entity::insert(row)
                .on_conflict(
                    OnConflict::columns([readings::Column::SensorId, readings::Column::Time])
                        .update_column(readings::Column::Value)
                        .to_owned(),
                )
                .exec_without_returning(&self.db)
                .await
                .map_err(|e| StoreError::Write(e.to_string()))?;

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

            let row = readings::Entity::find()
                .filter(readings::Column::SensorId.eq(sensor_id))
                .filter(readings::Column::Time.lte(at))
                .filter(readings::Column::Time.gte(since))
                .order_by_desc(readings::Column::Time)
                .one(&self.db)
                .await
                .map_err(|e| StoreError::Read(e.to_string()))?;

            Ok(row.map(to_reading))
        }
        .boxed()
    }

    fn windowed_series(
        &self,
        sensor_id: Uuid,
        until: DateTime<Utc>,
        window: chrono::Duration,
    ) -> BoxFuture<'_, Result<Vec<Reading>, StoreError>> {
        async move {
            let rows = readings::Entity::find()
                .filter(readings::Column::SensorId.eq(sensor_id))
                .filter(readings::Column::Time.gte(until - window))
                .filter(readings::Column::Time.lte(until))
                .order_by_asc(readings::Column::Time)
                .all(&self.db)
                .await
                .map_err(|e| StoreError::Read(e.to_string()))?;

            Ok(rows.into_iter().map(to_reading).collect())
        }
        .boxed()
    }
}
