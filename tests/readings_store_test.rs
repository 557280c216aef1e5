//! Readings persistence in the application database and ingest rules.
//!
//! Run with: cargo test --test readings_store_test

mod common;

use common::{USER, connect, secs, setup, t0};
use facility_watch::error::AppError;
use facility_watch::services::catalog::{self, NewSensor};
use facility_watch::services::readings::{self, NewReading};
use facility_watch::store::{DbReadingsStore, ReadingsStore};
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn db_store_round_trip_and_overwrite() {
    let store = DbReadingsStore::new(connect().await);
    let sensor = Uuid::new_v4();

    store.write_reading(sensor, t0() - secs(20), 1.0).await.unwrap();
    store.write_reading(sensor, t0() - secs(10), 2.0).await.unwrap();
    store.write_reading(sensor, t0() - secs(10), 2.5).await.unwrap();

    let latest = store.latest_reading(sensor, t0()).await.unwrap().unwrap();
    assert_eq!(latest.time, t0() - secs(10));
    assert_eq!(latest.value, 2.5);

    let series = store.windowed_series(sensor, t0(), secs(60)).await.unwrap();
    let values: Vec<f64> = series.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![1.0, 2.5]);

    assert!(store.latest_reading(Uuid::new_v4(), t0()).await.unwrap().is_none());
}

#[tokio::test]
async fn db_store_latest_ignores_future_and_old_points() {
    let store = DbReadingsStore::new(connect().await);
    let sensor = Uuid::new_v4();

    store.write_reading(sensor, t0() - chrono::Duration::days(31), 5.0).await.unwrap();
    store.write_reading(sensor, t0() + secs(5), 9.0).await.unwrap();
    assert!(store.latest_reading(sensor, t0()).await.unwrap().is_none());

    let series = store.windowed_series(sensor, t0(), secs(10)).await.unwrap();
    assert!(series.is_empty());
}

#[tokio::test]
async fn ingest_clamps_into_sensor_bounds() {
    let app = setup().await;
    let pool = app.facility("Pool").await;
    let sensor = catalog::create_sensor(
        &app.state.db,
        NewSensor {
            user_id: USER,
            facility_id: pool.id,
            name: "ph".to_string(),
            unit_id: None,
            min_val: Some(0.0),
            max_val: Some(14.0),
            sampling_s: None,
            is_active: None,
        },
    )
    .await
    .unwrap();

    let reading = readings::ingest(
        &app.state.db,
        app.store.as_ref(),
        Duration::from_millis(200),
        sensor.id,
        NewReading {
            value: 17.5,
            time: Some(t0()),
        },
    )
    .await
    .unwrap();
    assert_eq!(reading.value, 14.0);
    assert_eq!(app.store.len(sensor.id), 1);
}

#[tokio::test]
async fn ingest_rejects_bad_input() {
    let app = setup().await;
    let pool = app.facility("Pool").await;
    let idle = catalog::create_sensor(
        &app.state.db,
        NewSensor {
            user_id: USER,
            facility_id: pool.id,
            name: "chlorine".to_string(),
            unit_id: None,
            min_val: None,
            max_val: None,
            sampling_s: None,
            is_active: Some(false),
        },
    )
    .await
    .unwrap();
    let live = app.sensor(&pool, "temp").await;

    let timeout = Duration::from_millis(200);
    let inactive = readings::ingest(
        &app.state.db,
        app.store.as_ref(),
        timeout,
        idle.id,
        NewReading { value: 1.0, time: None },
    )
    .await;
    assert!(matches!(inactive, Err(AppError::BadRequest(_))));

    let nan = readings::ingest(
        &app.state.db,
        app.store.as_ref(),
        timeout,
        live.id,
        NewReading { value: f64::NAN, time: None },
    )
    .await;
    assert!(matches!(nan, Err(AppError::BadRequest(_))));

    let unknown = readings::ingest(
        &app.state.db,
        app.store.as_ref(),
        timeout,
        Uuid::new_v4(),
        NewReading { value: 1.0, time: None },
    )
    .await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));

    let window = readings::series(&app.state.db, app.store.as_ref(), timeout, live.id, 0).await;
    assert!(matches!(window, Err(AppError::BadRequest(_))));
}
