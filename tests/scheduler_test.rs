//! The background evaluation loop.
//!
//! Run with: cargo test --test scheduler_test

mod common;

use chrono::Utc;
use common::setup;
use facility_watch::driver::scheduler::run_evaluation;
use facility_watch::engine::{CommandRequest, alerts};
use facility_watch::entity::actuators::ActuatorType;
use facility_watch::entity::commands::CommandStatus;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test]
async fn first_tick_evaluates_and_shutdown_stops_the_loop() {
    let app = setup().await;
    let woodshed = app.facility("Woodshed").await;
    let humidity = app.sensor(&woodshed, "humidity").await;
    let rule = app.rule("Damp wood", "humidity > 70", 0, &[&humidity], vec![]).await;
    app.write(&humidity, Utc::now(), 85.0).await;

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(run_evaluation(app.state.clone(), rx));

    let mut opened = None;
    for _ in 0..100 {
        opened = alerts::current_alert(&app.state.db, rule.id).await.unwrap();
        if opened.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(opened.is_some(), "scheduler never opened the alert");

    tx.send_replace(true);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}

#[tokio::test]
async fn startup_tick_delivers_commands_left_queued() {
    let app = setup().await;
    let barn = app.facility("Barn").await;
    let fan = app.actuator(&barn, "fan", ActuatorType::Binary, None, None).await;
    let request = CommandRequest {
        actuator_id: fan.id,
        name: "ON".to_string(),
        ..Default::default()
    };
    let stranded = app.state.dispatcher.submit(&request).await.unwrap();

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(run_evaluation(app.state.clone(), rx));

    let command = app.settled(stranded.id).await;
    assert_eq!(command.status, CommandStatus::Success);
    assert_eq!(app.gateway.requests().len(), 1);

    tx.send_replace(true);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}
