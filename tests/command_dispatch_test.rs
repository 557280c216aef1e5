//! Command validation, delivery and settlement.
//!
//! Run with: cargo test --test command_dispatch_test

mod common;

use common::{USER, secs, setup, t0, template};
use facility_watch::engine::rules::OutcomeStatus;
use facility_watch::engine::{CommandError, CommandRequest};
use facility_watch::entity::actuators::{self, ActuatorType};
use facility_watch::entity::commands::{self, CommandStatus};
use facility_watch::gateway::Delivery;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use std::collections::BTreeMap;

fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[tokio::test]
async fn invalid_commands_are_rejected_before_storage() {
    let app = setup().await;
    let house = app.facility("House").await;
    let heater = app.actuator(&house, "heater", ActuatorType::Binary, None, None).await;
    let vent = app
        .actuator(&house, "vent", ActuatorType::Level, Some((0.0, 100.0)), Some(10.0))
        .await;

    let cases = [
        (heater.id, "SET", args(&[("value", "1")])),
        (vent.id, "ON", BTreeMap::new()),
        (vent.id, "SET", BTreeMap::new()),
        (vent.id, "SET", args(&[("value", "abc")])),
        (vent.id, "SET", args(&[("value", "150")])),
        (vent.id, "SET", args(&[("value", "35")])),
        (vent.id, "BLINK", BTreeMap::new()),
        (uuid::Uuid::new_v4(), "ON", BTreeMap::new()),
    ];

    for (actuator_id, name, args) in cases {
        let request = CommandRequest {
            actuator_id,
            name: name.to_string(),
            args,
            issued_by: Some(USER),
            ..Default::default()
        };
        let err = app.state.dispatcher.submit(&request).await.unwrap_err();
        assert!(matches!(err, CommandError::Invalid(_)), "{name}: {err}");
    }

    let stored = commands::Entity::find().count(&app.state.db).await.unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn successful_delivery_updates_actuator_value() {
    let app = setup().await;
    let greenhouse = app.facility("Greenhouse").await;
    let vent = app
        .actuator(&greenhouse, "vent", ActuatorType::Level, Some((0.0, 100.0)), Some(10.0))
        .await;

    let request = CommandRequest {
        actuator_id: vent.id,
        name: "set".to_string(),
        args: args(&[("value", "40")]),
        issued_by: Some(USER),
        ..Default::default()
    };
    let queued = app.state.dispatcher.submit(&request).await.unwrap();
    assert_eq!(queued.status, CommandStatus::Queued);
    assert_eq!(queued.name, "SET");

    let settled = app.state.dispatcher.deliver(queued.id).await.unwrap();
    assert_eq!(settled.status, CommandStatus::Success);
    assert!(settled.sent_at.is_some());
    assert!(settled.completed_at.is_some());

    let sent = app.gateway.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].command, "SET");
    assert_eq!(sent[0].actuator_name, "vent");
    assert_eq!(sent[0].args.get("value").map(String::as_str), Some("40"));

    let vent = actuators::Entity::find_by_id(vent.id)
        .one(&app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(vent.last_value, Some(40.0));

    // Delivered commands cannot be delivered again.
    let err = app.state.dispatcher.deliver(queued.id).await.unwrap_err();
    assert!(matches!(
        err,
        CommandError::WrongStatus { status: CommandStatus::Success, .. }
    ));
}

#[tokio::test]
async fn pending_sweep_delivers_commands_left_queued() {
    let app = setup().await;
    let barn = app.facility("Barn").await;
    let fan = app.actuator(&barn, "fan", ActuatorType::Binary, None, None).await;

    let mut stranded = Vec::new();
    for name in ["ON", "OFF"] {
        let request = CommandRequest {
            actuator_id: fan.id,
            name: name.to_string(),
            issued_by: Some(USER),
            ..Default::default()
        };
        stranded.push(app.state.dispatcher.submit(&request).await.unwrap());
    }
    assert!(app.gateway.requests().is_empty());

    let delivered = app.state.dispatcher.deliver_pending().await.unwrap();
    assert_eq!(delivered, 2);

    let sent: Vec<_> = app.gateway.requests().iter().map(|r| r.command_id).collect();
    assert_eq!(sent, vec![stranded[0].id, stranded[1].id]);
    for command in &stranded {
        let (command, _) = app.state.dispatcher.load(command.id).await.unwrap();
        assert_eq!(command.status, CommandStatus::Success);
    }
    let fan = actuators::Entity::find_by_id(fan.id)
        .one(&app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fan.last_value, Some(0.0));

    // Nothing left to pick up.
    assert_eq!(app.state.dispatcher.deliver_pending().await.unwrap(), 0);
    assert_eq!(app.gateway.requests().len(), 2);
}

#[tokio::test]
async fn gateway_failure_marks_command_failed() {
    let app = setup().await;
    let house = app.facility("House").await;
    let heater = app.actuator(&house, "heater", ActuatorType::Binary, None, None).await;
    app.gateway.reply_with(Err("relay offline".to_string()));

    let request = CommandRequest {
        actuator_id: heater.id,
        name: "ON".to_string(),
        ..Default::default()
    };
    let queued = app.state.dispatcher.submit(&request).await.unwrap();
    let settled = app.state.dispatcher.deliver(queued.id).await.unwrap();

    assert_eq!(settled.status, CommandStatus::Failed);
    assert_eq!(settled.error_text.as_deref(), Some("relay offline"));

    let heater = actuators::Entity::find_by_id(heater.id)
        .one(&app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(heater.last_value, None);
}

#[tokio::test]
async fn accepted_command_waits_for_reported_outcome() {
    let app = setup().await;
    let house = app.facility("House").await;
    let heater = app.actuator(&house, "heater", ActuatorType::Binary, None, None).await;
    app.gateway.reply_with(Ok(Delivery::Accepted));

    let request = CommandRequest {
        actuator_id: heater.id,
        name: "off".to_string(),
        ..Default::default()
    };
    let queued = app.state.dispatcher.submit(&request).await.unwrap();
    let sent = app.state.dispatcher.deliver(queued.id).await.unwrap();
    assert_eq!(sent.status, CommandStatus::Sent);
    assert!(sent.completed_at.is_none());

    let done = app.state.dispatcher.record_outcome(queued.id, Ok(())).await.unwrap();
    assert_eq!(done.status, CommandStatus::Success);

    let heater = actuators::Entity::find_by_id(heater.id)
        .one(&app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(heater.last_value, Some(0.0));

    let err = app
        .state
        .dispatcher
        .record_outcome(queued.id, Err("late".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::WrongStatus { .. }));
}

#[tokio::test]
async fn outcome_for_unknown_command_is_not_found() {
    let app = setup().await;
    let err = app
        .state
        .dispatcher
        .record_outcome(uuid::Uuid::new_v4(), Ok(()))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NotFound(_)));
}

#[tokio::test]
async fn rule_commands_fire_only_when_the_alert_opens() {
    let app = setup().await;
    let sauna = app.facility("Sauna").await;
    let temp = app.sensor(&sauna, "temp").await;
    let fan = app.actuator(&sauna, "fan", ActuatorType::Binary, None, None).await;
    let rule = app
        .rule("Too hot", "temp > 90", 0, &[&temp], vec![template(&fan, "ON", &[])])
        .await;

    app.write(&temp, t0(), 95.0).await;
    let report = app.state.engine.run_pass(t0(), None).await.unwrap();
    assert_eq!(report.outcomes[0].status, OutcomeStatus::Opened);
    assert_eq!(report.outcomes[0].commands.len(), 1);
    let command_id = report.outcomes[0].commands[0];

    let command = app.settled(command_id).await;
    assert_eq!(command.status, CommandStatus::Success);
    assert_eq!(command.rule_id, Some(rule.id));
    assert_eq!(command.alert_id, report.outcomes[0].alert_id);
    assert_eq!(command.issued_at.with_timezone(&chrono::Utc), t0());

    for step in 1..=3 {
        let report = app.state.engine.run_pass(t0() + secs(step), None).await.unwrap();
        assert_eq!(report.outcomes[0].status, OutcomeStatus::Kept);
        assert!(report.outcomes[0].commands.is_empty());
    }

    let issued = commands::Entity::find()
        .filter(commands::Column::RuleId.eq(rule.id))
        .count(&app.state.db)
        .await
        .unwrap();
    assert_eq!(issued, 1);
    assert_eq!(app.gateway.requests().len(), 1);
}

#[tokio::test]
async fn invalid_template_is_skipped_and_alert_still_opens() {
    let app = setup().await;
    let greenhouse = app.facility("Greenhouse").await;
    let temp = app.sensor(&greenhouse, "temp").await;
    let vent = app
        .actuator(&greenhouse, "vent", ActuatorType::Level, Some((0.0, 100.0)), Some(10.0))
        .await;
    app.rule(
        "Too hot",
        "temp > 30",
        0,
        &[&temp],
        vec![template(&vent, "SET", &[("value", "80")])],
    )
    .await;

    // The actuator is retired after the rule was written.
    actuators::Entity::update_many()
        .set(actuators::ActiveModel {
            is_active: sea_orm::Set(false),
            ..Default::default()
        })
        .filter(actuators::Column::Id.eq(vent.id))
        .exec(&app.state.db)
        .await
        .unwrap();

    app.write(&temp, t0(), 35.0).await;
    let report = app.state.engine.run_pass(t0(), None).await.unwrap();
    assert_eq!(report.outcomes[0].status, OutcomeStatus::Opened);
    assert!(report.outcomes[0].commands.is_empty());
    assert!(report.failures.is_empty());
}
