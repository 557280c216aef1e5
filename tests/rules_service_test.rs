//! Rule definition validation and maintenance.
//!
//! Run with: cargo test --test rules_service_test

mod common;

use common::{USER, setup, t0, template};
use facility_watch::engine::alerts;
use facility_watch::entity::actuators::ActuatorType;
use facility_watch::entity::rules::Severity;
use facility_watch::error::AppError;
use facility_watch::services::catalog::{self, NewSensor};
use facility_watch::services::rules::{self, RuleInput};
use uuid::Uuid;

fn input(name: &str, expression: &str, window_s: i32, sensor_ids: Vec<Uuid>) -> RuleInput {
    RuleInput {
        user_id: USER,
        name: name.to_string(),
        expression: expression.to_string(),
        window_s,
        severity: None,
        enabled: None,
        sensor_ids,
        commands: vec![],
    }
}

fn bad_request(result: Result<rules::RuleDetail, AppError>) -> String {
    match result {
        Err(AppError::BadRequest(msg)) => msg,
        other => panic!("expected BadRequest, got {other:?}"),
    }
}

#[tokio::test]
async fn create_reports_bindings_and_variables() {
    let app = setup().await;
    let house = app.facility("House").await;
    let temp = app.sensor(&house, "Living Temp").await;

    let rule = rules::create_rule(
        &app.state.db,
        input("Warm living room", "living_temp_max > 24", 300, vec![temp.id]),
    )
    .await
    .unwrap();

    assert_eq!(rule.severity, Severity::Warning);
    assert!(rule.enabled);
    assert_eq!(rule.sensor_ids, vec![temp.id]);
    assert!(rule.variables.contains(&"living_temp".to_string()));
    assert!(rule.variables.contains(&"living_temp_avg".to_string()));

    let listed = rules::list_rules(&app.state.db, Some(USER)).await.unwrap();
    assert_eq!(listed.len(), 1);
    let others = rules::list_rules(&app.state.db, Some(Uuid::new_v4())).await.unwrap();
    assert!(others.is_empty());
}

#[tokio::test]
async fn create_rejects_invalid_definitions() {
    let app = setup().await;
    let house = app.facility("House").await;
    let temp = app.sensor(&house, "temp").await;
    let db = &app.state.db;

    let msg = bad_request(rules::create_rule(db, input("", "temp > 1", 0, vec![temp.id])).await);
    assert!(msg.contains("name"));

    let msg = bad_request(rules::create_rule(db, input("r", "temp >", 0, vec![temp.id])).await);
    assert!(msg.contains("parse error"));

    let msg = bad_request(rules::create_rule(db, input("r", "co2 > 1", 0, vec![temp.id])).await);
    assert!(msg.contains("co2"));

    // Window suffixes only exist for windowed rules.
    let msg = bad_request(rules::create_rule(db, input("r", "temp_avg > 1", 0, vec![temp.id])).await);
    assert!(msg.contains("temp_avg"));

    let msg = bad_request(
        rules::create_rule(db, input("r", "temp > 1", 0, vec![temp.id, Uuid::new_v4()])).await,
    );
    assert!(msg.contains("does not exist"));

    let msg = bad_request(rules::create_rule(db, input("r", "temp > 1", -5, vec![temp.id])).await);
    assert!(msg.contains("window_s"));
}

#[tokio::test]
async fn create_rejects_colliding_sensor_names() {
    let app = setup().await;
    let house = app.facility("House").await;
    let cellar = app.facility("Cellar").await;
    let upstairs = app.sensor(&house, "temp").await;
    let downstairs = catalog::create_sensor(
        &app.state.db,
        NewSensor {
            user_id: USER,
            facility_id: cellar.id,
            name: "Temp".to_string(),
            unit_id: None,
            min_val: None,
            max_val: None,
            sampling_s: None,
            is_active: None,
        },
    )
    .await
    .unwrap();

    let msg = bad_request(
        rules::create_rule(
            &app.state.db,
            input("r", "temp > 1", 0, vec![upstairs.id, downstairs.id]),
        )
        .await,
    );
    assert!(msg.contains("both bind"));
}

#[tokio::test]
async fn windowed_rules_reject_names_shadowed_by_aggregates() {
    let app = setup().await;
    let house = app.facility("House").await;
    let temp = app.sensor(&house, "temp").await;
    let temp_avg = app.sensor(&house, "temp avg").await;
    let db = &app.state.db;

    let msg = bad_request(
        rules::create_rule(db, input("r", "temp_avg > 50", 60, vec![temp.id, temp_avg.id])).await,
    );
    assert!(msg.contains("both bind variable `temp_avg`"));

    // Without a window only the bare names are bound, so they stay distinct.
    let rule = rules::create_rule(db, input("r", "temp_avg > 50", 0, vec![temp.id, temp_avg.id]))
        .await
        .unwrap();
    assert_eq!(rule.variables, vec!["temp".to_string(), "temp_avg".to_string()]);
}

#[tokio::test]
async fn create_rejects_oversized_and_deeply_nested_expressions() {
    let app = setup().await;
    let house = app.facility("House").await;
    let temp = app.sensor(&house, "temp").await;
    let db = &app.state.db;

    let nested = format!("{}temp{} > 1", "(".repeat(2000), ")".repeat(2000));
    let msg = bad_request(rules::create_rule(db, input("r", &nested, 0, vec![temp.id])).await);
    assert!(msg.contains("nested too deeply"));

    let long = format!("temp > {}", "1".repeat(rules::MAX_EXPRESSION_LEN));
    let msg = bad_request(rules::create_rule(db, input("r", &long, 0, vec![temp.id])).await);
    assert!(msg.contains("at most"));
}

#[tokio::test]
async fn create_rejects_invalid_command_templates() {
    let app = setup().await;
    let house = app.facility("House").await;
    let temp = app.sensor(&house, "temp").await;
    let heater = app.actuator(&house, "heater", ActuatorType::Binary, None, None).await;

    let mut definition = input("Cold", "temp < 5", 0, vec![temp.id]);
    definition.commands = vec![template(&heater, "SET", &[("value", "1")])];
    let msg = bad_request(rules::create_rule(&app.state.db, definition).await);
    assert!(msg.contains("binary"));
}

#[tokio::test]
async fn update_replaces_definition_and_refreshes_cache() {
    let app = setup().await;
    let house = app.facility("House").await;
    let temp = app.sensor(&house, "temp").await;
    let rule = app.rule("Hot", "temp > 30", 0, &[&temp], vec![]).await;

    app.write(&temp, t0(), 32.0).await;
    app.state.engine.run_pass(t0(), None).await.unwrap();
    assert!(app.state.engine.expressions().contains("temp > 30"));

    let updated = rules::update_rule(
        &app.state.db,
        &app.state.engine,
        rule.id,
        input("Very hot", "temp > 40", 0, vec![temp.id]),
    )
    .await
    .unwrap();
    assert_eq!(updated.name, "Very hot");
    assert_eq!(updated.expression, "temp > 40");
    assert!(updated.updated_at.is_some());
    assert!(!app.state.engine.expressions().contains("temp > 30"));

    // The open alert closes under the new threshold.
    let report = app.state.engine.run_pass(t0(), None).await.unwrap();
    assert_eq!(report.closed, 1);

    let missing = rules::update_rule(
        &app.state.db,
        &app.state.engine,
        Uuid::new_v4(),
        input("x", "temp > 1", 0, vec![temp.id]),
    )
    .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn delete_removes_rule_and_its_alerts() {
    let app = setup().await;
    let house = app.facility("House").await;
    let temp = app.sensor(&house, "temp").await;
    let rule = app.rule("Hot", "temp > 30", 0, &[&temp], vec![]).await;

    app.write(&temp, t0(), 32.0).await;
    app.state.engine.run_pass(t0(), None).await.unwrap();
    assert!(alerts::current_alert(&app.state.db, rule.id).await.unwrap().is_some());

    rules::delete_rule(&app.state.db, &app.state.engine, rule.id).await.unwrap();
    assert!(matches!(
        rules::get_rule(&app.state.db, rule.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(alerts::current_alert(&app.state.db, rule.id).await.unwrap().is_none());

    let report = app.state.engine.run_pass(t0(), None).await.unwrap();
    assert_eq!(report.rules_total, 0);
}

#[tokio::test]
async fn deleting_a_sensor_unbinds_it_from_rules() {
    let app = setup().await;
    let house = app.facility("House").await;
    let temp = app.sensor(&house, "temp").await;
    let rule = app.rule("Hot", "temp > 30", 0, &[&temp], vec![]).await;

    catalog::delete_sensor(&app.state.db, temp.id).await.unwrap();
    let detail = rules::get_rule(&app.state.db, rule.id).await.unwrap();
    assert!(detail.sensor_ids.is_empty());

    // The expression now references nothing bound and fails cleanly.
    let report = app.state.engine.run_pass(t0(), None).await.unwrap();
    assert_eq!(report.failures.len(), 1);
}
