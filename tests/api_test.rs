//! HTTP surface, exercised in-process through the router.
//!
//! Run with: cargo test --test api_test

mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use facility_watch::routes::build_router;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{USER, setup};

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn id(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn healthz_and_docs_respond() {
    let app = build_router(setup().await.state);

    let (status, _) = call(&app, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::GET, "/docs", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reading_to_alert_to_acknowledgement() {
    let app = build_router(setup().await.state);

    let (status, facility) = call(
        &app,
        Method::POST,
        "/api/facilities",
        Some(json!({"name": "North greenhouse", "facility_type": "greenhouse"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, sensor) = call(
        &app,
        Method::POST,
        "/api/sensors",
        Some(json!({
            "user_id": USER,
            "facility_id": id(&facility),
            "name": "Soil Moisture",
            "min_val": 0.0,
            "max_val": 100.0,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sensor["variable"], "soil_moisture");
    let sensor_id = id(&sensor);

    let (status, reading) = call(
        &app,
        Method::POST,
        &format!("/api/sensors/{sensor_id}/readings"),
        Some(json!({"value": -4.0})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reading["value"], 0.0);

    let (status, latest) = call(
        &app,
        Method::GET,
        &format!("/api/sensors/{sensor_id}/readings/latest"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["reading"]["value"], 0.0);

    let (status, rule) = call(
        &app,
        Method::POST,
        "/api/rules",
        Some(json!({
            "user_id": USER,
            "name": "Dry soil",
            "expression": "soil_moisture < 10",
            "severity": "critical",
            "sensor_ids": [sensor_id],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let rule_id = id(&rule);

    let (status, report) = call(&app, Method::POST, "/api/evaluate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["opened"], 1);
    assert_eq!(report["outcomes"][0]["status"], "opened");

    let (status, alerts) = call(
        &app,
        Method::GET,
        &format!("/api/alerts?rule_id={rule_id}&state=open"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["severity"], "critical");
    let alert_id = id(&alerts[0]);

    let (status, acked) = call(
        &app,
        Method::POST,
        &format!("/api/alerts/{alert_id}/ack"),
        Some(json!({"user_id": USER})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acked["state"], "ack");

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/alerts/{}/ack", uuid::Uuid::new_v4()),
        Some(json!({"user_id": USER})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_rule_and_command_are_bad_requests() {
    let app = build_router(setup().await.state);

    let (_, facility) = call(
        &app,
        Method::POST,
        "/api/facilities",
        Some(json!({"name": "Garage", "facility_type": "garage"})),
    )
    .await;
    let (status, actuator) = call(
        &app,
        Method::POST,
        "/api/actuators",
        Some(json!({
            "facility_id": id(&facility),
            "name": "door",
            "actuator_type": "binary",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/rules",
        Some(json!({"user_id": USER, "name": "Broken", "expression": "door >"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("parse error"));

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/commands",
        Some(json!({"actuator_id": id(&actuator), "name": "SET", "args": {"value": "1"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, command) = call(
        &app,
        Method::POST,
        "/api/commands",
        Some(json!({"actuator_id": id(&actuator), "name": "on", "issued_by": USER})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(command["name"], "ON");
    assert_eq!(command["status"], "queued");

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/api/commands/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_rule_is_not_found() {
    let app = build_router(setup().await.state);
    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/rules/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}
