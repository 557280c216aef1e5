pub mod alerts;
pub mod catalog;
pub mod commands;
pub mod health;
pub mod readings;
pub mod rules;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::common::AppState;
use crate::engine::{self, rules::OutcomeStatus};
use crate::entity::{
    actuators::ActuatorType, alerts::AlertState, commands::CommandStatus,
    facilities::FacilityType, rules::Severity,
};
use crate::services;
use crate::store::Reading;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthz,
        catalog::create_facility,
        catalog::list_facilities,
        catalog::delete_facility,
        catalog::create_unit,
        catalog::list_units,
        catalog::delete_unit,
        catalog::create_sensor,
        catalog::list_sensors,
        catalog::delete_sensor,
        catalog::create_actuator,
        catalog::list_actuators,
        catalog::delete_actuator,
        catalog::link_sensor,
        readings::post_reading,
        readings::get_series,
        readings::get_latest,
        rules::list_rules,
        rules::create_rule,
        rules::get_rule,
        rules::update_rule,
        rules::delete_rule,
        rules::enable_rule,
        rules::disable_rule,
        rules::evaluate,
        alerts::list_alerts,
        alerts::get_alert,
        alerts::ack_alert,
        commands::submit_command,
        commands::get_command,
        commands::record_outcome,
    ),
    components(
        schemas(
            catalog::FacilityResponse,
            catalog::UnitResponse,
            catalog::SensorResponse,
            catalog::ActuatorResponse,
            catalog::LinkResponse,
            services::catalog::NewFacility,
            services::catalog::NewUnit,
            services::catalog::NewSensor,
            services::catalog::NewActuator,
            services::readings::NewReading,
            services::rules::RuleInput,
            services::rules::RuleCommandInput,
            services::rules::RuleDetail,
            readings::SeriesResponse,
            readings::LatestResponse,
            Reading,
            engine::PassReport,
            engine::RuleOutcome,
            engine::RuleFailure,
            engine::FailureKind,
            OutcomeStatus,
            alerts::AlertResponse,
            alerts::AckRequest,
            commands::SubmitCommand,
            commands::OutcomeReport,
            commands::CommandResponse,
            FacilityType,
            ActuatorType,
            Severity,
            AlertState,
            CommandStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "catalog", description = "Facilities, units, sensors and actuators"),
        (name = "readings", description = "Sensor readings"),
        (name = "rules", description = "Alert rules and evaluation"),
        (name = "alerts", description = "Alert lifecycle"),
        (name = "commands", description = "Actuator commands"),
    ),
    info(
        title = "Facility Watch API",
        description = "Rule evaluation, alerting and actuator control for monitored facilities",
        version = "0.1.0"
    )
)]
struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.request_timeout_seconds);

    let catalog_routes = Router::new()
        .route(
            "/facilities",
            get(catalog::list_facilities).post(catalog::create_facility),
        )
        .route(
            "/facilities/{facility_id}",
            delete(catalog::delete_facility),
        )
        .route("/units", get(catalog::list_units).post(catalog::create_unit))
        .route("/units/{unit_id}", delete(catalog::delete_unit))
        .route(
            "/sensors",
            get(catalog::list_sensors).post(catalog::create_sensor),
        )
        .route(
            "/sensors/{sensor_id}",
            delete(catalog::delete_sensor),
        )
        .route(
            "/actuators",
            get(catalog::list_actuators).post(catalog::create_actuator),
        )
        .route(
            "/actuators/{actuator_id}",
            delete(catalog::delete_actuator),
        )
        .route(
            "/actuators/{actuator_id}/sensors/{sensor_id}",
            put(catalog::link_sensor),
        );

    let reading_routes = Router::new()
        .route(
            "/sensors/{sensor_id}/readings",
            get(readings::get_series).post(readings::post_reading),
        )
        .route(
            "/sensors/{sensor_id}/readings/latest",
            get(readings::get_latest),
        );

    let rule_routes = Router::new()
        .route("/rules", get(rules::list_rules).post(rules::create_rule))
        .route(
            "/rules/{rule_id}",
            get(rules::get_rule)
                .put(rules::update_rule)
                .delete(rules::delete_rule),
        )
        .route("/rules/{rule_id}/enable", post(rules::enable_rule))
        .route("/rules/{rule_id}/disable", post(rules::disable_rule))
        .route("/evaluate", post(rules::evaluate));

    let alert_routes = Router::new()
        .route("/alerts", get(alerts::list_alerts))
        .route("/alerts/{alert_id}", get(alerts::get_alert))
        .route("/alerts/{alert_id}/ack", post(alerts::ack_alert));

    let command_routes = Router::new()
        .route("/commands", post(commands::submit_command))
        .route("/commands/{command_id}", get(commands::get_command))
        .route(
            "/commands/{command_id}/outcome",
            post(commands::record_outcome),
        );

    let api_routes = Router::new()
        .merge(catalog_routes)
        .merge(reading_routes)
        .merge(rule_routes)
        .merge(alert_routes)
        .merge(command_routes)
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1MB body limit

    let health_routes = Router::new().route("/healthz", get(health::healthz));

    let docs_routes = Router::new().merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(docs_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
