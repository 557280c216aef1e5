//! Shared harness: an in-memory SQLite catalog, an in-memory readings store
//! and a gateway that records what it is asked to do.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use facility_watch::common::AppState;
use facility_watch::config::Config;
use facility_watch::entity::actuators::ActuatorType;
use facility_watch::entity::facilities::FacilityType;
use facility_watch::entity::rules::Severity;
use facility_watch::entity::{actuators, commands, facilities, sensors};
use facility_watch::gateway::{ActuatorGateway, Delivery, ExecuteRequest};
use facility_watch::services::catalog::{self, NewActuator, NewFacility, NewSensor};
use facility_watch::services::rules::{self, RuleCommandInput, RuleDetail, RuleInput};
use facility_watch::store::{MemoryReadingsStore, ReadingsStore};
use migration::Migrator;

pub const USER: Uuid = Uuid::from_u128(0x0000_0000_0000_4000_8000_0000_0000_0001);

/// Gateway double: records every request and answers with a configurable reply.
pub struct RecordingGateway {
    requests: Mutex<Vec<ExecuteRequest>>,
    reply: Mutex<Result<Delivery, String>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            reply: Mutex::new(Ok(Delivery::Completed)),
        }
    }

    pub fn reply_with(&self, reply: Result<Delivery, String>) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn requests(&self) -> Vec<ExecuteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ActuatorGateway for RecordingGateway {
    fn execute<'a>(&'a self, request: &'a ExecuteRequest) -> BoxFuture<'a, Result<Delivery, String>> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.reply.lock().unwrap().clone();
        Box::pin(async move { reply })
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryReadingsStore>,
    pub gateway: Arc<RecordingGateway>,
}

pub async fn connect() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub async fn setup() -> TestApp {
    let db = connect().await;
    let store = Arc::new(MemoryReadingsStore::new());
    let gateway = Arc::new(RecordingGateway::new());
    let state = AppState::new(
        db,
        Config::for_tests(),
        store.clone() as Arc<dyn ReadingsStore>,
        gateway.clone() as Arc<dyn ActuatorGateway>,
    );
    TestApp {
        state,
        store,
        gateway,
    }
}

/// A fixed evaluation instant with whole seconds.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
}

pub fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

impl TestApp {
    pub async fn facility(&self, name: &str) -> facilities::Model {
        catalog::create_facility(
            &self.state.db,
            NewFacility {
                name: name.to_string(),
                facility_type: FacilityType::Greenhouse,
            },
        )
        .await
        .unwrap()
    }

    pub async fn sensor(&self, facility: &facilities::Model, name: &str) -> sensors::Model {
        catalog::create_sensor(
            &self.state.db,
            NewSensor {
                user_id: USER,
                facility_id: facility.id,
                name: name.to_string(),
                unit_id: None,
                min_val: None,
                max_val: None,
                sampling_s: Some(10),
                is_active: None,
            },
        )
        .await
        .unwrap()
    }

    pub async fn actuator(
        &self,
        facility: &facilities::Model,
        name: &str,
        actuator_type: ActuatorType,
        range: Option<(f64, f64)>,
        step: Option<f64>,
    ) -> actuators::Model {
        catalog::create_actuator(
            &self.state.db,
            NewActuator {
                facility_id: Some(facility.id),
                name: name.to_string(),
                actuator_type,
                range_min: range.map(|r| r.0),
                range_max: range.map(|r| r.1),
                step,
                is_active: None,
            },
        )
        .await
        .unwrap()
    }

    pub async fn rule(
        &self,
        name: &str,
        expression: &str,
        window_s: i32,
        sensors: &[&sensors::Model],
        commands: Vec<RuleCommandInput>,
    ) -> RuleDetail {
        rules::create_rule(
            &self.state.db,
            RuleInput {
                user_id: USER,
                name: name.to_string(),
                expression: expression.to_string(),
                window_s,
                severity: Some(Severity::Warning),
                enabled: None,
                sensor_ids: sensors.iter().map(|s| s.id).collect(),
                commands,
            },
        )
        .await
        .unwrap()
    }

    pub async fn write(&self, sensor: &sensors::Model, time: DateTime<Utc>, value: f64) {
        self.store.write_reading(sensor.id, time, value).await.unwrap();
    }

    /// Poll until the command leaves `queued`/`sent` or a second passes.
    pub async fn settled(&self, command_id: Uuid) -> commands::Model {
        for _ in 0..100 {
            let (command, _) = self.state.dispatcher.load(command_id).await.unwrap();
            if command.status.is_terminal() {
                return command;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("command {command_id} did not settle");
    }
}

pub fn template(actuator: &actuators::Model, name: &str, args: &[(&str, &str)]) -> RuleCommandInput {
    RuleCommandInput {
        actuator_id: actuator.id,
        name: name.to_string(),
        args: args
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}
