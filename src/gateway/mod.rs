//! Actuator execution layer.
//!
//! The dispatcher hands each command to an [`ActuatorGateway`]. A gateway
//! either completes the command synchronously or accepts it and reports the
//! outcome later through the command outcome callback.

mod client;
mod models;

pub use client::{HttpGateway, LogGateway};
pub use models::{Delivery, ExecuteRequest};

use futures::future::BoxFuture;

pub trait ActuatorGateway: Send + Sync {
    /// Execute one command. `Err` carries the reason recorded on the command.
    fn execute<'a>(&'a self, request: &'a ExecuteRequest) -> BoxFuture<'a, Result<Delivery, String>>;
}
