//! Facility Watch - rule evaluation and alerting for facility sensors
//!
//! This library exposes the core modules for testing and reuse.

pub mod common;
pub mod config;
pub mod driver;
pub mod engine;
pub mod entity;
pub mod error;
pub mod expr;
pub mod gateway;
pub mod routes;
pub mod services;
pub mod store;
