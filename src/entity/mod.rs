//! Database entities.
//!
//! Join tables (`sensor_actuators`, `rule_sensors`, `command_args`) are
//! explicit entities with composite primary keys; cascades are carried out
//! by the service layer rather than by the database.

pub mod actuators;
pub mod alerts;
pub mod command_args;
pub mod commands;
pub mod facilities;
pub mod readings;
pub mod rule_commands;
pub mod rule_sensors;
pub mod rules;
pub mod sensor_actuators;
pub mod sensors;
pub mod units;
