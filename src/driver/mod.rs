//! Periodic evaluation driver used by the server binary.

pub mod scheduler;
