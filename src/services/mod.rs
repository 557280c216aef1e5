//! Catalog, rule and reading operations shared by the HTTP layer and tests.

pub mod catalog;
pub mod readings;
pub mod rules;
