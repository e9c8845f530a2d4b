//! Query execution for qbridge.
//!
//! Isolates count injection and result assembly from the connector, so the
//! pipeline can be tested against a mock driver.

pub mod executor;

pub use executor::QueryExecutor;
