//! qbridge - uniform query execution over PostgreSQL and ClickHouse.
//!
//! Results from either engine come back in one canonical typed form
//! ([`QueryResult`]) together with the unpaginated total row count, and can be
//! rendered to a fixed JSON wire format.

pub mod cli;
pub mod config;
pub mod connector;
pub mod db;
pub mod error;
pub mod json;
pub mod logging;
pub mod query;

pub use connector::Connector;
pub use db::{ColumnInfo, DatabaseBackend, QueryResult, Value};
pub use error::{BridgeError, Result};
