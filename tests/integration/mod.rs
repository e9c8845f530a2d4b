//! Integration tests for qbridge.

pub mod clickhouse_test;
pub mod connector_test;
pub mod json_test;
pub mod postgres_test;
