//! Connector behavior against the mock driver.
//!
//! Covers count injection, transaction discipline and batch atomicity through
//! the public blocking API.

use pretty_assertions::assert_eq;
use qbridge::db::{MemoryBatch, MockDriver, Value, TOTAL_COUNT_COLUMN};
use qbridge::{BridgeError, Connector, DatabaseBackend};

/// A mock over a 37-row table `t(x)` that understands the window rewrite.
fn table_driver(backend: DatabaseBackend) -> MockDriver {
    MockDriver::with_responder(backend, |sql| {
        let page = if sql.contains("LIMIT 10") { 10 } else { 37 };
        if sql.contains("OVER ()") {
            Ok(vec![MemoryBatch::new(
                &[("x", "int4"), (TOTAL_COUNT_COLUMN, "int8")],
                (0..page).map(|i| vec![Value::Int(i), Value::Int(37)]).collect(),
            )])
        } else if sql.starts_with("SELECT COUNT(*)") {
            Ok(vec![MemoryBatch::count(37)])
        } else {
            Ok(vec![MemoryBatch::new(
                &[("x", "UInt32")],
                (0..page).map(|i| vec![Value::Int(i)]).collect(),
            )])
        }
    })
}

fn connector_with(driver: MockDriver) -> Connector {
    let mut connector = Connector::new().unwrap();
    connector.attach(Box::new(driver));
    connector
}

#[test]
fn test_count_injection_window_engine() {
    let mut connector = connector_with(table_driver(DatabaseBackend::Postgres));

    let result = connector
        .execute("SELECT * FROM t ORDER BY x LIMIT 10")
        .unwrap();

    assert_eq!(result.count, 37);
    assert_eq!(result.rows.len(), 10);
    assert_eq!(result.columns.len(), 1);
    assert!(result.rows.iter().all(|row| row.len() == 1));
}

#[test]
fn test_count_injection_separate_count_engine() {
    let mut connector = connector_with(table_driver(DatabaseBackend::ClickHouse));

    let result = connector
        .execute("SELECT * FROM t ORDER BY x LIMIT 10")
        .unwrap();

    assert_eq!(result.count, 37);
    assert_eq!(result.rows.len(), 10);
}

#[test]
fn test_aggregate_count_is_not_double_counted() {
    let driver = MockDriver::with_responder(DatabaseBackend::Postgres, |_| {
        Ok(vec![MemoryBatch::count(37)])
    });
    let mut connector = connector_with(driver);

    let result = connector.execute("SELECT COUNT(*) FROM t").unwrap();

    assert_eq!(result.count, 1);
    assert_eq!(result.rows, vec![vec![Value::Int(37)]]);
}

#[test]
fn test_execute_to_json() {
    let mut connector = connector_with(table_driver(DatabaseBackend::Postgres));

    let json = connector
        .execute_to_json("SELECT * FROM t ORDER BY x LIMIT 10")
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed["count"], 37);
    assert_eq!(parsed["rows"].as_array().map(Vec::len), Some(10));
    assert_eq!(parsed["rows"][3]["x"], 3);
    assert_eq!(parsed["columns"][0]["type"], "int4");
}

#[test]
fn test_query_failure_carries_engine_context() {
    let driver = MockDriver::new(DatabaseBackend::ClickHouse).fail_on("nope");
    let mut connector = connector_with(driver);

    let err = connector.execute("SELECT nope").unwrap_err();

    assert!(matches!(err, BridgeError::Query(_)));
    assert!(err.to_string().contains("ClickHouse query failed"));
    assert!(connector.is_connected());
}

#[test]
fn test_double_begin_fails_and_stays_active() {
    let mut connector = connector_with(MockDriver::new(DatabaseBackend::Postgres));

    connector.begin_transaction().unwrap();
    let err = connector.begin_transaction().unwrap_err();

    assert!(matches!(err, BridgeError::Transaction(_)));
    assert!(connector.is_in_transaction());
    assert!(connector.is_connected());
}

#[test]
fn test_rollback_without_transaction_fails() {
    let mut connector = connector_with(MockDriver::new(DatabaseBackend::Postgres));

    assert!(matches!(
        connector.rollback_transaction(),
        Err(BridgeError::Transaction(_))
    ));
    assert!(matches!(
        connector.commit_transaction(),
        Err(BridgeError::Transaction(_))
    ));
    assert!(!connector.is_in_transaction());
}

#[test]
fn test_commit_makes_effects_durable() {
    let driver = MockDriver::new(DatabaseBackend::Postgres);
    let state = driver.state();
    let mut connector = connector_with(driver);

    connector.begin_transaction().unwrap();
    connector.execute_batch(&["INSERT INTO t VALUES (1)"]).unwrap();
    assert!(state.lock().unwrap().committed.is_empty());
    connector.commit_transaction().unwrap();

    assert!(!connector.is_in_transaction());
    assert_eq!(
        state.lock().unwrap().committed,
        vec!["INSERT INTO t VALUES (1)".to_string()]
    );
}

#[test]
fn test_drop_rolls_back_active_transaction() {
    let driver = MockDriver::new(DatabaseBackend::Postgres);
    let state = driver.state();

    {
        let mut connector = connector_with(driver);
        connector.execute_batch(&["INSERT INTO t VALUES (1)"]).unwrap();
        connector.begin_transaction().unwrap();
        connector.execute_batch(&["INSERT INTO t VALUES (2)"]).unwrap();
    }

    let state = state.lock().unwrap();
    assert!(state.closed);
    assert_eq!(state.committed, vec!["INSERT INTO t VALUES (1)".to_string()]);
    assert!(state.pending.is_empty());
    assert_eq!(state.executed.last().map(String::as_str), Some("ROLLBACK"));
}

#[test]
fn test_batch_atomicity() {
    let driver = MockDriver::new(DatabaseBackend::Postgres).fail_on("S2");
    let state = driver.state();
    let mut connector = connector_with(driver);

    let err = connector.execute_batch(&["S1", "S2", "S3"]).unwrap_err();

    assert!(matches!(err, BridgeError::Batch(_)));
    assert!(!connector.is_in_transaction());
    let state = state.lock().unwrap();
    assert!(state.committed.is_empty());
    assert!(!state.executed.contains(&"S3".to_string()));
}

#[test]
fn test_batch_inside_transaction_leaves_commit_to_caller() {
    let driver = MockDriver::new(DatabaseBackend::ClickHouse);
    let state = driver.state();
    let mut connector = connector_with(driver);

    connector.begin_transaction().unwrap();
    connector.execute_batch(&["S1", "S2"]).unwrap();

    assert!(connector.is_in_transaction());
    assert!(state.lock().unwrap().committed.is_empty());

    connector.rollback_transaction().unwrap();
    assert!(state.lock().unwrap().committed.is_empty());
}

#[test]
fn test_disconnected_connector() {
    let mut connector = connector_with(MockDriver::new(DatabaseBackend::Postgres));
    connector.disconnect();
    connector.disconnect();

    assert!(!connector.is_connected());
    assert!(matches!(
        connector.execute("SELECT 1"),
        Err(BridgeError::Query(_))
    ));
    assert!(connector.begin_transaction().is_err());
}
