//! Live PostgreSQL tests.
//!
//! Skipped unless DATABASE_URL points at a PostgreSQL server the tests may
//! create temporary tables on.

use pretty_assertions::assert_eq;
use qbridge::{BridgeError, Connector, Value};

fn get_test_connector() -> Option<Connector> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let mut connector = Connector::new().ok()?;
    connector.connect_url(&url).ok()?;
    Some(connector)
}

#[test]
fn test_count_injection_over_generated_rows() {
    let Some(mut connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = connector
        .execute("SELECT g AS x FROM generate_series(1, 37) AS g ORDER BY x LIMIT 10")
        .unwrap();

    assert_eq!(result.count, 37);
    assert_eq!(result.rows.len(), 10);
    assert_eq!(result.columns.len(), 1);
    assert_eq!(result.columns[0].name, "x");
    assert_eq!(result.rows[0], vec![Value::Int(1)]);
}

#[test]
fn test_page_past_end_still_counts() {
    let Some(mut connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = connector
        .execute("SELECT g FROM generate_series(1, 37) AS g LIMIT 10 OFFSET 100")
        .unwrap();

    assert!(result.rows.is_empty());
    assert_eq!(result.count, 37);
    assert_eq!(result.columns.len(), 1);
    assert_eq!(result.columns[0].name, "g");
}

#[test]
fn test_zero_row_result_reports_columns() {
    let Some(mut connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let json = connector
        .execute_to_json("SELECT g AS x, g::text AS label FROM generate_series(1, 5) AS g WHERE g > 10")
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed["count"], 0);
    assert_eq!(parsed["rows"], serde_json::json!([]));
    assert_eq!(
        parsed["columns"],
        serde_json::json!([{"name": "x", "type": "int4"}, {"name": "label", "type": "text"}])
    );
}

#[test]
fn test_standard_string_backslash_keeps_pagination() {
    let Some(mut connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = connector
        .execute(r"SELECT g FROM generate_series(1, 37) AS g WHERE 'x' <> 'C:\' ORDER BY g LIMIT 10")
        .unwrap();

    assert_eq!(result.rows.len(), 10);
    assert_eq!(result.count, 37);
}

#[test]
fn test_batch_rollback_leaves_no_rows() {
    let Some(mut connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    connector
        .execute_batch(&["CREATE TEMP TABLE qb_batch_test (v int PRIMARY KEY)"])
        .unwrap();
    let err = connector
        .execute_batch(&[
            "INSERT INTO qb_batch_test VALUES (1)",
            "INSERT INTO qb_batch_test VALUES (1)",
            "INSERT INTO qb_batch_test VALUES (2)",
        ])
        .unwrap_err();
    assert!(matches!(err, BridgeError::Batch(_)));

    let result = connector.execute("SELECT v FROM qb_batch_test").unwrap();
    assert_eq!(result.count, 0);
}

#[test]
fn test_failed_query_inside_transaction_keeps_state() {
    let Some(mut connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    connector.begin_transaction().unwrap();
    assert!(connector.execute("SELECT * FROM nonexistent_table_xyz").is_err());
    assert!(connector.is_in_transaction());
    connector.rollback_transaction().unwrap();
    assert!(!connector.is_in_transaction());
}
