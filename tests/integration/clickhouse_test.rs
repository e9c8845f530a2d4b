//! Live ClickHouse tests.
//!
//! Skipped unless CLICKHOUSE_URL is set, e.g. `clickhouse://default@localhost:8123/default`.

use pretty_assertions::assert_eq;
use qbridge::{Connector, DatabaseBackend, Value};

fn get_test_connector() -> Option<Connector> {
    let url = std::env::var("CLICKHOUSE_URL").ok()?;
    let mut connector = Connector::new().ok()?;
    connector.connect_url(&url).ok()?;
    Some(connector)
}

#[test]
fn test_count_query_over_numbers() {
    let Some(mut connector) = get_test_connector() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };
    assert_eq!(connector.backend(), Some(DatabaseBackend::ClickHouse));

    let result = connector
        .execute("SELECT number AS x FROM numbers(37) ORDER BY x LIMIT 10")
        .unwrap();

    assert_eq!(result.count, 37);
    assert_eq!(result.rows.len(), 10);
    assert_eq!(result.columns[0].data_type, "UInt64");
    assert_eq!(result.rows[9], vec![Value::Int(9)]);
}

#[test]
fn test_nullable_and_low_cardinality_types() {
    let Some(mut connector) = get_test_connector() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };

    let result = connector
        .execute(
            "SELECT toNullable(toInt32(5)) AS a, CAST(NULL AS Nullable(String)) AS b, \
             toLowCardinality('x') AS c",
        )
        .unwrap();

    let types: Vec<&str> = result.columns.iter().map(|c| c.data_type.as_str()).collect();
    assert_eq!(types, vec!["Int32", "String", "String"]);
    assert_eq!(
        result.rows[0],
        vec![Value::Int(5), Value::Null, Value::from("x")]
    );
}

#[test]
fn test_uint64_overflow_is_isolated() {
    let Some(mut connector) = get_test_connector() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };

    let result = connector
        .execute("SELECT toUInt64(18446744073709551615) AS big, 1 AS ok")
        .unwrap();

    match &result.rows[0][0] {
        Value::Text(s) => assert!(s.starts_with("[ERROR: ")),
        other => panic!("expected sentinel, got {other:?}"),
    }
    assert_eq!(result.rows[0][1], Value::Int(1));
}

#[test]
fn test_zero_row_result_keeps_columns() {
    let Some(mut connector) = get_test_connector() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };

    let result = connector
        .execute("SELECT number AS x, toString(number) AS s FROM numbers(5) WHERE x > 100")
        .unwrap();

    assert_eq!(result.count, 0);
    assert!(result.rows.is_empty());
    let names: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["x", "s"]);
    assert_eq!(result.columns[0].data_type, "UInt64");
}
