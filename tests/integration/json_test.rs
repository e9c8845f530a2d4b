//! JSON wire format tests.
//!
//! Encodes results through the public API and decodes them with serde_json.

use pretty_assertions::assert_eq;
use qbridge::json::encode;
use qbridge::{ColumnInfo, QueryResult, Value};

fn single_row(values: Vec<(&str, &str, Value)>) -> QueryResult {
    let (columns, row): (Vec<ColumnInfo>, Vec<Value>) = values
        .into_iter()
        .map(|(name, ty, v)| (ColumnInfo::new(name, ty), v))
        .unzip();
    QueryResult::with_data(columns, vec![row])
}

#[test]
fn test_every_variant_round_trips() {
    let result = single_row(vec![
        ("n", "int4", Value::Null),
        ("b", "bool", Value::Bool(true)),
        ("i", "int8", Value::Int(i64::MAX)),
        ("f", "float8", Value::Float(-2.718281828459045)),
        ("t", "text", Value::from("päivää \"x\"\n")),
    ]);

    let parsed: serde_json::Value = serde_json::from_str(&encode(&result).unwrap()).unwrap();
    let row = &parsed["rows"][0];

    assert!(row["n"].is_null());
    assert_eq!(row["b"], true);
    assert_eq!(row["i"].as_i64(), Some(i64::MAX));
    assert_eq!(row["f"].as_f64(), Some(-2.718281828459045));
    assert_eq!(row["t"], "päivää \"x\"\n");
}

#[test]
fn test_control_bytes_escape() {
    let result = single_row(vec![("s", "text", Value::from("\"\\\n\u{1}"))]);
    let json = encode(&result).unwrap();

    assert!(json.contains(r#"{"s":"\"\\\n\u0001"}"#));

    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["rows"][0]["s"].as_str(), Some("\"\\\n\u{1}"));
}

#[test]
fn test_count_independent_of_rows() {
    let result = single_row(vec![("x", "int4", Value::Int(1))]).with_count(500);
    let parsed: serde_json::Value = serde_json::from_str(&encode(&result).unwrap()).unwrap();

    assert_eq!(parsed["count"], 500);
    assert_eq!(parsed["rows"].as_array().map(Vec::len), Some(1));
}

#[test]
fn test_duplicate_column_names_keep_order() {
    let result = single_row(vec![
        ("id", "int4", Value::Int(1)),
        ("id", "int4", Value::Int(2)),
    ]);

    assert!(encode(&result)
        .unwrap()
        .starts_with(r#"{"rows":[{"id":1,"id":2}]"#));
}
