//! Type-name normalization across engines.
//!
//! Maps each engine's native type descriptor to a canonical type name. Every
//! function here is total: unknown descriptors produce a deterministic
//! fallback name embedding the raw identifier.

use std::collections::HashMap;

/// Fallback lookup for PostgreSQL type OIDs missing from the static table.
///
/// The live implementation queries `pg_type`; tests inject a stub.
pub trait TypeCatalog {
    /// Returns the type name for `oid`, if the catalog knows it.
    fn type_name(&self, oid: u32) -> Option<String>;
}

impl TypeCatalog for HashMap<u32, String> {
    fn type_name(&self, oid: u32) -> Option<String> {
        self.get(&oid).cloned()
    }
}

/// A catalog that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCatalog;

impl TypeCatalog for EmptyCatalog {
    fn type_name(&self, _oid: u32) -> Option<String> {
        None
    }
}

/// Built-in PostgreSQL type names keyed by OID.
pub fn pg_builtin_type_name(oid: u32) -> Option<&'static str> {
    let name = match oid {
        16 => "bool",
        17 => "bytea",
        18 => "char",
        19 => "name",
        20 => "int8",
        21 => "int2",
        23 => "int4",
        25 => "text",
        26 => "oid",
        114 => "json",
        142 => "xml",
        600 => "point",
        601 => "lseg",
        602 => "path",
        603 => "box",
        628 => "line",
        650 => "cidr",
        700 => "float4",
        701 => "float8",
        774 => "macaddr8",
        869 => "inet",
        1000 => "bool[]",
        1003 => "name[]",
        1005 => "int2[]",
        1007 => "int4[]",
        1009 => "text[]",
        1014 => "bpchar[]",
        1015 => "varchar[]",
        1016 => "int8[]",
        1021 => "float4[]",
        1022 => "float8[]",
        1040 => "macaddr",
        1042 => "bpchar",
        1043 => "varchar",
        1082 => "date",
        1083 => "time",
        1114 => "timestamp",
        1184 => "timestamptz",
        1186 => "interval",
        1231 => "numeric[]",
        1266 => "timetz",
        1700 => "numeric",
        2275 => "cstring",
        2950 => "uuid",
        2951 => "uuid[]",
        3802 => "jsonb",
        _ => return None,
    };
    Some(name)
}

/// Canonical name for a PostgreSQL column type.
///
/// Static table first, then `catalog`, then `oid_<n>`.
pub fn normalize_pg_type(oid: u32, catalog: &dyn TypeCatalog) -> String {
    if let Some(name) = pg_builtin_type_name(oid) {
        return name.to_string();
    }
    catalog
        .type_name(oid)
        .unwrap_or_else(|| format!("oid_{oid}"))
}

const CLICKHOUSE_WRAPPERS: [&str; 2] = ["Nullable", "LowCardinality"];

/// Canonical name for a ClickHouse column type.
///
/// `Nullable(...)` and `LowCardinality(...)` wrappers are stripped, in any
/// nesting order, down to the bare inner name. Malformed descriptors come back
/// as `[<raw>]`.
pub fn normalize_clickhouse_type(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !parens_balanced(trimmed) {
        return format!("[{raw}]");
    }
    strip_clickhouse_wrappers(trimmed).0.to_string()
}

/// Peels wrapper annotations, reporting whether `Nullable` was among them.
pub(crate) fn strip_clickhouse_wrappers(raw: &str) -> (&str, bool) {
    let mut current = raw.trim();
    let mut nullable = false;
    loop {
        let Some(inner) = CLICKHOUSE_WRAPPERS.iter().find_map(|wrapper| {
            current
                .strip_prefix(wrapper)
                .and_then(|rest| rest.strip_prefix('('))
                .and_then(|rest| rest.strip_suffix(')'))
                .map(|inner| (*wrapper, inner.trim()))
        }) else {
            return (current, nullable);
        };
        if inner.0 == "Nullable" {
            nullable = true;
        }
        current = inner.1;
    }
}

/// Parentheses balance outside quoted literals.
fn parens_balanced(s: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quote => {
                chars.next();
            }
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_quote
}
