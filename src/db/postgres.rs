//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `EngineDriver` trait
//! for PostgreSQL using a single dedicated sqlx connection.

use super::collector::{NativeBatch, ResultCollector};
use super::normalize::{normalize_pg_type, pg_builtin_type_name, TypeCatalog};
use super::types::Value;
use super::{connect_with_retry, DatabaseBackend, EngineDriver};
use crate::config::{ConnectionConfig, QuerySettings};
use crate::error::{BridgeError, DecodeError, Result};
use async_trait::async_trait;
use sqlx::postgres::types::{Oid, PgInterval, PgTimeTz};
use sqlx::postgres::{PgColumn, PgConnection, PgRow, PgValueFormat};
use sqlx::types::chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::{JsonValue, Uuid};
use sqlx::{
    Column as SqlxColumn, Connection, Executor, Row as SqlxRow, Statement, TypeInfo, ValueRef,
};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, warn};

const ENGINE: &str = "PostgreSQL";

/// Native PostgreSQL column kinds, keyed by type OID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgKind {
    Bool,
    Char,
    Int2,
    Int4,
    Int8,
    Oid,
    Float4,
    Float8,
    Numeric,
    Text,
    Bytea,
    Date,
    Time,
    TimeTz,
    Timestamp,
    Timestamptz,
    Interval,
    Uuid,
    Json,
    Inet,
    Cidr,
    /// A user-defined enum, found through `pg_type.typtype`.
    Enum,
    /// A one-dimensional array of a builtin element type.
    Array(PgElement),
    Unknown,
}

/// Element kinds of the arrays rendered as PostgreSQL array literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgElement {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Uuid,
}

impl PgKind {
    /// Classifies a column by its type OID.
    pub fn from_oid(oid: u32) -> Self {
        match oid {
            16 => Self::Bool,
            18 => Self::Char,
            21 => Self::Int2,
            23 => Self::Int4,
            20 => Self::Int8,
            26 => Self::Oid,
            700 => Self::Float4,
            701 => Self::Float8,
            1700 => Self::Numeric,
            19 | 25 | 705 | 1042 | 1043 => Self::Text,
            17 => Self::Bytea,
            1082 => Self::Date,
            1083 => Self::Time,
            1266 => Self::TimeTz,
            1114 => Self::Timestamp,
            1184 => Self::Timestamptz,
            1186 => Self::Interval,
            2950 => Self::Uuid,
            114 | 3802 => Self::Json,
            869 => Self::Inet,
            650 => Self::Cidr,
            1000 => Self::Array(PgElement::Bool),
            1005 => Self::Array(PgElement::Int2),
            1007 => Self::Array(PgElement::Int4),
            1016 => Self::Array(PgElement::Int8),
            1021 => Self::Array(PgElement::Float4),
            1022 => Self::Array(PgElement::Float8),
            1231 => Self::Array(PgElement::Numeric),
            1003 | 1009 | 1014 | 1015 => Self::Array(PgElement::Text),
            2951 => Self::Array(PgElement::Uuid),
            _ => Self::Unknown,
        }
    }
}

/// Types looked up in `pg_type` for OIDs missing from the builtin table.
#[derive(Debug, Default)]
struct PgTypeCatalog {
    names: HashMap<u32, String>,
    enums: HashSet<u32>,
}

impl PgTypeCatalog {
    fn knows(&self, oid: u32) -> bool {
        self.names.contains_key(&oid)
    }

    fn kind(&self, oid: u32) -> PgKind {
        if self.enums.contains(&oid) {
            PgKind::Enum
        } else {
            PgKind::from_oid(oid)
        }
    }
}

impl TypeCatalog for PgTypeCatalog {
    fn type_name(&self, oid: u32) -> Option<String> {
        self.names.get(&oid).cloned()
    }
}

/// PostgreSQL engine driver.
pub struct PostgresClient {
    conn: Option<PgConnection>,
    /// Filled lazily from `pg_type`.
    catalog: PgTypeCatalog,
    timeout: Duration,
}

impl std::fmt::Debug for PostgresClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresClient")
            .field("connected", &self.conn.is_some())
            .field("catalog", &self.catalog)
            .finish()
    }
}

impl PostgresClient {
    /// Opens one connection, retrying transient failures.
    pub async fn connect(config: &ConnectionConfig, settings: &QuerySettings) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let conn = connect_with_retry(
            settings,
            || PgConnection::connect(&conn_str),
            is_transient_error,
        )
        .await
        .map_err(|e| map_connection_error(e, config))?;

        debug!("Successfully connected to PostgreSQL");
        Ok(Self {
            conn: Some(conn),
            catalog: PgTypeCatalog::default(),
            timeout: settings.timeout(),
        })
    }

    fn conn_mut(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| BridgeError::connection("Not connected to PostgreSQL"))
    }

    /// Looks up names for column type OIDs missing from the builtin table,
    /// noting which of them are enums.
    ///
    /// Failures are ignored; such columns fall back to `oid_<n>`.
    async fn resolve_types(&mut self, columns: &[PgColumn]) {
        let unresolved: Vec<u32> = columns
            .iter()
            .filter_map(|col| col.type_info().oid())
            .map(|oid| oid.0)
            .filter(|oid| pg_builtin_type_name(*oid).is_none() && !self.catalog.knows(*oid))
            .collect();

        for oid in unresolved {
            let Ok(conn) = self.conn_mut() else {
                return;
            };
            let lookup = sqlx::query_as::<_, (String, bool)>(
                "SELECT typname::text, typtype = 'e' FROM pg_type WHERE oid = $1",
            )
            .bind(Oid(oid))
            .fetch_optional(&mut *conn)
            .await;

            match lookup {
                Ok(Some((name, is_enum))) => {
                    if is_enum {
                        self.catalog.enums.insert(oid);
                    }
                    self.catalog.names.insert(oid, name);
                }
                Ok(None) => debug!("Type OID {} not present in pg_type", oid),
                Err(e) => warn!("Type lookup for OID {} failed: {}", oid, e),
            }
        }
    }

    /// Column descriptions of `sql` without fetching rows.
    ///
    /// The statement is already in the connection's cache after a successful
    /// run, so this does not go back to the server.
    async fn describe(&mut self, sql: &str) -> Option<Vec<PgColumn>> {
        let conn = self.conn_mut().ok()?;
        match (&mut *conn).prepare(sql).await {
            Ok(statement) => Some(statement.columns().to_vec()),
            Err(e) => {
                debug!("Could not describe empty result: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl EngineDriver for PostgresClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn run_query(&mut self, sql: &str, collector: &mut ResultCollector) -> Result<()> {
        let timeout = self.timeout;
        let conn = self.conn_mut()?;

        let rows: Vec<PgRow> = tokio::time::timeout(timeout, sqlx::query(sql).fetch_all(&mut *conn))
            .await
            .map_err(|_| timeout_error(timeout))?
            .map_err(|e| BridgeError::query(format!("{ENGINE} query failed: {}", format_query_error(e))))?;

        // an empty result carries no row to read the columns from
        let columns = match rows.first() {
            Some(first) => first.columns().to_vec(),
            None => match self.describe(sql).await {
                Some(columns) => columns,
                None => return Ok(()),
            },
        };
        self.resolve_types(&columns).await;

        let batch = PgBatch::new(&rows, &columns, &self.catalog);
        collector.push_batch(&batch);
        Ok(())
    }

    async fn run_statement(&mut self, sql: &str) -> Result<()> {
        let timeout = self.timeout;
        let conn = self.conn_mut()?;

        tokio::time::timeout(timeout, conn.execute(sqlx::raw_sql(sql)))
            .await
            .map_err(|_| timeout_error(timeout))?
            .map_err(|e| BridgeError::query(format!("{ENGINE} query failed: {}", format_query_error(e))))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .await
                .map_err(|e| BridgeError::connection(format!("Failed to close connection: {e}")))?;
        }
        Ok(())
    }
}

/// One materialized PostgreSQL result set.
pub struct PgBatch<'a> {
    rows: &'a [PgRow],
    names: Vec<String>,
    types: Vec<String>,
    kinds: Vec<PgKind>,
}

impl<'a> PgBatch<'a> {
    fn new(rows: &'a [PgRow], columns: &[PgColumn], catalog: &PgTypeCatalog) -> Self {
        let mut names = Vec::with_capacity(columns.len());
        let mut types = Vec::with_capacity(columns.len());
        let mut kinds = Vec::with_capacity(columns.len());
        for col in columns {
            names.push(col.name().to_string());
            match col.type_info().oid() {
                Some(oid) => {
                    types.push(normalize_pg_type(oid.0, catalog));
                    kinds.push(catalog.kind(oid.0));
                }
                None => {
                    types.push(col.type_info().name().to_string());
                    kinds.push(PgKind::Unknown);
                }
            }
        }

        Self {
            rows,
            names,
            types,
            kinds,
        }
    }
}

impl NativeBatch for PgBatch<'_> {
    fn column_count(&self) -> usize {
        self.names.len()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_name(&self, col: usize) -> &str {
        &self.names[col]
    }

    fn column_type(&self, col: usize) -> String {
        self.types[col].clone()
    }

    fn decode(&self, row: usize, col: usize) -> Value {
        match decode_cell(&self.rows[row], col, self.kinds[col]) {
            Ok(Some(value)) => value,
            Ok(None) => Value::Text(format!("[{}]", self.types[col])),
            Err(e) => Value::decode_failure(&e),
        }
    }
}

/// Decodes one cell. `Ok(None)` means the kind has no textual form.
fn decode_cell(row: &PgRow, idx: usize, kind: PgKind) -> std::result::Result<Option<Value>, DecodeError> {
    let value: Value = match kind {
        PgKind::Bool => row.try_get::<Option<bool>, _>(idx)?.into(),
        PgKind::Char => row
            .try_get::<Option<i8>, _>(idx)?
            .map(|c| Value::Text(char::from(c as u8).to_string()))
            .unwrap_or_default(),
        PgKind::Int2 => row
            .try_get::<Option<i16>, _>(idx)?
            .map(|v| Value::Int(v.into()))
            .unwrap_or_default(),
        PgKind::Int4 => row.try_get::<Option<i32>, _>(idx)?.into(),
        PgKind::Int8 => row.try_get::<Option<i64>, _>(idx)?.into(),
        PgKind::Oid => row
            .try_get::<Option<Oid>, _>(idx)?
            .map(|v| Value::Int(v.0.into()))
            .unwrap_or_default(),
        PgKind::Float4 => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| Value::Float(v.into()))
            .unwrap_or_default(),
        PgKind::Float8 => row.try_get::<Option<f64>, _>(idx)?.into(),
        PgKind::Numeric => {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                Value::Null
            } else {
                let format = raw.format();
                let bytes = raw.as_bytes().map_err(|e| DecodeError::new(e.to_string()))?;
                match format {
                    PgValueFormat::Binary => Value::Text(numeric_text(bytes)?),
                    PgValueFormat::Text => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
                }
            }
        }
        PgKind::Text => row.try_get::<Option<String>, _>(idx)?.into(),
        PgKind::Bytea => row
            .try_get::<Option<Vec<u8>>, _>(idx)?
            .map(|bytes| Value::Text(hex_bytes(&bytes)))
            .unwrap_or_default(),
        PgKind::Date => text(row.try_get::<Option<NaiveDate>, _>(idx)?),
        PgKind::Time => text(row.try_get::<Option<NaiveTime>, _>(idx)?),
        PgKind::TimeTz => row
            .try_get::<Option<PgTimeTz<NaiveTime, FixedOffset>>, _>(idx)?
            .map(|t| Value::Text(format!("{}{}", t.time, utc_offset_text(t.offset))))
            .unwrap_or_default(),
        PgKind::Timestamp => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|ts| Value::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            .unwrap_or_default(),
        PgKind::Timestamptz => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|ts| Value::Text(ts.to_rfc3339()))
            .unwrap_or_default(),
        PgKind::Interval => row
            .try_get::<Option<PgInterval>, _>(idx)?
            .map(|iv| Value::Text(interval_text(&iv)))
            .unwrap_or_default(),
        PgKind::Uuid => text(row.try_get::<Option<Uuid>, _>(idx)?),
        PgKind::Json => text(row.try_get::<Option<JsonValue>, _>(idx)?),
        PgKind::Inet => row
            .try_get::<Option<IpNetwork>, _>(idx)?
            .map(|net| Value::Text(inet_text(net)))
            .unwrap_or_default(),
        PgKind::Cidr => text(row.try_get::<Option<IpNetwork>, _>(idx)?),
        // enum labels travel as UTF-8 in both wire formats
        PgKind::Enum => row.try_get_unchecked::<Option<String>, _>(idx)?.into(),
        PgKind::Array(element) => decode_array(row, idx, element)?,
        PgKind::Unknown => {
            if row.try_get_raw(idx)?.is_null() {
                Value::Null
            } else {
                return Ok(None);
            }
        }
    };
    Ok(Some(value))
}

/// Decodes a one-dimensional array into its PostgreSQL literal, e.g. `{1,2,NULL}`.
///
/// The column OID already pins the element type, so the element decoders are
/// not re-checked against it.
fn decode_array(row: &PgRow, idx: usize, element: PgElement) -> std::result::Result<Value, DecodeError> {
    fn items<T, F>(row: &PgRow, idx: usize, render: F) -> std::result::Result<Option<Vec<Option<String>>>, DecodeError>
    where
        T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
        F: Fn(T) -> String,
    {
        let items = row.try_get_unchecked::<Option<Vec<Option<T>>>, _>(idx)?;
        Ok(items.map(|items| items.into_iter().map(|item| item.map(&render)).collect()))
    }

    let rendered = match element {
        PgElement::Bool => items::<bool, _>(row, idx, |b| String::from(if b { "t" } else { "f" }))?,
        PgElement::Int2 => items::<i16, _>(row, idx, |v| v.to_string())?,
        PgElement::Int4 => items::<i32, _>(row, idx, |v| v.to_string())?,
        PgElement::Int8 => items::<i64, _>(row, idx, |v| v.to_string())?,
        PgElement::Float4 => items::<f32, _>(row, idx, float_text)?,
        PgElement::Float8 => items::<f64, _>(row, idx, float_text)?,
        PgElement::Text => items::<String, _>(row, idx, |s| s)?,
        PgElement::Uuid => items::<Uuid, _>(row, idx, |u| u.to_string())?,
        PgElement::Numeric => {
            let raw = row.try_get_unchecked::<Option<Vec<Option<Vec<u8>>>>, _>(idx)?;
            raw.map(|items| {
                items
                    .into_iter()
                    .map(|item| item.map(|bytes| numeric_text(&bytes)).transpose())
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .transpose()?
        }
    };

    Ok(rendered
        .map(|items| Value::Text(array_literal(items, element == PgElement::Text)))
        .unwrap_or_default())
}

/// Joins rendered elements into `{a,b,NULL}`, quoting text elements the way
/// PostgreSQL's array output does.
fn array_literal(items: Vec<Option<String>>, quote_text: bool) -> String {
    let mut out = String::from("{");
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match item {
            None => out.push_str("NULL"),
            Some(s) if quote_text && needs_array_quotes(&s) => {
                out.push('"');
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
            Some(s) => out.push_str(&s),
        }
    }
    out.push('}');
    out
}

fn needs_array_quotes(s: &str) -> bool {
    s.is_empty()
        || s.eq_ignore_ascii_case("NULL")
        || s.chars()
            .any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_ascii_whitespace())
}

fn float_text<F: Into<f64> + ToString + Copy>(v: F) -> String {
    let f: f64 = v.into();
    if f.is_nan() {
        "NaN".to_string()
    } else if f == f64::INFINITY {
        "Infinity".to_string()
    } else if f == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        v.to_string()
    }
}

/// Renders a binary `numeric` value at its declared display scale.
///
/// Layout: digit count, weight of the first base-10000 digit, sign word,
/// display scale, then the digits themselves, all big-endian 16-bit.
fn numeric_text(bytes: &[u8]) -> std::result::Result<String, DecodeError> {
    let word = |i: usize| -> std::result::Result<i16, DecodeError> {
        bytes
            .get(i * 2..i * 2 + 2)
            .map(|b| i16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| DecodeError::new("truncated numeric value"))
    };

    let ndigits = word(0)?;
    let weight = word(1)?;
    let sign = word(2)? as u16;
    let dscale = word(3)?;

    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        0x0000 | 0x4000 => {}
        other => return Err(DecodeError::new(format!("invalid numeric sign {other:#06x}"))),
    }

    let digits = (0..usize::try_from(ndigits).unwrap_or(0))
        .map(|i| word(4 + i))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let digit = |pos: i32| -> i16 {
        usize::try_from(pos)
            .ok()
            .and_then(|p| digits.get(p).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for pos in 0..=i32::from(weight) {
            if pos == 0 {
                let _ = write!(out, "{}", digit(pos));
            } else {
                let _ = write!(out, "{:04}", digit(pos));
            }
        }
    }

    let scale = usize::try_from(dscale).unwrap_or(0);
    if scale > 0 {
        let mut fraction = String::with_capacity(scale + 4);
        let mut pos = i32::from(weight) + 1;
        while fraction.len() < scale {
            let _ = write!(fraction, "{:04}", digit(pos));
            pos += 1;
        }
        fraction.truncate(scale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}

/// Formats an interval in PostgreSQL's default `postgres` output style.
fn interval_text(iv: &PgInterval) -> String {
    let mut out = String::new();
    // after a negative field, positive ones carry an explicit sign
    let mut after_negative = false;

    for (value, unit) in [
        (iv.months / 12, "year"),
        (iv.months % 12, "mon"),
        (iv.days, "day"),
    ] {
        if value == 0 {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        let sign = if after_negative && value > 0 { "+" } else { "" };
        let plural = if value != 1 { "s" } else { "" };
        let _ = write!(out, "{sign}{value} {unit}{plural}");
        after_negative = value < 0;
    }

    if iv.microseconds != 0 || out.is_empty() {
        let total = iv.microseconds.unsigned_abs();
        let hours = total / 3_600_000_000;
        let minutes = total / 60_000_000 % 60;
        let seconds = total / 1_000_000 % 60;
        let micros = total % 1_000_000;

        if !out.is_empty() {
            out.push(' ');
        }
        let sign = if iv.microseconds < 0 {
            "-"
        } else if after_negative {
            "+"
        } else {
            ""
        };
        let _ = write!(out, "{sign}{hours:02}:{minutes:02}:{seconds:02}");
        if micros != 0 {
            let fraction = format!("{micros:06}");
            out.push('.');
            out.push_str(fraction.trim_end_matches('0'));
        }
    }
    out
}

/// Formats a UTC offset as PostgreSQL does: `+HH`, `+HH:MM` or `+HH:MM:SS`.
fn utc_offset_text(offset: FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.unsigned_abs();
    let mut out = format!("{sign}{:02}", secs / 3600);
    if secs % 3600 != 0 {
        let _ = write!(out, ":{:02}", secs / 60 % 60);
        if secs % 60 != 0 {
            let _ = write!(out, ":{:02}", secs % 60);
        }
    }
    out
}

/// `inet` hides a full-length prefix, `cidr` always shows it.
fn inet_text(net: IpNetwork) -> String {
    let full = match net {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    };
    if net.prefix() == full {
        net.ip().to_string()
    } else {
        net.to_string()
    }
}

fn text<T: ToString>(v: Option<T>) -> Value {
    v.map(|v| Value::Text(v.to_string())).unwrap_or_default()
}

/// Renders bytes the way PostgreSQL's `bytea_output = hex` does.
fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn timeout_error(timeout: Duration) -> BridgeError {
    BridgeError::query(format!(
        "{ENGINE} query failed: timed out after {} seconds",
        timeout.as_secs()
    ))
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    // Connection refused or timeout are often transient
    if error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
    {
        return true;
    }

    false
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> BridgeError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.effective_port();
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        BridgeError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        BridgeError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        BridgeError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        BridgeError::connection(
            "Server requires SSL. Add '?sslmode=require' to connection string.".to_string(),
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        BridgeError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        BridgeError::connection(format!("{ENGINE} connection failed: {error}"))
    }
}

/// Formats a query error with detail and hint if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
