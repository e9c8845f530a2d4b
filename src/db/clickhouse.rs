//! ClickHouse database client implementation.
//!
//! Talks to ClickHouse over its HTTP interface. Every request carries the
//! connector's `session_id`, so session state such as an open transaction
//! survives across requests. Query results are streamed in
//! `JSONCompactEachRowWithNamesAndTypes`; each chunk of complete rows received
//! from the server becomes one native batch.

use super::collector::{NativeBatch, ResultCollector};
use super::normalize::{normalize_clickhouse_type, strip_clickhouse_wrappers};
use super::types::Value;
use super::{connect_with_retry, DatabaseBackend, EngineDriver};
use crate::config::{ConnectionConfig, QuerySettings};
use crate::error::{BridgeError, DecodeError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const ENGINE: &str = "ClickHouse";

const OUTPUT_FORMAT: &str = "JSONCompactEachRowWithNamesAndTypes";

/// Native ClickHouse column kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    FixedString(usize),
    Nullable(Box<ChKind>),
    Date,
    DateTime,
    Uuid,
    Unknown(String),
}

impl ChKind {
    /// Parses a ClickHouse type descriptor. `LowCardinality` is transparent.
    pub fn parse(raw: &str) -> Self {
        let (inner, nullable) = strip_clickhouse_wrappers(raw);
        let kind = Self::parse_base(inner);
        if nullable {
            Self::Nullable(Box::new(kind))
        } else {
            kind
        }
    }

    fn parse_base(name: &str) -> Self {
        match name {
            "Bool" | "Boolean" => Self::Bool,
            "Int8" => Self::Int8,
            "Int16" => Self::Int16,
            "Int32" => Self::Int32,
            "Int64" => Self::Int64,
            "UInt8" => Self::UInt8,
            "UInt16" => Self::UInt16,
            "UInt32" => Self::UInt32,
            "UInt64" => Self::UInt64,
            "Float32" => Self::Float32,
            "Float64" => Self::Float64,
            "String" => Self::String,
            "Date" | "Date32" => Self::Date,
            "UUID" => Self::Uuid,
            "DateTime" => Self::DateTime,
            other if other.starts_with("DateTime(") || other.starts_with("DateTime64(") => {
                Self::DateTime
            }
            other => other
                .strip_prefix("FixedString(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|n| n.trim().parse().ok())
                .map(Self::FixedString)
                .unwrap_or_else(|| Self::Unknown(other.to_string())),
        }
    }

    /// Decodes one JSON cell into the canonical value.
    pub fn decode(&self, cell: &JsonValue) -> std::result::Result<Value, DecodeError> {
        match self {
            // also covers NaN and infinities, which ClickHouse writes as null
            _ if cell.is_null() => Ok(Value::Null),
            Self::Nullable(inner) => inner.decode(cell),
            Self::Bool => match cell {
                JsonValue::Bool(b) => Ok(Value::Bool(*b)),
                other => Ok(Value::Bool(int_cell(other)? != 0)),
            },
            Self::Int8
            | Self::Int16
            | Self::Int32
            | Self::Int64
            | Self::UInt8
            | Self::UInt16
            | Self::UInt32 => Ok(Value::Int(int_cell(cell)?)),
            Self::UInt64 => {
                let n = uint_cell(cell)?;
                i64::try_from(n)
                    .map(Value::Int)
                    .map_err(|_| DecodeError::new(format!("UInt64 value {n} exceeds Int64 range")))
            }
            Self::Float32 | Self::Float64 => Ok(Value::Float(float_cell(cell)?)),
            Self::String | Self::FixedString(_) => Ok(Value::Text(text_cell(cell)?.to_string())),
            Self::Date => {
                let s = text_cell(cell)?;
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(|d| Value::Text(d.to_string()))
                    .map_err(|e| DecodeError::new(format!("invalid Date '{s}': {e}")))
            }
            Self::DateTime => {
                let s = text_cell(cell)?;
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .map(|_| Value::Text(s.to_string()))
                    .map_err(|e| DecodeError::new(format!("invalid DateTime '{s}': {e}")))
            }
            Self::Uuid => {
                let s = text_cell(cell)?;
                uuid::Uuid::parse_str(s)
                    .map(|u| Value::Text(u.to_string()))
                    .map_err(|e| DecodeError::new(format!("invalid UUID '{s}': {e}")))
            }
            Self::Unknown(_) => Ok(match cell {
                JsonValue::String(s) => Value::Text(s.clone()),
                other => Value::Text(other.to_string()),
            }),
        }
    }
}

// 64-bit integers arrive quoted by default.
fn int_cell(cell: &JsonValue) -> std::result::Result<i64, DecodeError> {
    match cell {
        JsonValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| DecodeError::new(format!("{n} is not a 64-bit integer"))),
        JsonValue::String(s) => s
            .parse()
            .map_err(|e| DecodeError::new(format!("invalid integer '{s}': {e}"))),
        other => Err(DecodeError::new(format!("expected integer, got {other}"))),
    }
}

fn uint_cell(cell: &JsonValue) -> std::result::Result<u64, DecodeError> {
    match cell {
        JsonValue::Number(n) => n
            .as_u64()
            .ok_or_else(|| DecodeError::new(format!("{n} is not an unsigned integer"))),
        JsonValue::String(s) => s
            .parse()
            .map_err(|e| DecodeError::new(format!("invalid integer '{s}': {e}"))),
        other => Err(DecodeError::new(format!("expected integer, got {other}"))),
    }
}

fn float_cell(cell: &JsonValue) -> std::result::Result<f64, DecodeError> {
    match cell {
        JsonValue::Number(n) => n
            .as_f64()
            .ok_or_else(|| DecodeError::new(format!("{n} is not a float"))),
        JsonValue::String(s) => s
            .parse()
            .map_err(|e| DecodeError::new(format!("invalid float '{s}': {e}"))),
        other => Err(DecodeError::new(format!("expected float, got {other}"))),
    }
}

fn text_cell(cell: &JsonValue) -> std::result::Result<&str, DecodeError> {
    cell.as_str()
        .ok_or_else(|| DecodeError::new(format!("expected string, got {cell}")))
}

/// Column names and types of one result, shared by all its batches.
#[derive(Debug)]
struct ChSchema {
    names: Vec<String>,
    types: Vec<String>,
    kinds: Vec<ChKind>,
}

/// A chunk of ClickHouse rows.
#[derive(Debug)]
pub struct ChBatch {
    schema: Arc<ChSchema>,
    rows: Vec<Vec<JsonValue>>,
}

impl NativeBatch for ChBatch {
    fn column_count(&self) -> usize {
        self.schema.names.len()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_name(&self, col: usize) -> &str {
        &self.schema.names[col]
    }

    fn column_type(&self, col: usize) -> String {
        normalize_clickhouse_type(&self.schema.types[col])
    }

    fn decode(&self, row: usize, col: usize) -> Value {
        match self.rows[row].get(col) {
            Some(cell) => self.schema.kinds[col].decode(cell).into(),
            None => Value::Null,
        }
    }
}

/// Incremental parser for `JSONCompactEachRowWithNamesAndTypes` bodies.
///
/// The first line holds column names, the second their types, then one JSON
/// array per row.
#[derive(Debug, Default)]
pub(crate) struct EachRowDecoder {
    buffer: Vec<u8>,
    names: Option<Vec<String>>,
    schema: Option<Arc<ChSchema>>,
    rows: Vec<Vec<JsonValue>>,
    /// Whether a batch carrying the schema has been handed out.
    header_sent: bool,
}

impl EachRowDecoder {
    /// Consumes a chunk of the response body.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(chunk);

        let mut start = 0;
        let mut result = Ok(());
        while let Some(len) = buffer[start..].iter().position(|&b| b == b'\n') {
            result = self.parse_line(&buffer[start..start + len]);
            start += len + 1;
            if result.is_err() {
                break;
            }
        }

        buffer.drain(..start);
        self.buffer = buffer;
        result
    }

    /// Flushes a trailing line without newline.
    pub(crate) fn finish(&mut self) -> Result<()> {
        let rest = std::mem::take(&mut self.buffer);
        self.parse_line(&rest)
    }

    /// Rows decoded since the last call, as one batch.
    ///
    /// The first batch after the header lines is handed out even when it has
    /// no rows, so a result with zero rows still reports its columns.
    pub(crate) fn take_batch(&mut self) -> Option<ChBatch> {
        let schema = Arc::clone(self.schema.as_ref()?);
        if self.rows.is_empty() && self.header_sent {
            return None;
        }
        self.header_sent = true;
        Some(ChBatch {
            schema,
            rows: std::mem::take(&mut self.rows),
        })
    }

    fn parse_line(&mut self, line: &[u8]) -> Result<()> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        let cells: Vec<JsonValue> = serde_json::from_slice(line).map_err(|_| {
            // the server appends its exception text when a query fails mid-stream
            BridgeError::query(format!(
                "{ENGINE} query failed: {}",
                String::from_utf8_lossy(line).trim()
            ))
        })?;

        if self.schema.is_some() {
            self.rows.push(cells);
            return Ok(());
        }

        let strings: Vec<String> = cells
            .into_iter()
            .map(|c| match c {
                JsonValue::String(s) => s,
                other => other.to_string(),
            })
            .collect();

        match self.names.take() {
            None => self.names = Some(strings),
            Some(names) => {
                let kinds = strings.iter().map(|t| ChKind::parse(t)).collect();
                self.schema = Some(Arc::new(ChSchema {
                    names,
                    types: strings,
                    kinds,
                }));
            }
        }
        Ok(())
    }
}

/// ClickHouse engine driver.
#[derive(Debug)]
pub struct ClickHouseClient {
    http: reqwest::Client,
    endpoint: Url,
    user: Option<String>,
    password: Option<String>,
    timeout: Duration,
    closed: bool,
}

impl ClickHouseClient {
    /// Opens an HTTP session and verifies it with `SELECT 1`.
    pub async fn connect(config: &ConnectionConfig, settings: &QuerySettings) -> Result<Self> {
        let host = config.host.as_deref().unwrap_or("localhost");
        let port = config.effective_port();

        let mut endpoint = Url::parse(&format!("http://{host}:{port}/"))
            .map_err(|e| BridgeError::config(format!("Invalid ClickHouse address: {e}")))?;
        {
            let mut query = endpoint.query_pairs_mut();
            if let Some(database) = &config.database {
                query.append_pair("database", database);
            }
            query.append_pair("session_id", &uuid::Uuid::new_v4().to_string());
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BridgeError::connection(format!("Failed to build HTTP client: {e}")))?;

        let client = Self {
            http,
            endpoint,
            user: config.user.clone(),
            password: config.password.clone(),
            timeout: settings.timeout(),
            closed: false,
        };

        connect_with_retry(
            settings,
            || client.ping(),
            |e: &reqwest::Error| e.is_connect() || e.is_timeout(),
        )
        .await
        .map_err(|e| map_connection_error(&e, host, port))?
        .map_err(|msg| BridgeError::connection(format!("{ENGINE} connection failed: {msg}")))?;

        debug!("Successfully connected to ClickHouse at {}:{}", host, port);
        Ok(client)
    }

    /// Outer error: transport; inner error: the server rejected the ping.
    async fn ping(&self) -> std::result::Result<std::result::Result<(), String>, reqwest::Error> {
        let response = self.request("SELECT 1").send().await?;
        if response.status().is_success() {
            Ok(Ok(()))
        } else {
            let body = response.text().await?;
            Ok(Err(body.trim().to_string()))
        }
    }

    fn request(&self, sql: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .query(&[("default_format", OUTPUT_FORMAT)])
            .timeout(self.timeout)
            .body(sql.to_string());
        if let Some(user) = &self.user {
            request = request.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.password {
            request = request.header("X-ClickHouse-Key", password);
        }
        request
    }

    async fn send(&self, sql: &str) -> Result<reqwest::Response> {
        if self.closed {
            return Err(BridgeError::connection("Not connected to ClickHouse"));
        }
        let response = self
            .request(sql)
            .send()
            .await
            .map_err(|e| BridgeError::query(format!("{ENGINE} query failed: {e}")))?;

        if response.status().is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("unreadable error response: {e}"));
        Err(BridgeError::query(format!(
            "{ENGINE} query failed: {}",
            body.trim()
        )))
    }
}

#[async_trait]
impl EngineDriver for ClickHouseClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::ClickHouse
    }

    async fn run_query(&mut self, sql: &str, collector: &mut ResultCollector) -> Result<()> {
        let response = self.send(sql).await?;
        let mut body = response.bytes_stream();
        let mut decoder = EachRowDecoder::default();

        while let Some(chunk) = body.next().await {
            let chunk =
                chunk.map_err(|e| BridgeError::query(format!("{ENGINE} query failed: {e}")))?;
            decoder.feed(&chunk)?;
            if let Some(batch) = decoder.take_batch() {
                debug!("Received ClickHouse batch of {} rows", batch.row_count());
                collector.push_batch(&batch);
            }
        }
        decoder.finish()?;
        if let Some(batch) = decoder.take_batch() {
            collector.push_batch(&batch);
        }
        Ok(())
    }

    async fn run_statement(&mut self, sql: &str) -> Result<()> {
        let response = self.send(sql).await?;
        // drain so a mid-stream exception still surfaces
        let mut decoder = EachRowDecoder::default();
        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::query(format!("{ENGINE} query failed: {e}")))?;
        decoder.feed(&body)?;
        decoder.finish()
    }

    async fn begin(&mut self) -> Result<()> {
        self.run_statement("BEGIN TRANSACTION").await
    }

    async fn close(&mut self) -> Result<()> {
        // the server expires the session after its session_timeout
        self.closed = true;
        Ok(())
    }
}

fn map_connection_error(error: &reqwest::Error, host: &str, port: u16) -> BridgeError {
    if error.is_connect() {
        BridgeError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error.is_timeout() {
        BridgeError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        BridgeError::connection(format!("{ENGINE} connection failed: {error}"))
    }
}
