//! Error types for qbridge.
//!
//! Defines the main error enum used throughout the crate, plus the per-cell
//! decode error that never leaves the result collector.

use thiserror::Error;

/// Main error type for qbridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Database connection errors (host unreachable, auth failed, not connected, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, constraint violations, timeouts, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Transaction misuse (double begin, commit or rollback while idle).
    ///
    /// Never tears down the connection.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A statement inside a batch failed; the whole batch was rolled back.
    #[error("Batch error: {0}")]
    Batch(String),

    /// Configuration errors (invalid config file, bad connection string, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (runtime construction failures, unexpected states, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a transaction state error with the given message.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Creates a batch failure with the given message.
    pub fn batch(msg: impl Into<String>) -> Self {
        Self::Batch(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Transaction(_) => "Transaction Error",
            Self::Batch(_) => "Batch Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failure to decode a single cell.
///
/// Recovered locally into a sentinel [`Value`](crate::db::Value); callers never see it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct DecodeError(pub String);

impl DecodeError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<sqlx::Error> for DecodeError {
    fn from(e: sqlx::Error) -> Self {
        Self(e.to_string())
    }
}
