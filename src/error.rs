//! Error types for sqlink-rs.
//!
//! This module defines domain-specific error types organized by functional area.
//! [`SessionError`] is what every public session operation returns; the
//! narrower enums carry the details.

use crate::types::ColumnType;
use std::fmt;
use thiserror::Error;

/// Top-level error type returned by session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Network, authentication or transport failure
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Statement rejected by the remote service
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Operation invoked outside its valid lifecycle state
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// Column accessed with a type other than its declared type
    #[error("Type mismatch for column {index}: requested {expected}, column is {actual}")]
    TypeMismatch {
        index: usize,
        expected: ColumnType,
        actual: ColumnType,
    },

    /// Column index outside the current row
    #[error("Column index {index} out of range (row has {column_count} columns)")]
    IndexOutOfRange { index: usize, column_count: usize },

    /// NULL read through a non-optional accessor
    #[error("Column {index} is NULL")]
    NullValue { index: usize },

    /// Row data from the service could not be decoded
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Errors related to establishing and keeping a connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to establish connection to the service
    #[error("Failed to connect to {host}:{port}: {message}")]
    ConnectionFailed {
        host: String,
        port: u16,
        message: String,
    },

    /// Authentication failure
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid connection parameters
    #[error("Invalid connection parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Connection string parsing error
    #[error("Failed to parse connection string: {0}")]
    ParseError(String),

    /// Request did not complete in time
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection dropped while the session was in use
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// TLS/SSL error
    #[error("TLS error: {0}")]
    TlsError(String),

    /// Failed to set up the blocking runtime
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Errors reported by the remote service for a statement.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The service rejected the statement
    #[error("Statement rejected: {message}{}", code_suffix(.sql_code))]
    Rejected {
        message: String,
        sql_code: Option<String>,
    },
}

fn code_suffix(sql_code: &Option<String>) -> String {
    sql_code
        .as_ref()
        .map(|code| format!(" (SQL code: {})", code))
        .unwrap_or_default()
}

/// Errors decoding values received from the service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// Unknown wire type name
    #[error("Unsupported column type: {type_name}")]
    UnsupportedType { type_name: String },

    /// Failed to convert value
    #[error("Failed to convert value at row {row}, column {column}: {message}")]
    ValueConversionFailed {
        row: usize,
        column: usize,
        message: String,
    },

    /// Row width does not match the column metadata
    #[error("Row {row} has {actual} values, expected {expected}")]
    RowWidthMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// Errors related to the transport protocol.
#[derive(Error, Debug)]
pub enum TransportError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Message serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Invalid response from server
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// Message send error
    #[error("Failed to send message: {0}")]
    SendError(String),

    /// Message receive error
    #[error("Failed to receive message: {0}")]
    ReceiveError(String),

    /// TLS/SSL error
    #[error("TLS error: {0}")]
    TlsError(String),

    /// Request did not complete in time
    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Server answered with an error status
    #[error("Server error: {message}")]
    Rejected {
        message: String,
        sql_code: Option<String>,
    },
}

/// Coarse error classification, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or authentication problem
    Connection = 1,
    /// Statement rejected by the service
    Execution = 2,
    /// Operation called in the wrong state
    InvalidState = 3,
    /// Column read with the wrong type
    TypeMismatch = 4,
    /// Column index out of range
    IndexOutOfRange = 5,
    /// NULL read as a non-optional value
    NullValue = 6,
    /// Undecodable data from the service
    Conversion = 7,
    /// Request timeout
    Timeout = 8,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Connection => write!(f, "CONNECTION"),
            ErrorKind::Execution => write!(f, "EXECUTION"),
            ErrorKind::InvalidState => write!(f, "INVALID_STATE"),
            ErrorKind::TypeMismatch => write!(f, "TYPE_MISMATCH"),
            ErrorKind::IndexOutOfRange => write!(f, "INDEX_OUT_OF_RANGE"),
            ErrorKind::NullValue => write!(f, "NULL_VALUE"),
            ErrorKind::Conversion => write!(f, "CONVERSION"),
            ErrorKind::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

impl SessionError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Connection(ConnectionError::Timeout { .. }) => ErrorKind::Timeout,
            SessionError::Connection(_) => ErrorKind::Connection,
            SessionError::Execution(_) => ErrorKind::Execution,
            SessionError::InvalidState { .. } => ErrorKind::InvalidState,
            SessionError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            SessionError::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            SessionError::NullValue { .. } => ErrorKind::NullValue,
            SessionError::Conversion(_) => ErrorKind::Conversion,
        }
    }

    /// Check if this is an invalid-state error.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, SessionError::InvalidState { .. })
    }
}

impl From<TransportError> for ConnectionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { timeout_ms } => ConnectionError::Timeout { timeout_ms },
            TransportError::TlsError(msg) => ConnectionError::TlsError(msg),
            other => ConnectionError::ConnectionLost(other.to_string()),
        }
    }
}

// Conversions from external error types
impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::SerializationError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocketError(err.to_string())
    }
}

impl From<native_tls::Error> for ConnectionError {
    fn from(err: native_tls::Error) -> Self {
        ConnectionError::TlsError(err.to_string())
    }
}
