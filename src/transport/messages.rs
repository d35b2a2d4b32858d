//! JSON message types exchanged with the service.
//!
//! Every request carries a `command` field. Every response has the shape
//! `{"status": "ok" | "error", "responseData": {...}, "exception": {...}}`.
//! Request and response types derive both serde directions so that test
//! servers can reuse them.

use crate::error::TransportError;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Protocol version sent with the login request.
pub const PROTOCOL_VERSION: i32 = 1;

/// Login request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Command name
    pub command: String,
    /// Protocol version
    pub protocol_version: i32,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Database to attach to
    pub database: String,
    /// Service (worker pool) to run statements on
    pub service: String,
    /// Client name for session identification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Client version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    /// Extra session attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl LoginRequest {
    /// Create a new login request.
    pub fn new(username: String, password: String, database: String, service: String) -> Self {
        Self {
            command: "login".to_string(),
            protocol_version: PROTOCOL_VERSION,
            username,
            password,
            database,
            service,
            client_name: None,
            client_version: None,
            attributes: HashMap::new(),
        }
    }

    /// Set client information.
    pub fn with_client_info(mut self, name: String, version: String) -> Self {
        self.client_name = Some(name);
        self.client_version = Some(version);
        self
    }

    /// Set session attributes.
    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Login response data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponseData {
    /// Connection ID assigned by the server
    pub connection_id: u64,
    /// Protocol version accepted
    pub protocol_version: i32,
    /// Server version string
    pub server_version: String,
    /// Database the session is attached to
    pub database_name: String,
    /// Service the session runs on
    pub service_name: String,
}

/// Prepare statement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareRequest {
    /// Command name
    pub command: String,
    /// SQL text to prepare
    pub sql_text: String,
    /// Rows per fetch the client intends to request
    pub fetch_size: usize,
}

impl PrepareRequest {
    /// Create a new prepare request.
    pub fn new(sql: String, fetch_size: usize) -> Self {
        Self {
            command: "prepareStatement".to_string(),
            sql_text: sql,
            fetch_size,
        }
    }
}

/// Prepare statement response data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareResponseData {
    /// Server-side statement ID
    pub statement_id: u64,
    /// Output columns; empty for statements without a result set
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Wire type name (e.g. `ftInt`)
    #[serde(rename = "type")]
    pub type_name: String,
    /// Whether the column may hold NULL
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

/// Request carrying only a command and a statement ID.
///
/// Used for `execute`, `closeStatement` and, with `max_rows`, `fetch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementRequest {
    /// Command name
    pub command: String,
    /// Server-side statement ID
    pub statement_id: u64,
    /// Maximum rows to return (fetch only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,
}

impl StatementRequest {
    /// Create an execute request.
    pub fn execute(statement_id: u64) -> Self {
        Self {
            command: "execute".to_string(),
            statement_id,
            max_rows: None,
        }
    }

    /// Create a fetch request.
    pub fn fetch(statement_id: u64, max_rows: usize) -> Self {
        Self {
            command: "fetch".to_string(),
            statement_id,
            max_rows: Some(max_rows),
        }
    }

    /// Create a close statement request.
    pub fn close(statement_id: u64) -> Self {
        Self {
            command: "closeStatement".to_string(),
            statement_id,
            max_rows: None,
        }
    }
}

/// Execute response data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponseData {
    /// Affected rows for DML, if the server reports it
    pub row_count: Option<i64>,
}

/// Fetch response data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponseData {
    /// Number of rows in this message; zero marks end of results
    pub num_rows: usize,
    /// Column-major on the wire, row-major after deserialization
    #[serde(
        default,
        deserialize_with = "super::deserialize::to_row_major",
        serialize_with = "super::deserialize::to_column_major"
    )]
    pub data: Vec<Vec<serde_json::Value>>,
}

/// Disconnect request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectRequest {
    /// Command name
    pub command: String,
}

impl Default for DisconnectRequest {
    fn default() -> Self {
        Self {
            command: "disconnect".to_string(),
        }
    }
}

/// Exception information from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfo {
    /// SQL code
    pub sql_code: Option<String>,
    /// Error message
    pub text: String,
}

/// Response envelope shared by all commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response<T> {
    /// `"ok"` or `"error"`
    pub status: String,
    /// Command-specific payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_data: Option<T>,
    /// Exception information if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
}

/// Response without a payload.
pub type EmptyResponse = Response<IgnoredAny>;

impl<T> Response<T> {
    /// Successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            status: "ok".to_string(),
            response_data: Some(data),
            exception: None,
        }
    }

    /// Error response.
    pub fn error(text: impl Into<String>, sql_code: Option<String>) -> Self {
        Self {
            status: "error".to_string(),
            response_data: None,
            exception: Some(ExceptionInfo {
                sql_code,
                text: text.into(),
            }),
        }
    }

    /// Check the status, returning the payload if there is one.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Rejected` for an error status.
    pub fn into_result(self) -> Result<Option<T>, TransportError> {
        if self.status == "ok" {
            return Ok(self.response_data);
        }

        let (message, sql_code) = match self.exception {
            Some(e) => (e.text, e.sql_code),
            None => (format!("Server returned status '{}'", self.status), None),
        };
        Err(TransportError::Rejected { message, sql_code })
    }

    /// Like [`Response::into_result`] but the payload is mandatory.
    pub fn into_data(self) -> Result<T, TransportError> {
        self.into_result()?
            .ok_or_else(|| TransportError::InvalidResponse("Missing response data".to_string()))
    }
}

/// Session information returned after successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Connection ID
    pub connection_id: u64,
    /// Protocol version
    pub protocol_version: i32,
    /// Server version
    pub server_version: String,
    /// Database name
    pub database_name: String,
    /// Service name
    pub service_name: String,
}

impl From<LoginResponseData> for SessionInfo {
    fn from(data: LoginResponseData) -> Self {
        Self {
            connection_id: data.connection_id,
            protocol_version: data.protocol_version,
            server_version: data.server_version,
            database_name: data.database_name,
            service_name: data.service_name,
        }
    }
}

/// Server-side statement handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementHandle(pub u64);

impl StatementHandle {
    /// Create a new statement handle.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw handle value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A statement prepared on the server.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    /// Handle for execute/fetch/close
    pub handle: StatementHandle,
    /// Output columns
    pub columns: Vec<ColumnInfo>,
}

/// One chunk of fetched rows, row-major.
#[derive(Debug, Clone, Default)]
pub struct RowChunk {
    /// Raw rows
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RowChunk {
    /// Check if this chunk marks the end of results.
    pub fn is_end(&self) -> bool {
        self.rows.is_empty()
    }
}
