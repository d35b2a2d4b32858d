//! Transport protocol abstraction trait.
//!
//! This module defines the `TransportProtocol` trait that abstracts the
//! mechanism used to reach the service. The session drives it; the
//! WebSocket implementation lives in [`super::websocket`].

use crate::connection::auth::Credentials;
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;

use super::messages::{PreparedStatement, RowChunk, SessionInfo, StatementHandle};

/// Parameters for opening the raw connection.
#[derive(Debug, Clone)]
pub struct TransportParams {
    /// Service host
    pub host: String,
    /// Service port
    pub port: u16,
    /// Use TLS/SSL
    pub use_tls: bool,
    /// Validate the server certificate when TLS is on
    pub validate_server_certificate: bool,
}

impl TransportParams {
    /// Create new transport parameters.
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            use_tls: false,
            validate_server_certificate: true,
        }
    }

    /// Set whether to use TLS.
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Set whether to validate the server certificate.
    pub fn with_validate_server_certificate(mut self, validate: bool) -> Self {
        self.validate_server_certificate = validate;
        self
    }

    /// Build the WebSocket URL from parameters.
    pub fn to_websocket_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        if self.host.contains(':') {
            format!("{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

/// Everything the login exchange sends besides the credentials.
#[derive(Debug, Clone, Default)]
pub struct LoginTarget {
    /// Database to attach to
    pub database: String,
    /// Service to run statements on
    pub service: String,
    /// Client name reported to the server
    pub client_name: String,
    /// Client version reported to the server
    pub client_version: String,
    /// Extra session attributes
    pub attributes: HashMap<String, String>,
}

/// Transport protocol trait for talking to the service.
///
/// Implementations perform one request/response exchange per call. A
/// `TransportError::Rejected` means the server refused the request and the
/// connection is still usable; any other error means it is not.
#[async_trait]
pub trait TransportProtocol: Send {
    /// Open the connection.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the connection cannot be established.
    async fn connect(&mut self, params: &TransportParams) -> Result<(), TransportError>;

    /// Log in and attach to a database and service.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Rejected` if the server refuses the login.
    async fn authenticate(
        &mut self,
        credentials: &Credentials,
        target: &LoginTarget,
    ) -> Result<SessionInfo, TransportError>;

    /// Prepare a statement and describe its output columns.
    async fn prepare(
        &mut self,
        sql: &str,
        fetch_size: usize,
    ) -> Result<PreparedStatement, TransportError>;

    /// Run a prepared statement.
    ///
    /// # Returns
    ///
    /// The affected row count when the server reports one.
    async fn execute(&mut self, handle: StatementHandle) -> Result<Option<i64>, TransportError>;

    /// Fetch the next chunk of rows; an empty chunk marks the end.
    async fn fetch(
        &mut self,
        handle: StatementHandle,
        max_rows: usize,
    ) -> Result<RowChunk, TransportError>;

    /// Release a statement on the server.
    async fn close_statement(&mut self, handle: StatementHandle) -> Result<(), TransportError>;

    /// Log out and close the connection.
    ///
    /// The transport is reset even when the logout exchange fails, so it
    /// can be connected again.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the connection is still active.
    fn is_connected(&self) -> bool;
}
