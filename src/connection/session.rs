//! Blocking client session.
//!
//! A [`Session`] owns one connection to the service and walks the
//! lifecycle
//!
//! ```text
//! Disconnected --connect--> Connected --new_query/execute--> QueryActive
//!      ^                      |   ^                              |
//!      +------disconnect------+   +---------finish_query---------+
//! ```
//!
//! Every call blocks until the service answers or the configured timeout
//! fires. A transport failure tears the connection down and leaves the
//! session `Disconnected`; a statement rejected by the service leaves it
//! where it was.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, ExecutionError, SessionError, TransportError};
use crate::query::{Column, Cursor, CursorPhase, Row};
use crate::transport::{
    PreparedStatement, SessionInfo, StatementHandle, TransportProtocol, WebSocketTransport,
};
use crate::types::{ColumnType, FromValue, Value};

use super::params::{ConnectionBuilder, ConnectionParams, DEFAULT_FETCH_SIZE};

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(300);

// Upper bound on logout while tearing down a broken connection.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection
    Disconnected,
    /// Connected and authenticated, no query open
    Connected,
    /// A query cursor is open
    QueryActive,
}

impl SessionState {
    /// Check if the session holds a connection.
    pub fn is_connected(&self) -> bool {
        !matches!(self, SessionState::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::QueryActive => write!(f, "query active"),
        }
    }
}

/// A single client session with the service.
///
/// # Example
///
/// ```no_run
/// use sqlink_rs::{ColumnType, Session};
///
/// # fn main() -> Result<(), sqlink_rs::SessionError> {
/// let mut session = Session::new()?;
/// session.connect("127.0.0.1", 5000, false, "sqream", "sqream", "master", "sqream")?;
///
/// session.execute_direct("CREATE TABLE t (x INT)")?;
/// session.execute_direct("INSERT INTO t VALUES (5),(6),(7),(8)")?;
///
/// session.new_query("SELECT * FROM t")?;
/// session.execute()?;
/// while session.next_row()? {
///     println!("{}", session.get_column(0, ColumnType::Int)?);
/// }
/// session.finish_query()?;
/// session.disconnect()?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    runtime: Runtime,
    transport: Box<dyn TransportProtocol>,
    state: SessionState,
    params: Option<ConnectionParams>,
    info: Option<SessionInfo>,
    cursor: Option<Cursor>,
    query_count: u64,
}

impl Session {
    /// Create a disconnected session using the WebSocket transport.
    ///
    /// # Errors
    /// Returns `ConnectionError::Runtime` if the I/O runtime cannot start.
    pub fn new() -> Result<Self, SessionError> {
        Self::with_transport(Box::new(WebSocketTransport::new()))
    }

    /// Create a disconnected session over a custom transport.
    pub fn with_transport(transport: Box<dyn TransportProtocol>) -> Result<Self, SessionError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ConnectionError::Runtime(e.to_string()))?;

        Ok(Self {
            runtime,
            transport,
            state: SessionState::Disconnected,
            params: None,
            info: None,
            cursor: None,
            query_count: 0,
        })
    }

    /// Connect and log in.
    ///
    /// # Errors
    /// `InvalidState` unless disconnected; `ConnectionError` if the service
    /// cannot be reached or refuses the login.
    #[allow(clippy::too_many_arguments)]
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        use_tls: bool,
        username: &str,
        password: &str,
        database: &str,
        service: &str,
    ) -> Result<(), SessionError> {
        let params = ConnectionBuilder::new()
            .host(host)
            .port(port)
            .use_tls(use_tls)
            .username(username)
            .password(password)
            .database(database)
            .service(service)
            .build()?;

        self.connect_with(params)
    }

    /// Connect using a `sqlink://` connection string.
    pub fn connect_str(&mut self, connection_string: &str) -> Result<(), SessionError> {
        let params = ConnectionParams::from_str(connection_string)?;
        self.connect_with(params)
    }

    /// Connect using prepared parameters.
    pub fn connect_with(&mut self, params: ConnectionParams) -> Result<(), SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(self.invalid_state("connect"));
        }

        info!(
            host = %params.host,
            port = params.port,
            tls = params.use_tls,
            database = %params.database,
            service = %params.service,
            "connecting"
        );

        let deadline = Instant::now() + params.connection_timeout;
        let transport_params = params.transport_params();

        let opened = block_on_timeout(
            &self.runtime,
            params.connection_timeout,
            self.transport.connect(&transport_params),
        );
        if let Err(e) = opened {
            self.reset_transport();
            return Err(match e {
                TransportError::Timeout { timeout_ms } => ConnectionError::Timeout { timeout_ms },
                TransportError::TlsError(msg) => ConnectionError::TlsError(msg),
                other => ConnectionError::ConnectionFailed {
                    host: params.host.clone(),
                    port: params.port,
                    message: other.to_string(),
                },
            }
            .into());
        }

        let credentials = params.credentials();
        let target = params.login_target();
        let remaining = deadline.saturating_duration_since(Instant::now());
        let login = block_on_timeout(
            &self.runtime,
            remaining,
            self.transport.authenticate(&credentials, &target),
        );

        let info = match login {
            Ok(info) => info,
            Err(e) => {
                self.reset_transport();
                return Err(match e {
                    TransportError::Rejected { message, sql_code } => {
                        let message = match sql_code {
                            Some(code) => format!("{} (SQL code: {})", message, code),
                            None => message,
                        };
                        ConnectionError::AuthenticationFailed(message)
                    }
                    other => ConnectionError::from(other),
                }
                .into());
            }
        };

        info!(
            connection_id = info.connection_id,
            server_version = %info.server_version,
            "connected"
        );

        self.info = Some(info);
        self.params = Some(params);
        self.transition(SessionState::Connected);
        Ok(())
    }

    /// Run a statement that produces no result rows.
    ///
    /// # Errors
    /// `InvalidState` unless connected; `ExecutionError` if the service
    /// rejects the statement, in which case the session stays connected.
    pub fn execute_direct(&mut self, sql: &str) -> Result<(), SessionError> {
        self.require(SessionState::Connected, "execute a statement")?;
        debug!(sql_len = sql.len(), "direct execution");

        let handle = self.prepare(sql)?.handle;

        let limit = self.query_timeout();
        let result = block_on_timeout(&self.runtime, limit, self.transport.execute(handle));
        match self.check(result) {
            Ok(affected) => {
                self.query_count += 1;
                debug!(?affected, "statement executed");
                self.close_statement(handle)
            }
            Err(e) => {
                self.discard_statement(handle);
                Err(e)
            }
        }
    }

    /// Prepare a query and open a cursor for it.
    ///
    /// The statement does not run until [`Session::execute`].
    pub fn new_query(&mut self, sql: &str) -> Result<(), SessionError> {
        self.require(SessionState::Connected, "start a query")?;
        debug!(sql_len = sql.len(), "new query");

        let prepared = self.prepare(sql)?;
        let handle = prepared.handle;

        match Cursor::new(prepared) {
            Ok(cursor) => {
                self.cursor = Some(cursor);
                self.transition(SessionState::QueryActive);
                Ok(())
            }
            Err(e) => {
                self.discard_statement(handle);
                Err(e.into())
            }
        }
    }

    /// Run the query opened by [`Session::new_query`].
    ///
    /// On failure the cursor is closed and the session returns to
    /// `Connected`.
    pub fn execute(&mut self) -> Result<(), SessionError> {
        let handle = {
            let cursor = self.cursor_in(CursorPhase::Prepared, "execute a query")?;
            cursor.handle()
        };

        let limit = self.query_timeout();
        let result = block_on_timeout(&self.runtime, limit, self.transport.execute(handle));
        match self.check(result) {
            Ok(affected) => {
                if let Some(cursor) = self.cursor.as_mut() {
                    cursor.start(affected);
                }
                self.query_count += 1;
                Ok(())
            }
            Err(e) => {
                if self.cursor.take().is_some() {
                    self.discard_statement(handle);
                    self.transition(SessionState::Connected);
                }
                Err(e)
            }
        }
    }

    /// Advance to the next row.
    ///
    /// # Returns
    /// `true` when a row is positioned, `false` once the results are
    /// exhausted.
    ///
    /// # Errors
    /// `Conversion` if a fetched chunk cannot be decoded. The query stays
    /// open and every later call returns the same error until
    /// [`Session::finish_query`].
    pub fn next_row(&mut self) -> Result<bool, SessionError> {
        let phase = self.active_cursor("fetch a row")?.phase();
        if phase == CursorPhase::Prepared {
            return Err(SessionError::InvalidState {
                operation: "fetch a row",
                state: format!("{} ({})", self.state, phase),
            });
        }

        let (limit, fetch_size) = (self.query_timeout(), self.fetch_size());
        loop {
            let handle = {
                let cursor = self.active_cursor("fetch a row")?;
                cursor.check()?;
                if cursor.advance() {
                    return Ok(true);
                }
                if !cursor.needs_fetch() {
                    return Ok(false);
                }
                cursor.handle()
            };

            let result = block_on_timeout(
                &self.runtime,
                limit,
                self.transport.fetch(handle, fetch_size),
            );
            let chunk = self.check(result)?;
            debug!(rows = chunk.rows.len(), "fetched chunk");

            self.active_cursor("fetch a row")?.load_chunk(chunk)?;
        }
    }

    /// The row the cursor is positioned on.
    ///
    /// # Errors
    /// `InvalidState` if no row is positioned.
    pub fn row(&self) -> Result<Row<'_>, SessionError> {
        let cursor = match (&self.cursor, self.state) {
            (Some(cursor), SessionState::QueryActive) => cursor,
            _ => return Err(self.invalid_state("read a column")),
        };
        match cursor.current() {
            Some(values) => Ok(Row::new(cursor.columns(), values)),
            None => Err(SessionError::InvalidState {
                operation: "read a column",
                state: format!("{} ({}, no row positioned)", self.state, cursor.phase()),
            }),
        }
    }

    /// Read column `index` of the current row as its declared type.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index, `TypeMismatch` if `expected`
    /// differs from the declared column type.
    pub fn get_column(&self, index: usize, expected: ColumnType) -> Result<Value, SessionError> {
        self.row()?.get_column(index, expected).cloned()
    }

    /// Read column `index` of the current row as a Rust type.
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T, SessionError> {
        self.row()?.get(index)
    }

    /// Read a BOOL column of the current row.
    pub fn get_bool(&self, index: usize) -> Result<bool, SessionError> {
        self.get(index)
    }

    /// Read an INT column of the current row.
    pub fn get_int(&self, index: usize) -> Result<i32, SessionError> {
        self.get(index)
    }

    /// Read a BIGINT column of the current row.
    pub fn get_bigint(&self, index: usize) -> Result<i64, SessionError> {
        self.get(index)
    }

    /// Read a DOUBLE column of the current row.
    pub fn get_double(&self, index: usize) -> Result<f64, SessionError> {
        self.get(index)
    }

    /// Read a VARCHAR or TEXT column of the current row.
    pub fn get_string(&self, index: usize) -> Result<String, SessionError> {
        self.get(index)
    }

    /// Check if column `index` of the current row is NULL.
    pub fn is_null(&self, index: usize) -> Result<bool, SessionError> {
        self.row()?.is_null(index)
    }

    /// Result columns of the open query.
    pub fn columns(&self) -> Result<&[Column], SessionError> {
        match (&self.cursor, self.state) {
            (Some(cursor), SessionState::QueryActive) => Ok(cursor.columns()),
            _ => Err(self.invalid_state("describe columns")),
        }
    }

    /// Row count reported by the service for the executed query, if any.
    pub fn affected_rows(&self) -> Option<i64> {
        self.cursor.as_ref().and_then(|c| c.affected_rows())
    }

    /// Close the open query and return to `Connected`.
    ///
    /// The cursor is discarded even when the service fails to close the
    /// statement.
    pub fn finish_query(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::QueryActive, "finish a query")?;

        let Some(cursor) = self.cursor.take() else {
            self.transition(SessionState::Connected);
            return Ok(());
        };
        self.transition(SessionState::Connected);
        self.close_statement(cursor.handle())
    }

    /// Log out and close the connection.
    ///
    /// Idempotent: a disconnected session returns `Ok(())`. The session
    /// ends up `Disconnected` even if the logout exchange fails.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Disconnected {
            return Ok(());
        }

        if let Some(cursor) = self.cursor.take() {
            self.discard_statement(cursor.handle());
        }

        let limit = self.query_timeout();
        let result = block_on_timeout(&self.runtime, limit, self.transport.close());

        self.info = None;
        self.params = None;
        self.transition(SessionState::Disconnected);
        info!("disconnected");

        result.map_err(map_transport_error)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if the session holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected() && self.transport.is_connected()
    }

    /// Server details from the login exchange.
    pub fn session_info(&self) -> Option<&SessionInfo> {
        self.info.as_ref()
    }

    /// Parameters of the current connection.
    pub fn params(&self) -> Option<&ConnectionParams> {
        self.params.as_ref()
    }

    /// Number of statements run on this session.
    pub fn query_count(&self) -> u64 {
        self.query_count
    }

    fn query_timeout(&self) -> Duration {
        self.params
            .as_ref()
            .map_or(DEFAULT_QUERY_TIMEOUT, |p| p.query_timeout)
    }

    fn fetch_size(&self) -> usize {
        self.params
            .as_ref()
            .map_or(DEFAULT_FETCH_SIZE, |p| p.fetch_size)
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "session state");
            self.state = next;
        }
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    fn require(&self, state: SessionState, operation: &'static str) -> Result<(), SessionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn active_cursor(&mut self, operation: &'static str) -> Result<&mut Cursor, SessionError> {
        match (self.state, self.cursor.as_mut()) {
            (SessionState::QueryActive, Some(cursor)) => Ok(cursor),
            (state, _) => Err(SessionError::InvalidState {
                operation,
                state: state.to_string(),
            }),
        }
    }

    fn cursor_in(
        &mut self,
        phase: CursorPhase,
        operation: &'static str,
    ) -> Result<&mut Cursor, SessionError> {
        let state = self.state;
        let cursor = self.active_cursor(operation)?;
        if cursor.phase() != phase {
            return Err(SessionError::InvalidState {
                operation,
                state: format!("{} ({})", state, cursor.phase()),
            });
        }
        Ok(cursor)
    }

    fn prepare(&mut self, sql: &str) -> Result<PreparedStatement, SessionError> {
        let (limit, fetch_size) = (self.query_timeout(), self.fetch_size());
        let result = block_on_timeout(
            &self.runtime,
            limit,
            self.transport.prepare(sql, fetch_size),
        );
        self.check(result)
    }

    fn close_statement(&mut self, handle: StatementHandle) -> Result<(), SessionError> {
        let limit = self.query_timeout();
        let result = block_on_timeout(&self.runtime, limit, self.transport.close_statement(handle));
        self.check(result)
    }

    /// Best-effort close used on error paths.
    fn discard_statement(&mut self, handle: StatementHandle) {
        if self.state == SessionState::Disconnected {
            return;
        }
        if let Err(e) = self.close_statement(handle) {
            warn!(statement = handle.as_u64(), error = %e, "failed to close statement");
        }
    }

    /// Map a transport result; anything but a rejection kills the connection.
    fn check<T>(&mut self, result: Result<T, TransportError>) -> Result<T, SessionError> {
        match result {
            Ok(value) => Ok(value),
            Err(TransportError::Rejected { message, sql_code }) => {
                Err(ExecutionError::Rejected { message, sql_code }.into())
            }
            Err(e) => {
                warn!(error = %e, "connection failed, tearing down session");
                self.teardown();
                Err(ConnectionError::from(e).into())
            }
        }
    }

    fn teardown(&mut self) {
        self.cursor = None;
        self.info = None;
        self.params = None;
        self.reset_transport();
        self.transition(SessionState::Disconnected);
    }

    fn reset_transport(&mut self) {
        let result = block_on_timeout(&self.runtime, TEARDOWN_TIMEOUT, self.transport.close());
        if let Err(e) = result {
            debug!(error = %e, "transport close after failure");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("params", &self.params)
            .field("info", &self.info)
            .field("cursor", &self.cursor.as_ref().map(|c| c.phase()))
            .field("query_count", &self.query_count)
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Disconnected {
            if let Err(e) = self.disconnect() {
                warn!(error = %e, "disconnect on drop failed");
            }
        }
    }
}

fn map_transport_error(err: TransportError) -> SessionError {
    match err {
        TransportError::Rejected { message, sql_code } => {
            ExecutionError::Rejected { message, sql_code }.into()
        }
        other => ConnectionError::from(other).into(),
    }
}

/// Drive `future` to completion on the session runtime, bounded by `limit`.
fn block_on_timeout<F, T>(runtime: &Runtime, limit: Duration, future: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    runtime.block_on(async {
        match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                timeout_ms: limit.as_millis() as u64,
            }),
        }
    })
}
