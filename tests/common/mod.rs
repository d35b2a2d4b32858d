//! Common test utilities for sqlink-rs integration tests.
//!
//! # In-process server
//!
//! [`TestServer`] speaks the client's WebSocket protocol on a random local
//! port and keeps tables in memory. It understands just enough SQL for the
//! tests:
//!
//! - `CREATE TABLE name (col type, ...)`
//! - `INSERT INTO name VALUES (...), (...)`
//! - `SELECT * FROM name`
//! - `DROP TABLE name`
//!
//! Anything else is rejected with a syntax error. Each server runs on its
//! own thread with its own runtime, so tests stay plain `#[test]` functions
//! driving the blocking session.
//!
//! # Live server
//!
//! Tests marked `#[ignore]` run against a real service configured through
//! environment variables:
//!
//! | Variable          | Default     |
//! |-------------------|-------------|
//! | `SQLINK_HOST`     | "localhost" |
//! | `SQLINK_PORT`     | 5000        |
//! | `SQLINK_USER`     | "sqream"    |
//! | `SQLINK_PASSWORD` | "sqream"    |
//!
//! ```bash
//! cargo test --test integration_tests -- --ignored
//! ```

#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::net::{SocketAddr, TcpStream as StdTcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use regex::Regex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use sqlink_rs::transport::messages::{
    ColumnInfo, ExecuteResponseData, FetchResponseData, LoginRequest, LoginResponseData,
    PrepareRequest, PrepareResponseData, Response, StatementRequest, PROTOCOL_VERSION,
};
use sqlink_rs::types::ColumnType;
use sqlink_rs::Session;

// ============================================================================
// Credentials accepted by the test server
// ============================================================================

pub const TEST_USER: &str = "sqream";
pub const TEST_PASSWORD: &str = "sqream";

// ============================================================================
// In-process server
// ============================================================================

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct ServerState {
    tables: HashMap<String, Table>,
    commands: Vec<String>,
    drop_on_fetch: bool,
    connections: u64,
}

type Shared = Arc<Mutex<ServerState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, ServerState> {
    shared.lock().expect("server state poisoned")
}

/// WebSocket server with in-memory tables.
pub struct TestServer {
    addr: SocketAddr,
    shared: Shared,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a server on a random local port.
    pub fn start() -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind test server");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("local addr");

        let shared: Shared = Arc::default();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("test server runtime");
            runtime.block_on(async move {
                let listener = TcpListener::from_std(listener).expect("tokio listener");
                serve(listener, thread_shared, shutdown_rx).await;
            });
        });

        Self {
            addr,
            shared,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Connection string with the accepted credentials.
    pub fn connection_string(&self) -> String {
        format!(
            "sqlink://{}:{}@{}:{}",
            TEST_USER,
            TEST_PASSWORD,
            self.host(),
            self.port()
        )
    }

    /// A session already connected to this server.
    pub fn connect(&self) -> Session {
        self.connect_with_query("")
    }

    /// A connected session; `query` is appended to the connection string.
    pub fn connect_with_query(&self, query: &str) -> Session {
        let mut session = Session::new().expect("session");
        let conn_str = if query.is_empty() {
            self.connection_string()
        } else {
            format!("{}?{}", self.connection_string(), query)
        };
        session.connect_str(&conn_str).expect("connect to test server");
        session
    }

    /// Make the next fetch drop the socket without answering.
    pub fn drop_connection_on_fetch(&self, enabled: bool) {
        lock(&self.shared).drop_on_fetch = enabled;
    }

    /// Commands received so far, across connections.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.shared).commands.clone()
    }

    pub fn count_commands(&self, command: &str) -> usize {
        lock(&self.shared)
            .commands
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    /// Row count of a stored table.
    pub fn table_rows(&self, name: &str) -> Option<usize> {
        lock(&self.shared)
            .tables
            .get(&name.to_lowercase())
            .map(|t| t.rows.len())
    }

    /// Accepted logins so far.
    pub fn connections(&self) -> u64 {
        lock(&self.shared).connections
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn serve(listener: TcpListener, shared: Shared, mut shutdown: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                if let Ok((stream, _)) = accepted {
                    tokio::spawn(handle_connection(stream, Arc::clone(&shared)));
                }
            }
        }
    }
}

struct Statement {
    plan: Plan,
    result: Option<Vec<Vec<Value>>>,
    position: usize,
}

#[derive(Default)]
struct Connection {
    authenticated: bool,
    next_id: u64,
    statements: HashMap<u64, Statement>,
}

type Rejection = (String, &'static str);

fn reject(message: impl Into<String>, code: &'static str) -> Rejection {
    (message.into(), code)
}

async fn handle_connection(stream: TcpStream, shared: Shared) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    let mut conn = Connection::default();

    while let Some(Ok(message)) = ws.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            break;
        };
        let command = request["command"].as_str().unwrap_or_default().to_string();

        {
            let mut state = lock(&shared);
            state.commands.push(command.clone());
            if command == "fetch" && state.drop_on_fetch {
                // hang up without a close frame
                return;
            }
        }

        let outcome = conn.handle(&command, request, &shared);
        let reply = match outcome {
            Ok(data) => serde_json::to_string(&Response::ok(data)),
            Err((message, code)) => {
                serde_json::to_string(&Response::<Value>::error(message, Some(code.to_string())))
            }
        }
        .expect("serialize reply");

        if ws.send(Message::text(reply)).await.is_err() {
            break;
        }
        if command == "disconnect" {
            let _ = ws.close(None).await;
            break;
        }
    }
}

impl Connection {
    fn handle(&mut self, command: &str, request: Value, shared: &Shared) -> Result<Value, Rejection> {
        if command != "login" && !self.authenticated {
            return Err(reject("Not logged in", "08003"));
        }

        match command {
            "login" => self.login(request, shared),
            "prepareStatement" => {
                let request: PrepareRequest =
                    serde_json::from_value(request).map_err(|e| reject(e.to_string(), "08P01"))?;
                self.prepare(&request.sql_text, shared)
            }
            "execute" => {
                let id = statement_id(request)?;
                self.execute(id, shared)
            }
            "fetch" => {
                let request: StatementRequest =
                    serde_json::from_value(request).map_err(|e| reject(e.to_string(), "08P01"))?;
                self.fetch(request.statement_id, request.max_rows.unwrap_or(usize::MAX))
            }
            "closeStatement" => {
                let id = statement_id(request)?;
                self.statements
                    .remove(&id)
                    .map(|_| json!({}))
                    .ok_or_else(|| reject(format!("Unknown statement {}", id), "26000"))
            }
            "disconnect" => {
                self.authenticated = false;
                Ok(json!({}))
            }
            other => Err(reject(format!("Unknown command '{}'", other), "08P01")),
        }
    }

    fn login(&mut self, request: Value, shared: &Shared) -> Result<Value, Rejection> {
        let login: LoginRequest =
            serde_json::from_value(request).map_err(|e| reject(e.to_string(), "08P01"))?;

        if login.username != TEST_USER || login.password != TEST_PASSWORD {
            return Err(reject("Authentication failed for user", "28000"));
        }

        let connection_id = {
            let mut state = lock(shared);
            state.connections += 1;
            state.connections
        };
        self.authenticated = true;

        Ok(serde_json::to_value(LoginResponseData {
            connection_id,
            protocol_version: PROTOCOL_VERSION,
            server_version: "test-server 1.0".to_string(),
            database_name: login.database,
            service_name: login.service,
        })
        .expect("login data"))
    }

    fn prepare(&mut self, sql: &str, shared: &Shared) -> Result<Value, Rejection> {
        let plan = Plan::parse(sql)?;

        let columns = {
            let state = lock(shared);
            match &plan {
                Plan::Select { table } => state
                    .tables
                    .get(table)
                    .map(|t| t.columns.clone())
                    .ok_or_else(|| reject(format!("Table '{}' does not exist", table), "42P01"))?,
                Plan::Insert { table, rows } => {
                    let target = state.tables.get(table).ok_or_else(|| {
                        reject(format!("Table '{}' does not exist", table), "42P01")
                    })?;
                    if let Some(bad) = rows.iter().find(|r| r.len() != target.columns.len()) {
                        return Err(reject(
                            format!(
                                "Expected {} values, got {}",
                                target.columns.len(),
                                bad.len()
                            ),
                            "21S01",
                        ));
                    }
                    Vec::new()
                }
                Plan::Create { .. } | Plan::Drop { .. } => Vec::new(),
            }
        };

        self.next_id += 1;
        let statement_id = self.next_id;
        self.statements.insert(
            statement_id,
            Statement {
                plan,
                result: None,
                position: 0,
            },
        );

        Ok(serde_json::to_value(PrepareResponseData {
            statement_id,
            columns,
        })
        .expect("prepare data"))
    }

    fn execute(&mut self, id: u64, shared: &Shared) -> Result<Value, Rejection> {
        let statement = self
            .statements
            .get_mut(&id)
            .ok_or_else(|| reject(format!("Unknown statement {}", id), "26000"))?;
        let mut state = lock(shared);

        let row_count = match &statement.plan {
            Plan::Create { table, columns } => {
                if state.tables.contains_key(table) {
                    return Err(reject(format!("Table '{}' already exists", table), "42P07"));
                }
                state.tables.insert(
                    table.clone(),
                    Table {
                        columns: columns.clone(),
                        rows: Vec::new(),
                    },
                );
                None
            }
            Plan::Insert { table, rows } => {
                let target = state
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| reject(format!("Table '{}' does not exist", table), "42P01"))?;
                target.rows.extend(rows.iter().cloned());
                Some(rows.len() as i64)
            }
            Plan::Select { table } => {
                let rows = state
                    .tables
                    .get(table)
                    .map(|t| t.rows.clone())
                    .ok_or_else(|| reject(format!("Table '{}' does not exist", table), "42P01"))?;
                statement.result = Some(rows);
                None
            }
            Plan::Drop { table } => {
                state
                    .tables
                    .remove(table)
                    .ok_or_else(|| reject(format!("Table '{}' does not exist", table), "42P01"))?;
                None
            }
        };

        Ok(serde_json::to_value(ExecuteResponseData { row_count }).expect("execute data"))
    }

    fn fetch(&mut self, id: u64, max_rows: usize) -> Result<Value, Rejection> {
        let statement = self
            .statements
            .get_mut(&id)
            .ok_or_else(|| reject(format!("Unknown statement {}", id), "26000"))?;
        let rows = statement
            .result
            .as_ref()
            .ok_or_else(|| reject("Statement has no result set", "24000"))?;

        let end = statement.position.saturating_add(max_rows).min(rows.len());
        let chunk = rows[statement.position..end].to_vec();
        statement.position = end;

        Ok(serde_json::to_value(FetchResponseData {
            num_rows: chunk.len(),
            data: chunk,
        })
        .expect("fetch data"))
    }
}

fn statement_id(request: Value) -> Result<u64, Rejection> {
    serde_json::from_value::<StatementRequest>(request)
        .map(|r| r.statement_id)
        .map_err(|e| reject(e.to_string(), "08P01"))
}

// ============================================================================
// SQL subset
// ============================================================================

#[derive(Debug, Clone)]
enum Plan {
    Create {
        table: String,
        columns: Vec<ColumnInfo>,
    },
    Insert {
        table: String,
        rows: Vec<Vec<Value>>,
    },
    Select {
        table: String,
    },
    Drop {
        table: String,
    },
}

struct Patterns {
    create: Regex,
    insert: Regex,
    select: Regex,
    drop: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        create: Regex::new(r"(?is)^\s*create\s+table\s+(\w+)\s*\((.*)\)\s*;?\s*$").unwrap(),
        insert: Regex::new(r"(?is)^\s*insert\s+into\s+(\w+)\s+values\s*(.*?)\s*;?\s*$").unwrap(),
        select: Regex::new(r"(?is)^\s*select\s+\*\s+from\s+(\w+)\s*;?\s*$").unwrap(),
        drop: Regex::new(r"(?is)^\s*drop\s+table\s+(\w+)\s*;?\s*$").unwrap(),
    })
}

impl Plan {
    fn parse(sql: &str) -> Result<Self, Rejection> {
        let p = patterns();

        if let Some(caps) = p.create.captures(sql) {
            let columns = split_top_level(&caps[2])
                .iter()
                .map(|def| parse_column(def))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Plan::Create {
                table: caps[1].to_lowercase(),
                columns,
            });
        }
        if let Some(caps) = p.insert.captures(sql) {
            let rows = split_top_level(&caps[2])
                .iter()
                .map(|tuple| parse_tuple(tuple))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Plan::Insert {
                table: caps[1].to_lowercase(),
                rows,
            });
        }
        if let Some(caps) = p.select.captures(sql) {
            return Ok(Plan::Select {
                table: caps[1].to_lowercase(),
            });
        }
        if let Some(caps) = p.drop.captures(sql) {
            return Ok(Plan::Drop {
                table: caps[1].to_lowercase(),
            });
        }

        Err(reject(format!("Syntax error near '{}'", sql.trim()), "42601"))
    }
}

fn parse_column(def: &str) -> Result<ColumnInfo, Rejection> {
    let def = def.trim();
    let (name, rest) = def
        .split_once(char::is_whitespace)
        .ok_or_else(|| reject(format!("Bad column definition '{}'", def), "42601"))?;

    let upper = rest.to_uppercase();
    let nullable = !upper.contains("NOT NULL");
    let type_text = upper.replace("NOT NULL", "").replace("NULL", "");

    let column_type = ColumnType::from_sql_name(type_text.trim())
        .ok_or_else(|| reject(format!("Unknown type '{}'", rest.trim()), "42704"))?;

    Ok(ColumnInfo {
        name: name.to_lowercase(),
        type_name: column_type.wire_name().to_string(),
        nullable,
    })
}

fn parse_tuple(tuple: &str) -> Result<Vec<Value>, Rejection> {
    let inner = tuple
        .trim()
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| reject(format!("Bad VALUES tuple '{}'", tuple), "42601"))?;

    split_top_level(inner)
        .iter()
        .map(|literal| parse_literal(literal))
        .collect()
}

fn parse_literal(literal: &str) -> Result<Value, Rejection> {
    let literal = literal.trim();

    if literal.eq_ignore_ascii_case("null") {
        return Ok(Value::Null);
    }
    if literal.eq_ignore_ascii_case("true") {
        return Ok(Value::Bool(true));
    }
    if literal.eq_ignore_ascii_case("false") {
        return Ok(Value::Bool(false));
    }
    if let Some(text) = literal.strip_prefix('\'').and_then(|l| l.strip_suffix('\'')) {
        return Ok(Value::String(text.replace("''", "'")));
    }
    if let Ok(int) = literal.parse::<i64>() {
        return Ok(json!(int));
    }
    if let Ok(float) = literal.parse::<f64>() {
        return Ok(json!(float));
    }

    Err(reject(format!("Bad literal '{}'", literal), "42601"))
}

/// Split on commas outside parentheses and quotes.
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quoted = false;

    for ch in text.chars() {
        match ch {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }

    parts
}

// ============================================================================
// Live server configuration
// ============================================================================

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5000;

pub fn get_host() -> String {
    env::var("SQLINK_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string())
}

pub fn get_port() -> u16 {
    env::var("SQLINK_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

pub fn get_user() -> String {
    env::var("SQLINK_USER").unwrap_or_else(|_| TEST_USER.to_string())
}

pub fn get_password() -> String {
    env::var("SQLINK_PASSWORD").unwrap_or_else(|_| TEST_PASSWORD.to_string())
}

/// Connection string for the live server.
pub fn get_live_connection_string() -> String {
    format!(
        "sqlink://{}:{}@{}:{}",
        get_user(),
        get_password(),
        get_host(),
        get_port()
    )
}

/// Check if the live server accepts TCP connections.
pub fn is_live_server_available() -> bool {
    let addr = format!("{}:{}", get_host(), get_port());
    addr.to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|addr| StdTcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok())
        .unwrap_or(false)
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}

/// Unique table name for tests sharing a live server.
pub fn unique_table(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}_{}", prefix, nanos)
}

#[test]
fn test_split_top_level() {
    assert_eq!(
        split_top_level("x int, name varchar(20), n numeric(10,2)"),
        vec!["x int", " name varchar(20)", " n numeric(10,2)"]
    );
    assert_eq!(split_top_level("(1,'a,b'),(2,'c')"), vec!["(1,'a,b')", "(2,'c')"]);
}

#[test]
fn test_parse_plan() {
    assert!(matches!(
        Plan::parse("CREATE TABLE t (x int)"),
        Ok(Plan::Create { table, columns }) if table == "t" && columns[0].type_name == "ftInt"
    ));
    assert!(matches!(
        Plan::parse("insert into T values (5),(6)"),
        Ok(Plan::Insert { table, rows }) if table == "t" && rows.len() == 2
    ));
    assert!(Plan::parse("SELEKT 1").is_err());
}
