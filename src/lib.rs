//! # sqlink-rs
//!
//! Blocking client session for a remote SQL query service.
//!
//! A [`Session`] connects and authenticates, runs direct statements, and
//! iterates query results row by row through a server-side cursor. Each call
//! blocks until the service answers; the WebSocket transport underneath runs
//! on a runtime owned by the session.
//!
//! ## Example
//!
//! ```no_run
//! # use sqlink_rs::*;
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! sqlink_rs::driver::init();
//!
//! let mut session = Session::new()?;
//! session.connect("127.0.0.1", 5000, false, "sqream", "sqream", "master", "sqream")?;
//!
//! session.execute_direct("CREATE TABLE t (x INT)")?;
//! session.execute_direct("INSERT INTO t VALUES (5),(6),(7),(8)")?;
//!
//! session.new_query("SELECT * FROM t")?;
//! session.execute()?;
//! while session.next_row()? {
//!     let x: i32 = session.get(0)?;
//!     println!("x = {}", x);
//! }
//! session.finish_query()?;
//!
//! session.disconnect()?;
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod connection;
pub mod driver;
pub mod error;
pub mod query;
pub mod transport;
pub mod types;

// Re-export public API
pub use connection::{ConnectionBuilder, ConnectionParams, Session, SessionState};
pub use driver::Driver;
pub use error::{
    ConnectionError, ConversionError, ErrorKind, ExecutionError, SessionError, TransportError,
};
pub use query::{Column, Row};
pub use types::{ColumnType, FromValue, Value};
