//! Transport layer for communicating with the service.
//!
//! # Architecture
//!
//! The transport layer is organized into:
//! - `protocol` - Transport protocol trait definition
//! - `messages` - Protocol message types
//! - `deserialize` - Column-major to row-major conversion of fetched data
//! - `websocket` - WebSocket transport implementation
//!
//! The session drives a transport through [`TransportProtocol`]; callers
//! normally never touch this module directly.

pub mod deserialize;
pub mod messages;
pub mod protocol;
pub mod websocket;


// Re-export commonly used types
pub use messages::{ColumnInfo, PreparedStatement, RowChunk, SessionInfo, StatementHandle};
pub use protocol::{LoginTarget, TransportParams, TransportProtocol};
pub use websocket::WebSocketTransport;
