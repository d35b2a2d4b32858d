//! Query cursor and row access.
//!
//! The query module is organized into:
//! - `cursor` - chunk-fetching cursor over one prepared statement
//! - `row` - borrowed view of the current row
//!
//! Both are driven by [`crate::Session`]; see `new_query`, `execute`,
//! `next_row` and `finish_query` there.

pub mod cursor;
pub mod row;

pub use cursor::{Column, CursorPhase};
pub use row::Row;

pub(crate) use cursor::Cursor;
