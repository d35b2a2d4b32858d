//! Column types and row values.

mod mapping;
mod value;

pub use mapping::{decode_value, encode_value, ColumnType};
pub use value::{FromValue, Value};
