//! Column type tags and decoding of wire values.

use crate::error::ConversionError;
use crate::types::value::Value;
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Column data type as declared by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// BOOL
    Bool,
    /// TINYINT (unsigned 8-bit)
    TinyInt,
    /// SMALLINT
    SmallInt,
    /// INT
    Int,
    /// BIGINT
    BigInt,
    /// REAL (32-bit float)
    Real,
    /// DOUBLE
    Double,
    /// NUMERIC(p, s), carried as text to keep precision
    Numeric,
    /// VARCHAR(n)
    Varchar,
    /// TEXT / NVARCHAR
    Text,
    /// DATE
    Date,
    /// DATETIME
    DateTime,
}

impl ColumnType {
    /// Parse the type name used in column metadata on the wire.
    ///
    /// # Errors
    /// Returns `ConversionError::UnsupportedType` for unknown names.
    pub fn from_wire(name: &str) -> Result<Self, ConversionError> {
        match name {
            "ftBool" => Ok(Self::Bool),
            "ftUByte" => Ok(Self::TinyInt),
            "ftShort" => Ok(Self::SmallInt),
            "ftInt" => Ok(Self::Int),
            "ftLong" => Ok(Self::BigInt),
            "ftFloat" => Ok(Self::Real),
            "ftDouble" => Ok(Self::Double),
            "ftNumeric" => Ok(Self::Numeric),
            "ftVarchar" => Ok(Self::Varchar),
            "ftBlob" => Ok(Self::Text),
            "ftDate" => Ok(Self::Date),
            "ftDateTime" => Ok(Self::DateTime),
            other => Err(ConversionError::UnsupportedType {
                type_name: other.to_string(),
            }),
        }
    }

    /// Type name used in column metadata on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Bool => "ftBool",
            Self::TinyInt => "ftUByte",
            Self::SmallInt => "ftShort",
            Self::Int => "ftInt",
            Self::BigInt => "ftLong",
            Self::Real => "ftFloat",
            Self::Double => "ftDouble",
            Self::Numeric => "ftNumeric",
            Self::Varchar => "ftVarchar",
            Self::Text => "ftBlob",
            Self::Date => "ftDate",
            Self::DateTime => "ftDateTime",
        }
    }

    /// Parse an SQL type name such as `int` or `VARCHAR(20)`.
    ///
    /// Length, precision and scale arguments are accepted and ignored.
    pub fn from_sql_name(name: &str) -> Option<Self> {
        let base = name
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_uppercase();

        match base.as_str() {
            "BOOL" | "BOOLEAN" => Some(Self::Bool),
            "TINYINT" => Some(Self::TinyInt),
            "SMALLINT" => Some(Self::SmallInt),
            "INT" | "INTEGER" => Some(Self::Int),
            "BIGINT" => Some(Self::BigInt),
            "REAL" | "FLOAT" => Some(Self::Real),
            "DOUBLE" | "DOUBLE PRECISION" => Some(Self::Double),
            "NUMERIC" | "DECIMAL" => Some(Self::Numeric),
            "VARCHAR" => Some(Self::Varchar),
            "TEXT" | "NVARCHAR" => Some(Self::Text),
            "DATE" => Some(Self::Date),
            "DATETIME" | "TIMESTAMP" => Some(Self::DateTime),
            _ => None,
        }
    }

    /// SQL name of the type.
    pub fn sql_name(&self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Int => "INT",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Double => "DOUBLE",
            Self::Numeric => "NUMERIC",
            Self::Varchar => "VARCHAR",
            Self::Text => "TEXT",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
        }
    }

    /// Check if values of this type are character data.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Varchar | Self::Text)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// Decode one JSON cell into a typed value.
///
/// `row` and `column` only feed error messages.
pub fn decode_value(
    raw: &serde_json::Value,
    column_type: ColumnType,
    row: usize,
    column: usize,
) -> Result<Value, ConversionError> {
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let fail = |message: String| ConversionError::ValueConversionFailed {
        row,
        column,
        message,
    };

    let integer = || {
        raw.as_i64()
            .ok_or_else(|| fail(format!("expected integer for {}, got {}", column_type, raw)))
    };

    match column_type {
        ColumnType::Bool => match raw {
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) if n.as_u64() == Some(0) => Ok(Value::Bool(false)),
            serde_json::Value::Number(n) if n.as_u64() == Some(1) => Ok(Value::Bool(true)),
            other => Err(fail(format!("expected boolean, got {}", other))),
        },
        ColumnType::TinyInt => u8::try_from(integer()?)
            .map(Value::TinyInt)
            .map_err(|e| fail(e.to_string())),
        ColumnType::SmallInt => i16::try_from(integer()?)
            .map(Value::SmallInt)
            .map_err(|e| fail(e.to_string())),
        ColumnType::Int => i32::try_from(integer()?)
            .map(Value::Int)
            .map_err(|e| fail(e.to_string())),
        ColumnType::BigInt => integer().map(Value::BigInt),
        ColumnType::Real | ColumnType::Double => {
            let number = raw
                .as_f64()
                .ok_or_else(|| fail(format!("expected number, got {}", raw)))?;
            if column_type == ColumnType::Real {
                Ok(Value::Real(number as f32))
            } else {
                Ok(Value::Double(number))
            }
        }
        ColumnType::Numeric => match raw {
            serde_json::Value::String(s) => Ok(Value::Numeric(s.clone())),
            serde_json::Value::Number(n) => Ok(Value::Numeric(n.to_string())),
            other => Err(fail(format!("expected numeric, got {}", other))),
        },
        ColumnType::Varchar | ColumnType::Text => raw
            .as_str()
            .map(|s| Value::Text(s.to_string()))
            .ok_or_else(|| fail(format!("expected string, got {}", raw))),
        ColumnType::Date => {
            let text = raw
                .as_str()
                .ok_or_else(|| fail(format!("expected date string, got {}", raw)))?;
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| fail(format!("invalid date '{}': {}", text, e)))
        }
        ColumnType::DateTime => {
            let text = raw
                .as_str()
                .ok_or_else(|| fail(format!("expected datetime string, got {}", raw)))?;
            NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
                .map(Value::DateTime)
                .map_err(|e| fail(format!("invalid datetime '{}': {}", text, e)))
        }
    }
}

/// Encode a value in its wire representation.
pub fn encode_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::TinyInt(v) => serde_json::Value::from(*v),
        Value::SmallInt(v) => serde_json::Value::from(*v),
        Value::Int(v) => serde_json::Value::from(*v),
        Value::BigInt(v) => serde_json::Value::from(*v),
        Value::Real(v) => serde_json::Value::from(*v as f64),
        Value::Double(v) => serde_json::Value::from(*v),
        Value::Numeric(s) | Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Date(d) => serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
        Value::DateTime(dt) => {
            serde_json::Value::String(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        }
    }
}
