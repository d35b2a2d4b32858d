//! Tagged column values and typed extraction.

use crate::types::ColumnType;
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

/// A single column value of the current row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// BOOL
    Bool(bool),
    /// TINYINT
    TinyInt(u8),
    /// SMALLINT
    SmallInt(i16),
    /// INT
    Int(i32),
    /// BIGINT
    BigInt(i64),
    /// REAL
    Real(f32),
    /// DOUBLE
    Double(f64),
    /// NUMERIC, exact decimal text
    Numeric(String),
    /// VARCHAR or TEXT
    Text(String),
    /// DATE
    Date(NaiveDate),
    /// DATETIME
    DateTime(NaiveDateTime),
}

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Type tag of the value, `None` for NULL.
    ///
    /// Character data reports `Varchar`.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ColumnType::Bool),
            Self::TinyInt(_) => Some(ColumnType::TinyInt),
            Self::SmallInt(_) => Some(ColumnType::SmallInt),
            Self::Int(_) => Some(ColumnType::Int),
            Self::BigInt(_) => Some(ColumnType::BigInt),
            Self::Real(_) => Some(ColumnType::Real),
            Self::Double(_) => Some(ColumnType::Double),
            Self::Numeric(_) => Some(ColumnType::Numeric),
            Self::Text(_) => Some(ColumnType::Varchar),
            Self::Date(_) => Some(ColumnType::Date),
            Self::DateTime(_) => Some(ColumnType::DateTime),
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        if let Self::Int(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bigint(&self) -> Option<i64> {
        if let Self::BigInt(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        if let Self::Double(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Self::Text(v) = self {
            Some(v)
        } else {
            None
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::TinyInt(v) => write!(f, "{}", v),
            Self::SmallInt(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::BigInt(v) => write!(f, "{}", v),
            Self::Real(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Numeric(v) | Self::Text(v) => write!(f, "{}", v),
            Self::Date(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v),
        }
    }
}

/// Conversion from a column value into a Rust type.
///
/// Implemented for the primitive types matching each [`ColumnType`] and for
/// `Option<T>`, which maps NULL to `None`.
pub trait FromValue: Sized {
    /// Column type this Rust type reads.
    const EXPECTED: ColumnType;

    /// Check if a column of `column_type` can be read as `Self`.
    fn accepts(column_type: ColumnType) -> bool {
        column_type == Self::EXPECTED
    }

    /// Convert a non-NULL value; `None` if the variant does not fit.
    fn from_value(value: &Value) -> Option<Self>;

    /// Result for NULL; `None` means NULL is an error for this type.
    fn from_null() -> Option<Self> {
        None
    }
}

macro_rules! impl_from_value {
    ($ty:ty, $column:ident, $variant:ident) => {
        impl FromValue for $ty {
            const EXPECTED: ColumnType = ColumnType::$column;

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(*v),
                    _ => None,
                }
            }
        }
    };
}

impl_from_value!(bool, Bool, Bool);
impl_from_value!(u8, TinyInt, TinyInt);
impl_from_value!(i16, SmallInt, SmallInt);
impl_from_value!(i32, Int, Int);
impl_from_value!(i64, BigInt, BigInt);
impl_from_value!(f32, Real, Real);
impl_from_value!(f64, Double, Double);
impl_from_value!(NaiveDate, Date, Date);
impl_from_value!(NaiveDateTime, DateTime, DateTime);

impl FromValue for String {
    const EXPECTED: ColumnType = ColumnType::Varchar;

    fn accepts(column_type: ColumnType) -> bool {
        column_type.is_text()
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: ColumnType = T::EXPECTED;

    fn accepts(column_type: ColumnType) -> bool {
        T::accepts(column_type)
    }

    fn from_value(value: &Value) -> Option<Self> {
        T::from_value(value).map(Some)
    }

    fn from_null() -> Option<Self> {
        Some(None)
    }
}
