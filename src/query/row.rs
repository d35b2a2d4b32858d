//! Borrowed view of the row under the cursor.

use crate::error::SessionError;
use crate::types::{ColumnType, FromValue, Value};

use super::cursor::Column;

/// The row the cursor is positioned on.
///
/// A `Row` borrows the session, so it cannot outlive the next
/// `next_row` or `finish_query` call.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [Column],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    pub(crate) fn new(columns: &'a [Column], values: &'a [Value]) -> Self {
        Self { columns, values }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column metadata for the row.
    pub fn columns(&self) -> &'a [Column] {
        self.columns
    }

    /// All values, in column order.
    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    fn column(&self, index: usize) -> Result<(&'a Column, &'a Value), SessionError> {
        match (self.columns.get(index), self.values.get(index)) {
            (Some(column), Some(value)) => Ok((column, value)),
            _ => Err(SessionError::IndexOutOfRange {
                index,
                column_count: self.values.len(),
            }),
        }
    }

    /// Read column `index`, checking it against the declared type.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index, `TypeMismatch` if `expected` is not
    /// the declared type of the column.
    pub fn get_column(&self, index: usize, expected: ColumnType) -> Result<&'a Value, SessionError> {
        let (column, value) = self.column(index)?;
        if column.column_type != expected {
            return Err(SessionError::TypeMismatch {
                index,
                expected,
                actual: column.column_type,
            });
        }
        Ok(value)
    }

    /// Read column `index` as a Rust type.
    ///
    /// NULL reads as `None` through `Option<T>` and as `NullValue` otherwise.
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T, SessionError> {
        let (column, value) = self.column(index)?;
        let mismatch = || SessionError::TypeMismatch {
            index,
            expected: T::EXPECTED,
            actual: column.column_type,
        };

        if !T::accepts(column.column_type) {
            return Err(mismatch());
        }
        if value.is_null() {
            return T::from_null().ok_or(SessionError::NullValue { index });
        }
        T::from_value(value).ok_or_else(mismatch)
    }

    /// Check if column `index` is NULL.
    pub fn is_null(&self, index: usize) -> Result<bool, SessionError> {
        self.column(index).map(|(_, value)| value.is_null())
    }
}
