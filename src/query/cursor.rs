//! Buffered query cursor.
//!
//! The cursor owns one prepared statement on the service. Rows arrive in
//! chunks of at most `fetch_size`, are decoded against the column metadata
//! once, and are handed out one at a time.

use std::collections::VecDeque;
use std::fmt;

use crate::error::ConversionError;
use crate::transport::{ColumnInfo, PreparedStatement, RowChunk, StatementHandle};
use crate::types::{decode_value, ColumnType, Value};

/// Result column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Declared column type
    pub column_type: ColumnType,
    /// Whether the column may hold NULL
    pub nullable: bool,
}

impl Column {
    /// Build column metadata from the wire description.
    pub fn from_info(info: &ColumnInfo) -> Result<Self, ConversionError> {
        Ok(Self {
            name: info.name.clone(),
            column_type: ColumnType::from_wire(&info.type_name)?,
            nullable: info.nullable,
        })
    }
}

/// Where the cursor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPhase {
    /// Statement prepared, not yet run
    Prepared,
    /// Statement running, rows may still arrive
    Executing,
    /// Every row has been delivered by the service
    Exhausted,
    /// A fetched chunk could not be decoded; no further rows are delivered
    Failed,
}

impl fmt::Display for CursorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorPhase::Prepared => write!(f, "prepared"),
            CursorPhase::Executing => write!(f, "executing"),
            CursorPhase::Exhausted => write!(f, "exhausted"),
            CursorPhase::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Cursor {
    handle: StatementHandle,
    columns: Vec<Column>,
    phase: CursorPhase,
    buffer: VecDeque<Vec<Value>>,
    current: Option<Vec<Value>>,
    rows_received: usize,
    affected_rows: Option<i64>,
    failure: Option<ConversionError>,
}

impl Cursor {
    /// Wrap a freshly prepared statement.
    ///
    /// # Errors
    /// Returns `ConversionError::UnsupportedType` if a column type is unknown.
    pub(crate) fn new(prepared: PreparedStatement) -> Result<Self, ConversionError> {
        let columns = prepared
            .columns
            .iter()
            .map(Column::from_info)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            handle: prepared.handle,
            columns,
            phase: CursorPhase::Prepared,
            buffer: VecDeque::new(),
            current: None,
            rows_received: 0,
            affected_rows: None,
            failure: None,
        })
    }

    pub(crate) fn handle(&self) -> StatementHandle {
        self.handle
    }

    pub(crate) fn phase(&self) -> CursorPhase {
        self.phase
    }

    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn affected_rows(&self) -> Option<i64> {
        self.affected_rows
    }

    /// Mark the statement as running.
    ///
    /// A statement without result columns has nothing to fetch.
    pub(crate) fn start(&mut self, affected_rows: Option<i64>) {
        self.affected_rows = affected_rows;
        self.phase = if self.columns.is_empty() {
            CursorPhase::Exhausted
        } else {
            CursorPhase::Executing
        };
    }

    /// Whether the next advance needs another fetch round trip.
    pub(crate) fn needs_fetch(&self) -> bool {
        self.phase == CursorPhase::Executing && self.buffer.is_empty()
    }

    /// Decode a fetched chunk into the buffer; an empty chunk ends the stream.
    ///
    /// The chunk is buffered only if every row decodes. Otherwise the cursor
    /// fails and keeps reporting the same error.
    pub(crate) fn load_chunk(&mut self, chunk: RowChunk) -> Result<(), ConversionError> {
        self.check()?;

        if chunk.is_end() {
            self.phase = CursorPhase::Exhausted;
            return Ok(());
        }

        match self.decode_chunk(chunk) {
            Ok(rows) => {
                self.rows_received += rows.len();
                self.buffer.extend(rows);
                Ok(())
            }
            Err(e) => {
                self.phase = CursorPhase::Failed;
                self.buffer.clear();
                self.current = None;
                self.failure = Some(e.clone());
                Err(e)
            }
        }
    }

    /// The decode error that failed this cursor, if any.
    pub(crate) fn check(&self) -> Result<(), ConversionError> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn decode_chunk(&self, chunk: RowChunk) -> Result<Vec<Vec<Value>>, ConversionError> {
        let expected = self.columns.len();
        let mut rows = Vec::with_capacity(chunk.rows.len());

        for (offset, raw) in chunk.rows.iter().enumerate() {
            let row = self.rows_received + offset;
            if raw.len() != expected {
                return Err(ConversionError::RowWidthMismatch {
                    row,
                    expected,
                    actual: raw.len(),
                });
            }

            let values = raw
                .iter()
                .zip(&self.columns)
                .enumerate()
                .map(|(col, (cell, column))| decode_value(cell, column.column_type, row, col))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(values);
        }

        Ok(rows)
    }

    /// Move to the next buffered row.
    pub(crate) fn advance(&mut self) -> bool {
        self.current = self.buffer.pop_front();
        self.current.is_some()
    }

    pub(crate) fn current(&self) -> Option<&[Value]> {
        self.current.as_deref()
    }
}
