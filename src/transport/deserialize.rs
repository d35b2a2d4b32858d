//! Column-major <-> row-major conversion for fetched data.
//!
//! The service ships each fetch chunk column by column:
//!
//! ```json
//! [[x0, x1, x2], [y0, y1, y2]]
//! ```
//!
//! The cursor consumes rows, so the chunk is transposed while it is being
//! deserialized instead of in a second pass. Every column must carry the
//! same number of values as the first one.

use serde::de::{DeserializeSeed, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde_json::Value;
use std::fmt;

/// Deserialize column-major data into `rows[row][column]`.
///
/// Intended for `#[serde(deserialize_with = "to_row_major")]`.
pub fn to_row_major<'de, D>(deserializer: D) -> Result<Vec<Vec<Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_seq(ColumnsVisitor)
}

/// Serialize `rows[row][column]` back into column-major form.
pub fn to_column_major<S>(rows: &[Vec<Value>], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut columns = serializer.serialize_seq(Some(width))?;
    for col in 0..width {
        let column: Vec<&Value> = rows
            .iter()
            .map(|row| row.get(col).unwrap_or(&Value::Null))
            .collect();
        columns.serialize_element(&column)?;
    }
    columns.end()
}

struct ColumnsVisitor;

impl<'de> Visitor<'de> for ColumnsVisitor {
    type Value = Vec<Vec<Value>>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("column-major data array")
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Vec::new())
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut rows: Vec<Vec<Value>> = Vec::new();
        let mut col = 0;

        while seq
            .next_element_seed(ColumnSeed {
                rows: &mut rows,
                col,
            })?
            .is_some()
        {
            col += 1;
        }

        Ok(rows)
    }
}

/// Spreads one column's values across the rows built so far.
struct ColumnSeed<'a> {
    rows: &'a mut Vec<Vec<Value>>,
    col: usize,
}

impl<'de, 'a> DeserializeSeed<'de> for ColumnSeed<'a> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'a> Visitor<'de> for ColumnSeed<'a> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("array of column values")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let expected = self.rows.len();
        let mut row = 0;

        while let Some(value) = seq.next_element::<Value>()? {
            if self.col == 0 {
                self.rows.push(vec![value]);
            } else {
                match self.rows.get_mut(row) {
                    Some(existing) => existing.push(value),
                    None => return Err(ragged(self.col, expected, row + 1)),
                }
            }
            row += 1;
        }

        if self.col > 0 && row != expected {
            return Err(ragged(self.col, expected, row));
        }

        Ok(())
    }
}

fn ragged<E: serde::de::Error>(col: usize, expected: usize, actual: usize) -> E {
    E::custom(format_args!(
        "column {} has {} values, expected {}",
        col, actual, expected
    ))
}
