use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BufMut};

use crate::common::RecordId;

use super::{Schema, Value};

/// Represents a single row/tuple in a table.
///
/// A tuple contains a list of values corresponding to the columns defined in its schema.
/// Once stored in a heap page it also remembers where it lives, as a [`RecordId`].
/// That record id is a lookup aid for deletes and updates only; equality ignores it.
///
/// ## Tuple Binary Format
///
/// ```text
/// +----------------+----------------------------------+
/// | Null Bitmap    | Column Data                      |
/// | (N bytes)      | (sum of column widths)           |
/// +----------------+----------------------------------+
/// ```
///
/// - **Null Bitmap**: ceil(column_count / 8) bytes, 1 bit per column (1 = NULL)
/// - **Column Data**: every column at its fixed width, in schema order; NULL
///   columns are zero-filled so offsets never shift
#[derive(Debug, Clone)]
pub struct Tuple {
    /// The schema defining the structure of this tuple
    schema: Arc<Schema>,

    /// The values for each column (in schema order)
    values: Vec<Value>,

    /// Where the tuple is stored, once it has been inserted
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a new tuple with the given schema and values.
    ///
    /// # Panics
    /// Panics if the number of values doesn't match the schema column count.
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Self {
        assert_eq!(
            values.len(),
            schema.column_count(),
            "Value count must match schema column count"
        );
        Self {
            schema,
            values,
            record_id: None,
        }
    }

    /// Returns the schema of this tuple.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the value at the given column index.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the value for the given column name.
    pub fn value_by_name(&self, name: &str) -> Option<&Value> {
        self.schema
            .column_index(name)
            .and_then(|i| self.values.get(i))
    }

    /// Returns all values in this tuple.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Sets the value at the given column index.
    pub fn set_value(&mut self, index: usize, value: Value) -> bool {
        if index < self.values.len() {
            self.values[index] = value;
            true
        } else {
            false
        }
    }

    /// Returns the number of columns/values in this tuple.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this tuple has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns where this tuple is stored, if it has been stored.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    /// Sets or clears the storage location of this tuple.
    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Returns true if this tuple can be stored in a table with the given schema:
    /// same columns, every value of its column's type, and NULL only where allowed.
    pub fn conforms_to(&self, schema: &Schema) -> bool {
        if *self.schema != *schema {
            return false;
        }
        self.schema
            .columns()
            .zip(&self.values)
            .all(|(col, value)| value.fits(col.data_type()) && (col.is_nullable() || !value.is_null()))
    }

    /// Writes exactly `schema.tuple_size()` bytes.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.compute_null_bitmap());
        for (col, value) in self.schema.columns().zip(&self.values) {
            value.encode(col.data_type(), buf);
        }
    }

    /// Reads a tuple of `schema` from the buffer.
    /// Returns None if the buffer holds fewer than `schema.tuple_size()` bytes.
    pub fn decode<B: Buf>(schema: Arc<Schema>, buf: &mut B) -> Option<Self> {
        if buf.remaining() < schema.tuple_size() {
            return None;
        }

        let mut null_bitmap = vec![0u8; schema.null_bitmap_size()];
        buf.copy_to_slice(&mut null_bitmap);

        let mut values = Vec::with_capacity(schema.column_count());
        for (i, col) in schema.columns().enumerate() {
            let is_null = null_bitmap[i / 8] & (1 << (i % 8)) != 0;
            let value = Value::decode(buf, col.data_type())?;
            values.push(if is_null { Value::Null } else { value });
        }

        Some(Self {
            schema,
            values,
            record_id: None,
        })
    }

    /// Computes the null bitmap for the current values.
    fn compute_null_bitmap(&self) -> Vec<u8> {
        let mut bitmap = vec![0u8; self.schema.null_bitmap_size()];

        for (i, value) in self.values.iter().enumerate() {
            if value.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }

        bitmap
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.values == other.values
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

/// Builder for constructing tuples fluently.
pub struct TupleBuilder {
    schema: Arc<Schema>,
    values: Vec<Value>,
    current_index: usize,
}

impl TupleBuilder {
    /// Creates a new tuple builder for the given schema.
    pub fn new(schema: Arc<Schema>) -> Self {
        let count = schema.column_count();
        Self {
            schema,
            values: vec![Value::Null; count],
            current_index: 0,
        }
    }

    /// Sets the value at the current position and advances.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        if self.current_index < self.values.len() {
            self.values[self.current_index] = value.into();
            self.current_index += 1;
        }
        self
    }

    /// Sets a null value at the current position and advances.
    pub fn null(mut self) -> Self {
        if self.current_index < self.values.len() {
            self.values[self.current_index] = Value::Null;
            self.current_index += 1;
        }
        self
    }

    /// Sets the value for a specific column by name.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        if let Some(index) = self.schema.column_index(name) {
            self.values[index] = value.into();
        }
        self
    }

    /// Builds the tuple.
    pub fn build(self) -> Tuple {
        Tuple::new(self.schema, self.values)
    }
}
