use std::fmt;

use bytes::{Buf, BufMut};

use super::DataType;

/// Represents a typed value that can be stored in a tuple.
/// Each variant corresponds to a DataType and holds the actual data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value - can be any type
    Null,

    /// Boolean value
    Boolean(bool),

    /// 8-bit signed integer
    TinyInt(i8),

    /// 16-bit signed integer
    SmallInt(i16),

    /// 32-bit signed integer
    Integer(i32),

    /// 64-bit signed integer
    BigInt(i64),

    /// 32-bit floating point
    Float(f32),

    /// 64-bit floating point
    Double(f64),

    /// String value (stored as Char)
    String(String),

    /// Timestamp value (microseconds since Unix epoch)
    Timestamp(i64),
}

impl Value {
    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this value can be written to a column of `data_type`.
    pub fn fits(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Null, _) => true,
            (Value::Boolean(_), DataType::Boolean)
            | (Value::TinyInt(_), DataType::TinyInt)
            | (Value::SmallInt(_), DataType::SmallInt)
            | (Value::Integer(_), DataType::Integer)
            | (Value::BigInt(_), DataType::BigInt)
            | (Value::Float(_), DataType::Float)
            | (Value::Double(_), DataType::Double)
            | (Value::Timestamp(_), DataType::Timestamp) => true,
            // NUL is the padding byte, so a string may not contain it
            (Value::String(s), DataType::Char(n)) => s.len() <= *n as usize && !s.contains('\0'),
            _ => false,
        }
    }

    /// Writes exactly `data_type.size()` bytes for this value.
    /// Nulls (and values that don't fit) are written as zeros; the tuple's
    /// null bitmap says which is which.
    pub fn encode<B: BufMut>(&self, data_type: &DataType, buf: &mut B) {
        match (self, data_type) {
            (Value::Boolean(b), DataType::Boolean) => buf.put_u8(u8::from(*b)),
            (Value::TinyInt(v), DataType::TinyInt) => buf.put_i8(*v),
            (Value::SmallInt(v), DataType::SmallInt) => buf.put_i16_le(*v),
            (Value::Integer(v), DataType::Integer) => buf.put_i32_le(*v),
            (Value::BigInt(v), DataType::BigInt) => buf.put_i64_le(*v),
            (Value::Float(v), DataType::Float) => buf.put_f32_le(*v),
            (Value::Double(v), DataType::Double) => buf.put_f64_le(*v),
            (Value::Timestamp(v), DataType::Timestamp) => buf.put_i64_le(*v),
            (Value::String(s), DataType::Char(n)) if self.fits(data_type) => {
                buf.put_slice(s.as_bytes());
                buf.put_bytes(0, *n as usize - s.len());
            }
            _ => buf.put_bytes(0, data_type.size()),
        }
    }

    /// Reads one value of `data_type` from the buffer.
    /// Returns None if fewer than `data_type.size()` bytes remain.
    pub fn decode<B: Buf>(buf: &mut B, data_type: &DataType) -> Option<Self> {
        if buf.remaining() < data_type.size() {
            return None;
        }

        let value = match data_type {
            DataType::Boolean => Value::Boolean(buf.get_u8() != 0),
            DataType::TinyInt => Value::TinyInt(buf.get_i8()),
            DataType::SmallInt => Value::SmallInt(buf.get_i16_le()),
            DataType::Integer => Value::Integer(buf.get_i32_le()),
            DataType::BigInt => Value::BigInt(buf.get_i64_le()),
            DataType::Float => Value::Float(buf.get_f32_le()),
            DataType::Double => Value::Double(buf.get_f64_le()),
            DataType::Timestamp => Value::Timestamp(buf.get_i64_le()),
            DataType::Char(n) => {
                let mut raw = vec![0u8; *n as usize];
                buf.copy_to_slice(&mut raw);
                let len = raw.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
                Value::String(String::from_utf8_lossy(&raw[..len]).into_owned())
            }
        };

        Some(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Timestamp(v) => write!(f, "TIMESTAMP({})", v),
        }
    }
}

// Convenience conversions
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::TinyInt(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
