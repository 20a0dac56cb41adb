//! Dynamic value trees for decoded records.
//!
//! A `Value` mirrors one field's decoded content without requiring
//! concrete Rust types for the schema's objects. Record buffers are
//! canonicalized by decoding to a value tree and re-encoding it.

use serde::{Deserialize, Serialize};

/// A dynamic value for any schema field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean scalar.
    Bool(bool),
    /// Signed integer scalar, widened to i64.
    Int(i64),
    /// Unsigned integer scalar, widened to u64.
    UInt(u64),
    /// Floating point scalar, widened to f64.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Struct payload, one value per declared field, in order.
    Struct(Vec<Value>),
    /// Table instance.
    Table(TableValue),
    /// Vector of homogeneous elements.
    Vector(Vec<Value>),
    /// Union: tag 0 carries no value, a non-zero tag carries the
    /// active variant's table.
    Union { tag: u8, value: Option<Box<Value>> },
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::UInt(u) => Some(*u),
            Self::Int(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableValue> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[Value]> {
        match self {
            Self::Struct(v) => Some(v),
            _ => None,
        }
    }

    /// Human-readable variant name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Struct(_) => "struct",
            Self::Table(_) => "table",
            Self::Vector(_) => "vector",
            Self::Union { .. } => "union",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// One table instance: one optional value per declared field, in
/// declared order. `None` means the field is absent from the
/// encoding and reads back as its default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableValue {
    pub fields: Vec<Option<Value>>,
}

impl TableValue {
    /// A table with every field absent.
    pub fn empty(field_count: usize) -> Self {
        Self {
            fields: vec![None; field_count],
        }
    }

    pub fn set(mut self, index: usize, value: Value) -> Self {
        self.fields[index] = Some(value);
        self
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.fields.get(index).and_then(|f| f.as_ref())
    }
}
