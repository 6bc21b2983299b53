//! Statement parameters and result cells.

use serde::{Deserialize, Serialize};

/// One result row, positionally aligned with the compiled column list.
pub type Row = Vec<Value>;

/// A bound parameter or a decoded cell.
///
/// Variants track the catalog's [`ScalarType`](crate::ScalarType)s. Array
/// variants carry their element type so drivers can bind them directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    Uuid([u8; 16]),
    BoolArray(Vec<bool>),
    Int32Array(Vec<i32>),
    Int64Array(Vec<i64>),
    Float64Array(Vec<f64>),
    StringArray(Vec<String>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Value::BoolArray(_)
                | Value::Int32Array(_)
                | Value::Int64Array(_)
                | Value::Float64Array(_)
                | Value::StringArray(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        if let Value::Int32(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Either integer width, widened.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int32(i) => Some(i64::from(i)),
            Value::Int64(i) => Some(i),
            _ => None,
        }
    }

    /// Any numeric variant, widened. Sums and averages come back from
    /// drivers in either domain.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int32(i) => Some(f64::from(i)),
            Value::Int64(i) => Some(i as f64),
            Value::Float32(f) => Some(f64::from(f)),
            Value::Float64(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Value::Bytes(b) = self {
            Some(b.as_slice())
        } else {
            None
        }
    }

    /// Microseconds since the epoch.
    pub fn as_timestamp(&self) -> Option<i64> {
        if let Value::Timestamp(t) = self {
            Some(*t)
        } else {
            None
        }
    }

    /// Short name of the variant for decode error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::BoolArray(_) => "bool[]",
            Value::Int32Array(_) => "int32[]",
            Value::Int64Array(_) => "int64[]",
            Value::Float64Array(_) => "float64[]",
            Value::StringArray(_) => "string[]",
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
    [u8; 16] => Uuid,
    Vec<bool> => BoolArray,
    Vec<i32> => Int32Array,
    Vec<i64> => Int64Array,
    Vec<f64> => Float64Array,
    Vec<String> => StringArray,
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int64(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

/// `None` binds as SQL `NULL`.
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening() {
        assert_eq!(Value::Int32(-7).as_i64(), Some(-7));
        assert_eq!(Value::Int64(7).as_i32(), None);
        assert_eq!(Value::Int32(2).as_f64(), Some(2.0));
        assert_eq!(Value::Float32(0.5).as_f64(), Some(0.5));
        assert_eq!(Value::String("3".into()).as_f64(), None);
    }

    #[test]
    fn test_parameter_conversions() {
        assert_eq!(Value::from(18), Value::Int32(18));
        assert_eq!(Value::from(5u32), Value::Int64(5));
        assert_eq!(Value::from("sa%"), Value::String("sa%".into()));
        assert_eq!(Value::from(None::<&str>), Value::Null);
        assert_eq!(Value::from(Some(1.5f64)), Value::Float64(1.5));
        assert_eq!(Value::from([0u8; 16]).type_name(), "uuid");
    }

    #[test]
    fn test_arrays() {
        let tags = Value::from(vec!["a".to_string(), "b".to_string()]);
        assert!(tags.is_array());
        assert_eq!(tags.type_name(), "string[]");
        assert!(!Value::Bytes(vec![1]).is_array());
        assert_eq!(Value::Bytes(vec![1, 2]).as_bytes(), Some(&[1u8, 2][..]));
    }
}
