//! Column types as declared by the catalog.

use serde::{Deserialize, Serialize};

/// Element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bytes,
    /// Microseconds since the Unix epoch.
    Timestamp,
    Uuid,
}

impl ScalarType {
    /// Valid operand of `SUM` and `AVG`.
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Sums over these stay in the integer domain.
    pub fn is_integer(self) -> bool {
        matches!(self, ScalarType::Int32 | ScalarType::Int64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::Float32 | ScalarType::Float64)
    }
}

/// Shape of a column: a plain scalar, a nullable scalar, or an array.
///
/// Only array columns accept `includes` predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Scalar(ScalarType),
    Nullable(ScalarType),
    Array(ScalarType),
}

impl ColumnType {
    pub fn scalar(scalar: ScalarType) -> Self {
        ColumnType::Scalar(scalar)
    }

    pub fn nullable(scalar: ScalarType) -> Self {
        ColumnType::Nullable(scalar)
    }

    pub fn array(scalar: ScalarType) -> Self {
        ColumnType::Array(scalar)
    }

    /// Element type, whatever the shape.
    pub fn scalar_type(&self) -> ScalarType {
        match *self {
            ColumnType::Scalar(s) | ColumnType::Nullable(s) | ColumnType::Array(s) => s,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, ColumnType::Nullable(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ColumnType::Array(_))
    }
}
