//! Column definitions for tables.

use quarry_proto::{ColumnRef, ColumnType, ScalarType};
use serde::{Deserialize, Serialize};

/// A column definition within a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column data type.
    pub column_type: ColumnType,
}

impl ColumnDef {
    /// Create a non-null column.
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Scalar(scalar),
        }
    }

    /// Create a nullable column.
    pub fn nullable(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Nullable(scalar),
        }
    }

    /// Create an array column.
    pub fn array(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Array(scalar),
        }
    }

    /// Typed handle to this column on `table`.
    pub fn to_ref(&self, table: &str) -> ColumnRef {
        ColumnRef::new(table, &self.name, self.column_type)
    }
}
