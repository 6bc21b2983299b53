//! Table definitions.

use quarry_proto::{ColumnRef, ScalarType};
use serde::{Deserialize, Serialize};

use super::column::ColumnDef;

/// A table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name (unique within the schema).
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,
    /// Name of the primary key column, if the table has one.
    pub primary_key: Option<String>,
}

impl TableDef {
    /// Create a table without a primary key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
        }
    }

    /// Set the primary key column.
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Add multiple columns.
    pub fn with_columns(mut self, columns: impl IntoIterator<Item = ColumnDef>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Shorthand for a non-null column.
    pub fn column(self, name: impl Into<String>, scalar: ScalarType) -> Self {
        self.with_column(ColumnDef::new(name, scalar))
    }

    /// Shorthand for a nullable column.
    pub fn nullable_column(self, name: impl Into<String>, scalar: ScalarType) -> Self {
        self.with_column(ColumnDef::nullable(name, scalar))
    }

    /// Get a column by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Typed handle to a column.
    pub fn column_ref(&self, name: &str) -> Option<ColumnRef> {
        self.get_column(name).map(|c| c.to_ref(&self.name))
    }

    /// Typed handles to every column, in declaration order.
    pub fn column_refs(&self) -> Vec<ColumnRef> {
        self.columns.iter().map(|c| c.to_ref(&self.name)).collect()
    }

    /// Typed handle to the primary key column.
    pub fn primary_key_ref(&self) -> Option<ColumnRef> {
        self.primary_key
            .as_deref()
            .and_then(|pk| self.column_ref(pk))
    }
}
