//! Schema catalog.
//!
//! The catalog is the engine's view of the external schema layer: tables
//! with their columns in declaration order, optional primary keys,
//! association declarations and named scopes.

mod association;
mod catalog;
mod column;
mod schema;
mod table;

pub use association::{AssociationDef, AssociationKind, ResolvedAssociation};
pub use catalog::Catalog;
pub use column::ColumnDef;
pub use schema::{Schema, ScopeFn, DEFAULT_SCOPE};
pub use table::TableDef;

pub use quarry_proto::{ColumnType, ScalarType};
