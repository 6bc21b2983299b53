//! quarry IR types.
//!
//! This crate defines the value type and the immutable query descriptor that
//! the builder in `quarry-core` produces and the SQL compiler consumes.
//!
//! # Modules
//!
//! - [`value`] - Runtime values for parameters and result cells
//! - [`types`] - Column type definitions
//! - [`query`] - The query descriptor and its condition tree
//! - [`error`] - Builder-stage error types

pub mod error;
pub mod query;
pub mod types;
pub mod value;

pub use error::BuildError;

// Re-export commonly used types at crate root
pub use query::{
    AggregateFunction, ColumnRef, Combinator, Condition, Descriptor, Distinct, Group, JoinKind,
    JoinSpec, NullsPolicy, Operand, Operator, OrderDirection, OrderSpec, PreloadSpec, Predicate,
    SelectMode,
};
pub use types::{ColumnType, ScalarType};
pub use value::{Row, Value};
