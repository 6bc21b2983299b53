//! Builder-stage error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Problems detected while a query is being chained.
///
/// Chainable methods never fail directly; the first problem is recorded on
/// the descriptor and surfaced when the query is compiled or executed, before
/// any statement reaches the driver.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BuildError {
    /// Null passed to a predicate that does not accept it.
    #[error("null passed to `{operator}` on {table}.{column}; use the nilable variant instead")]
    NullArgument {
        table: String,
        column: String,
        operator: String,
    },

    /// Column not declared on the table.
    #[error("unknown column {table}.{column}")]
    UnknownColumn { table: String, column: String },

    /// Association not declared on the table.
    #[error("unknown association `{association}` on {table}")]
    UnknownAssociation { table: String, association: String },

    /// Named scope not registered for the table.
    #[error("unknown scope `{scope}` on {table}")]
    UnknownScope { table: String, scope: String },

    /// Argument rejected for another reason.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
