//! Core error types.

use quarry_proto::BuildError;
use thiserror::Error;

use crate::driver::DriverError;

/// Errors raised by the query engine.
///
/// `NullArgument`, `UnjoinedAssociation` and the `Unknown*` variants are
/// programmer errors detected before any statement reaches the driver.
/// `Driver` wraps execution failures and is passed through untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// Null passed to a non-nilable predicate.
    #[error("null passed to `{operator}` on {table}.{column}; use the nilable variant instead")]
    NullArgument {
        table: String,
        column: String,
        operator: String,
    },

    /// A condition references an association that is not joined.
    #[error("condition references association `{association}` but no join exists for it")]
    UnjoinedAssociation { association: String },

    /// Single-record finisher found nothing.
    #[error("no {table} record matched the query")]
    RecordNotFound { table: String },

    /// Operation needs a primary key the table does not declare.
    #[error("table {table} has no primary key")]
    MissingPrimaryKey { table: String },

    /// Association accessed without being preloaded.
    #[error("association `{association}` on {model} was not preloaded; add `.with(\"{association}\")` to the query")]
    NotPreloaded { model: String, association: String },

    /// Execution-layer failure.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Table not present in the catalog.
    #[error("unknown table {0}")]
    UnknownTable(String),

    /// Column not declared on the table.
    #[error("unknown column {table}.{column}")]
    UnknownColumn { table: String, column: String },

    /// Association not declared on the table.
    #[error("unknown association `{association}` on {table}")]
    UnknownAssociation { table: String, association: String },

    /// Named scope not registered.
    #[error("unknown scope `{scope}` on {table}")]
    UnknownScope { table: String, scope: String },

    /// Schema definition is inconsistent.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Argument rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A result row could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<BuildError> for Error {
    fn from(error: BuildError) -> Self {
        match error {
            BuildError::NullArgument {
                table,
                column,
                operator,
            } => Error::NullArgument {
                table,
                column,
                operator,
            },
            BuildError::UnknownColumn { table, column } => Error::UnknownColumn { table, column },
            BuildError::UnknownAssociation { table, association } => {
                Error::UnknownAssociation { table, association }
            }
            BuildError::UnknownScope { table, scope } => Error::UnknownScope { table, scope },
            BuildError::InvalidArgument(message) => Error::InvalidArgument(message),
        }
    }
}

impl Error {
    /// Whether this error was raised before anything was sent to the driver.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Error::NullArgument { .. }
                | Error::UnjoinedAssociation { .. }
                | Error::UnknownTable(_)
                | Error::UnknownColumn { .. }
                | Error::UnknownAssociation { .. }
                | Error::UnknownScope { .. }
                | Error::InvalidArgument(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_mapping() {
        let err: Error = BuildError::NullArgument {
            table: "users".into(),
            column: "name".into(),
            operator: "eq".into(),
        }
        .into();
        assert!(matches!(err, Error::NullArgument { .. }));
        assert!(err.is_build_error());
        assert!(err.to_string().contains("users.name"));
    }

    #[test]
    fn test_driver_error_is_not_build_error() {
        let err: Error = DriverError::new("connection reset").into();
        assert!(!err.is_build_error());
        assert_eq!(err.to_string(), "driver error: connection reset");
    }
}
