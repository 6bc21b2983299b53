//! quarry - an immutable, chainable SQL query builder.
//!
//! Queries are values: every builder method returns a new [`Query`] and
//! leaves its receiver untouched. A query compiles to PostgreSQL-flavoured
//! SQL with positional `$n` parameters, and an [`Executor`] runs it through
//! a pluggable [`ConnectionPool`], loading declared associations with one
//! batched statement per association level.
//!
//! # Example
//!
//! ```
//! use quarry::prelude::*;
//!
//! let catalog = Schema::new()
//!     .with_table(
//!         TableDef::new("users")
//!             .with_primary_key("id")
//!             .column("id", ScalarType::Int64)
//!             .column("name", ScalarType::String)
//!             .column("age", ScalarType::Int32),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let adults = catalog
//!     .query("users")
//!     .unwrap()
//!     .col("age")
//!     .gte(18)
//!     .limit(5);
//! let (sql, params) = adults.to_sql().unwrap();
//! assert_eq!(sql, "SELECT id, name, age FROM users WHERE age >= $1 LIMIT $2");
//! assert_eq!(params, vec![Value::Int32(18), Value::Int64(5)]);
//! ```

pub use quarry_core::{catalog, config, driver, error, observer, query, record};
pub use quarry_core::{
    Association, AssociationDef, AssociationKind, Batches, Catalog, ColumnDef, ColumnFilter,
    CompiledQuery, Connection, ConnectionPool, DriverError, Error, Executor, ExecutorConfig,
    FromRecord, FromValue, LoadMode, Query, QueryObserver, RecordingDriver, Record, Scan, Schema,
    TableDef, TracingObserver,
};
pub use quarry_proto as ir;
pub use quarry_proto::{
    BuildError, ColumnRef, ColumnType, JoinKind, NullsPolicy, OrderDirection, Row, ScalarType,
    Value,
};

/// Items most callers need, for a single glob import.
pub mod prelude {
    pub use crate::{
        AssociationDef, ColumnRef, ConnectionPool, Error, Executor, ExecutorConfig, FromRecord,
        FromValue, LoadMode, NullsPolicy, OrderDirection, Query, Record, RecordingDriver,
        ScalarType, Schema, TableDef, Value,
    };
}
