//! quarry core engine.
//!
//! This crate provides the catalog, the immutable query builder, the SQL
//! compiler and the executor that runs compiled statements through a
//! pluggable connection pool and batches association preloads.
//!
//! # Modules
//!
//! - [`catalog`] - Tables, columns, associations and scopes
//! - [`query`] - Builder, compiler and executor
//! - [`record`] - Materialized result records
//! - [`driver`] - Connection traits and an in-memory recording driver
//! - [`config`] - Executor configuration
//! - [`observer`] - Statement observer hook
//! - [`error`] - Error types

pub mod catalog;
pub mod config;
pub mod driver;
pub mod error;
pub mod observer;
pub mod query;
pub mod record;

pub use catalog::{
    AssociationDef, AssociationKind, Catalog, ColumnDef, ResolvedAssociation, Schema, TableDef,
};
pub use config::{ExecutorConfig, LoadMode};
pub use driver::{Connection, ConnectionPool, DriverError, RecordingDriver};
pub use error::Error;
pub use observer::{QueryObserver, TracingObserver};
pub use query::{
    compile, to_prepared_sql, Batches, ColumnFilter, CompiledQuery, Executor, Query, Scan,
};
pub use record::{Association, FromRecord, FromValue, Record};

pub use quarry_proto::{ColumnType, ScalarType, Value};
