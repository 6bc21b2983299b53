//! Query building, compilation and execution.
//!
//! # Modules
//!
//! - `builder` - The immutable [`Query`] and its chainable methods
//! - `filter` - Per-column predicate constructors ([`ColumnFilter`])
//! - `join` - Joins and conditions through associations
//! - `compiler` - Descriptor to SQL text plus ordered parameters
//! - [`literal`] - Literal rendering for prepared SQL output
//! - `executor` - Terminal operations against a connection pool
//! - `preload` - Batched association loading
//! - `scan` - Lazy and paged iteration
//! - `aggregate` - SUM, AVG, MIN and MAX terminals

mod aggregate;
mod builder;
mod compiler;
mod executor;
mod filter;
mod join;
pub mod literal;
mod preload;
mod scan;

pub use builder::Query;
pub use compiler::{compile, CompiledQuery};
pub use executor::Executor;
pub use filter::ColumnFilter;
pub use literal::to_prepared_sql;
pub use scan::{BatchIter, Batches, Scan, ScanIter};
