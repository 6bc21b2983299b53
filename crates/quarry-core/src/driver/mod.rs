//! Driver boundary.
//!
//! The engine never talks to a database directly. It compiles statements
//! and hands them to a [`Connection`] obtained from a [`ConnectionPool`].
//! Connections are released when the value returned by
//! [`ConnectionPool::acquire`] is dropped, so every exit path of a terminal
//! operation (including errors raised mid-preload) gives the connection
//! back.

mod recording;

pub use recording::{RecordedStatement, RecordingConnection, RecordingDriver};

use quarry_proto::{Row, Value};
use thiserror::Error;

/// The single execution-layer error kind.
#[derive(Debug, Error)]
#[error("driver error: {message}")]
pub struct DriverError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl DriverError {
    /// Create an error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A live connection able to run one statement at a time.
pub trait Connection {
    /// Execute `sql` with positional `params`, returning rows whose cells
    /// line up with the statement's column list.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError>;
}

/// An externally owned, thread-safe source of connections.
pub trait ConnectionPool: Send + Sync {
    /// Connection guard; dropping it returns the connection to the pool.
    type Connection: Connection;

    /// Acquire a connection for the duration of one terminal operation.
    fn acquire(&self) -> Result<Self::Connection, DriverError>;
}
