//! Statement observer hook.

use std::time::Duration;

use quarry_proto::Value;

/// Receives every statement the executor sends to a driver.
///
/// Injected with [`Executor::with_observer`](crate::Executor::with_observer).
/// Both methods default to doing nothing.
pub trait QueryObserver: Send + Sync {
    /// Called before the statement is executed.
    fn on_execute(&self, _sql: &str, _params: &[Value]) {}

    /// Called after the statement returned `rows` rows.
    fn on_complete(&self, _sql: &str, _rows: usize, _elapsed: Duration) {}
}

/// Observer emitting `tracing` events under the `quarry::sql` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl QueryObserver for TracingObserver {
    fn on_execute(&self, sql: &str, params: &[Value]) {
        tracing::info!(target: "quarry::sql", sql, params = ?params, "executing");
    }

    fn on_complete(&self, sql: &str, rows: usize, elapsed: Duration) {
        tracing::info!(
            target: "quarry::sql",
            sql,
            rows,
            elapsed_us = elapsed.as_micros() as u64,
            "completed"
        );
    }
}
