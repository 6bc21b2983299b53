//! In-memory driver that records statements and replays scripted rows.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use quarry_proto::{Row, Value};

use super::{Connection, ConnectionPool, DriverError};

/// A statement seen by the [`RecordingDriver`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    /// SQL text.
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<Value>,
}

enum Scripted {
    Rows(Vec<Row>),
    Fail(String),
}

#[derive(Default)]
struct State {
    statements: Vec<RecordedStatement>,
    responses: VecDeque<Scripted>,
    fail_acquire: Option<String>,
    acquired: usize,
    released: usize,
}

/// A pool whose connections record every statement.
///
/// Responses are consumed in FIFO order, one per executed statement; once
/// the script runs out every statement returns no rows. Cloning shares the
/// underlying state.
#[derive(Clone, Default)]
pub struct RecordingDriver {
    state: Arc<Mutex<State>>,
}

impl RecordingDriver {
    /// Create a driver with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the rows returned by the next unanswered statement.
    pub fn push_rows(&self, rows: Vec<Row>) -> &Self {
        self.state.lock().responses.push_back(Scripted::Rows(rows));
        self
    }

    /// Queue a failure for the next unanswered statement.
    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        self.state
            .lock()
            .responses
            .push_back(Scripted::Fail(message.into()));
        self
    }

    /// Make every subsequent `acquire` fail.
    pub fn fail_acquire(&self, message: impl Into<String>) {
        self.state.lock().fail_acquire = Some(message.into());
    }

    /// Statements executed so far.
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.state.lock().statements.clone()
    }

    /// SQL text of statements executed so far.
    pub fn sql(&self) -> Vec<String> {
        self.state
            .lock()
            .statements
            .iter()
            .map(|s| s.sql.clone())
            .collect()
    }

    /// Number of statements executed so far.
    pub fn statement_count(&self) -> usize {
        self.state.lock().statements.len()
    }

    /// Number of successful acquisitions.
    pub fn acquired(&self) -> usize {
        self.state.lock().acquired
    }

    /// Number of connections handed back.
    pub fn released(&self) -> usize {
        self.state.lock().released
    }

    /// Connections currently checked out.
    pub fn outstanding(&self) -> usize {
        let state = self.state.lock();
        state.acquired - state.released
    }

    /// Forget recorded statements and counters, keeping the script.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.statements.clear();
        state.acquired = 0;
        state.released = 0;
    }
}

impl ConnectionPool for RecordingDriver {
    type Connection = RecordingConnection;

    fn acquire(&self) -> Result<RecordingConnection, DriverError> {
        let mut state = self.state.lock();
        if let Some(message) = &state.fail_acquire {
            return Err(DriverError::new(message.clone()));
        }
        state.acquired += 1;
        Ok(RecordingConnection {
            state: self.state.clone(),
        })
    }
}

/// Connection handed out by [`RecordingDriver`].
pub struct RecordingConnection {
    state: Arc<Mutex<State>>,
}

impl Connection for RecordingConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError> {
        let mut state = self.state.lock();
        state.statements.push(RecordedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        match state.responses.pop_front() {
            Some(Scripted::Rows(rows)) => Ok(rows),
            Some(Scripted::Fail(message)) => Err(DriverError::new(message)),
            None => Ok(Vec::new()),
        }
    }
}

impl Drop for RecordingConnection {
    fn drop(&mut self) {
        self.state.lock().released += 1;
    }
}
