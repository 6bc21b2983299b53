//! Lazy iteration over query results.
//!
//! [`Scan`] defers execution until iterated and runs the query afresh on
//! every iteration. [`Batches`] pages through a table on its primary key so
//! that no page depends on an `OFFSET`.

use std::vec;

use quarry_proto::{ColumnRef, OrderSpec, Value};
use tracing::trace;

use super::builder::Query;
use super::executor::Executor;
use crate::driver::ConnectionPool;
use crate::error::Error;
use crate::record::Record;

/// A query bound to an executor, iterated on demand.
pub struct Scan<'e, P: ConnectionPool> {
    executor: &'e Executor<P>,
    query: Query,
}

impl<'e, P: ConnectionPool> Scan<'e, P> {
    pub(crate) fn new(executor: &'e Executor<P>, query: Query) -> Self {
        Self { executor, query }
    }

    /// The query this scan runs.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Start an iteration. The query executes on the first `next` call.
    pub fn iter(&self) -> ScanIter<'_, 'e, P> {
        ScanIter {
            scan: self,
            state: ScanState::Pending,
        }
    }
}

impl<'s, 'e, P: ConnectionPool> IntoIterator for &'s Scan<'e, P> {
    type Item = Result<Record, Error>;
    type IntoIter = ScanIter<'s, 'e, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

enum ScanState {
    Pending,
    Streaming(vec::IntoIter<Record>),
    Done,
}

/// One pass over a [`Scan`].
pub struct ScanIter<'s, 'e, P: ConnectionPool> {
    scan: &'s Scan<'e, P>,
    state: ScanState,
}

impl<P: ConnectionPool> Iterator for ScanIter<'_, '_, P> {
    type Item = Result<Record, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                ScanState::Pending => match self.scan.executor.all(&self.scan.query) {
                    Ok(records) => self.state = ScanState::Streaming(records.into_iter()),
                    Err(err) => {
                        self.state = ScanState::Done;
                        return Some(Err(err));
                    }
                },
                ScanState::Streaming(records) => {
                    let next = records.next();
                    if next.is_none() {
                        self.state = ScanState::Done;
                    }
                    return next.map(Ok);
                }
                ScanState::Done => return None,
            }
        }
    }
}

/// Primary-key paged iteration, yielding one page of records at a time.
///
/// Each page selects rows with a key greater than the last key of the
/// previous page. Iteration stops after a short or empty page, or after the
/// first error.
pub struct Batches<'e, P: ConnectionPool> {
    executor: &'e Executor<P>,
    base: Query,
    primary_key: ColumnRef,
    batch_size: u32,
}

impl<'e, P: ConnectionPool> Batches<'e, P> {
    pub(crate) fn new(
        executor: &'e Executor<P>,
        query: &Query,
        primary_key: ColumnRef,
        batch_size: u32,
    ) -> Self {
        let base = query
            .reset_order()
            .reset_limit()
            .reset_offset()
            .push_order(OrderSpec::asc(primary_key.clone()))
            .limit(u64::from(batch_size));
        Self {
            executor,
            base,
            primary_key,
            batch_size,
        }
    }

    /// Records per page.
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Start an iteration from the first page.
    pub fn iter(&self) -> BatchIter<'_, 'e, P> {
        BatchIter {
            batches: self,
            after: None,
            done: false,
            page: 0,
        }
    }

    fn page(&self, after: Option<&Value>) -> Result<Vec<Record>, Error> {
        let query = match after {
            Some(last) => self.base.column(&self.primary_key).gt(last.clone()),
            None => self.base.clone(),
        };
        self.executor.all(&query)
    }
}

impl<'b, 'e, P: ConnectionPool> IntoIterator for &'b Batches<'e, P> {
    type Item = Result<Vec<Record>, Error>;
    type IntoIter = BatchIter<'b, 'e, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One pass over [`Batches`].
pub struct BatchIter<'b, 'e, P: ConnectionPool> {
    batches: &'b Batches<'e, P>,
    after: Option<Value>,
    done: bool,
    page: usize,
}

impl<P: ConnectionPool> Iterator for BatchIter<'_, '_, P> {
    type Item = Result<Vec<Record>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let records = match self.batches.page(self.after.as_ref()) {
            Ok(records) => records,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        self.page += 1;
        trace!(page = self.page, records = records.len(), "fetched batch");

        if records.len() < self.batches.batch_size as usize {
            self.done = true;
        }
        if records.is_empty() {
            return None;
        }

        let pk = &self.batches.primary_key.name;
        match records.last().and_then(|r| r.get(pk)) {
            Some(last) if !last.is_null() => self.after = Some(last.clone()),
            _ => {
                self.done = true;
                return Some(Err(Error::Decode(format!(
                    "batch row has no {} value to page on",
                    pk
                ))));
            }
        }
        Some(Ok(records))
    }
}
