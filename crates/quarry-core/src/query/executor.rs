//! Query executor.
//!
//! The executor turns a [`Query`] into records or scalars. Each terminal
//! operation compiles the query, acquires one connection from the pool,
//! runs the primary statement followed by one statement per preload, and
//! releases the connection when the guard goes out of scope, on success and
//! on every error path alike.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

use quarry_proto::{ColumnRef, OrderSpec, PreloadSpec, Row, SelectMode, Value};
use tracing::{debug, warn};

use super::builder::Query;
use super::compiler::CompiledQuery;
use super::scan::{Batches, Scan};
use crate::catalog::Catalog;
use crate::config::{ExecutorConfig, LoadMode};
use crate::driver::{Connection, ConnectionPool};
use crate::error::Error;
use crate::observer::QueryObserver;
use crate::record::{Association, FromRecord, Record};

/// Runs queries against a connection pool.
pub struct Executor<P: ConnectionPool> {
    catalog: Arc<Catalog>,
    pool: P,
    config: ExecutorConfig,
    observer: Option<Arc<dyn QueryObserver>>,
}

impl<P: ConnectionPool> Executor<P> {
    /// Create an executor.
    pub fn new(catalog: Arc<Catalog>, pool: P, config: ExecutorConfig) -> Self {
        Self {
            catalog,
            pool,
            config,
            observer: None,
        }
    }

    /// Attach an observer notified around every statement.
    pub fn with_observer(mut self, observer: impl QueryObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// The catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// The connection pool.
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// The configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Start a scoped query on `table`.
    pub fn query(&self, table: &str) -> Result<Query, Error> {
        self.catalog.query(table)
    }

    // Record terminals

    /// Every matching record, with preloads attached.
    pub fn all(&self, query: &Query) -> Result<Vec<Record>, Error> {
        query.check()?;
        let d = query.descriptor();
        if d.none {
            debug!(table = %d.table, "none query short-circuited");
            return Ok(Vec::new());
        }

        let compiled = query.compile()?;
        let mut conn = self.pool.acquire()?;
        let rows = self.run(&mut conn, &compiled)?;
        let mut records = materialize(&d.table, &compiled, d.primary_key.as_ref(), rows)?;
        self.preload(&mut conn, &d.table, &mut records, &d.preloads)?;
        Ok(records)
    }

    /// Every matching record, decoded into `T`.
    pub fn all_as<T: FromRecord>(&self, query: &Query) -> Result<Vec<T>, Error> {
        self.all(query)?.iter().map(T::from_record).collect()
    }

    /// Lazy, restartable iteration. Nothing runs until the scan is
    /// iterated, and each iteration runs the query again.
    pub fn iter(&self, query: &Query) -> Scan<'_, P> {
        Scan::new(self, query.clone())
    }

    /// Lazy iteration in pages of `batch_size` records, keyed on the
    /// primary key. Any ordering, limit or offset on `query` is ignored.
    pub fn each_batch(&self, query: &Query) -> Result<Batches<'_, P>, Error> {
        let pk = self.require_primary_key(query)?;
        Ok(Batches::new(self, query, pk, self.config.batch_size))
    }

    /// First record by the query's ordering, primary key ascending if it
    /// has none.
    pub fn first_opt(&self, query: &Query) -> Result<Option<Record>, Error> {
        let ordered = if query.descriptor().order_by.is_empty() {
            match &query.descriptor().primary_key {
                Some(pk) => query.push_order(OrderSpec::asc(pk.clone())),
                None => query.clone(),
            }
        } else {
            query.clone()
        };
        Ok(self.all(&ordered.limit(1))?.into_iter().next())
    }

    /// Like [`first_opt`](Self::first_opt), failing with `RecordNotFound`.
    pub fn first(&self, query: &Query) -> Result<Record, Error> {
        self.first_opt(query)?.ok_or_else(|| not_found(query))
    }

    /// First record decoded into `T`.
    pub fn first_as<T: FromRecord>(&self, query: &Query) -> Result<Option<T>, Error> {
        self.first_opt(query)?
            .as_ref()
            .map(T::from_record)
            .transpose()
    }

    /// Last record: the query's ordering reversed, primary key descending
    /// if it has none.
    pub fn last_opt(&self, query: &Query) -> Result<Option<Record>, Error> {
        Ok(self
            .all(&query.reverse_order().limit(1))?
            .into_iter()
            .next())
    }

    /// Like [`last_opt`](Self::last_opt), failing with `RecordNotFound`.
    pub fn last(&self, query: &Query) -> Result<Record, Error> {
        self.last_opt(query)?.ok_or_else(|| not_found(query))
    }

    /// Record by primary key.
    pub fn find_opt(&self, query: &Query, id: impl Into<Value>) -> Result<Option<Record>, Error> {
        let pk = self.require_primary_key(query)?;
        let scoped = query.column(&pk).eq(id).limit(1);
        Ok(self.all(&scoped)?.into_iter().next())
    }

    /// Like [`find_opt`](Self::find_opt), failing with `RecordNotFound`.
    pub fn find(&self, query: &Query, id: impl Into<Value>) -> Result<Record, Error> {
        self.find_opt(query, id)?.ok_or_else(|| not_found(query))
    }

    /// Fetch a fresh copy of `record` by its primary key, ignoring scopes.
    pub fn reload(&self, record: &Record) -> Result<Record, Error> {
        let table = record.table();
        let pk = self
            .catalog
            .primary_key(table)?
            .ok_or_else(|| Error::MissingPrimaryKey {
                table: table.to_string(),
            })?;
        let id = record
            .get(&pk.name)
            .cloned()
            .ok_or_else(|| Error::Decode(format!("{} record has no {} value", table, pk.name)))?;
        self.find(&self.catalog.unscoped(table)?, id)
    }

    // Probes and scalars

    /// Whether any record matches, using a `LIMIT 1` query.
    pub fn exists(&self, query: &Query) -> Result<bool, Error> {
        query.check()?;
        if query.descriptor().none {
            return Ok(false);
        }
        let compiled = query.with_select_mode(SelectMode::Exists).compile()?;
        let mut conn = self.pool.acquire()?;
        Ok(!self.run(&mut conn, &compiled)?.is_empty())
    }

    /// Whether no record matches.
    pub fn is_empty(&self, query: &Query) -> Result<bool, Error> {
        self.exists(query).map(|found| !found)
    }

    /// Number of matching records; zero when nothing matches.
    pub fn select_count(&self, query: &Query) -> Result<i64, Error> {
        query.check()?;
        if query.descriptor().none {
            return Ok(0);
        }
        match self.scalar(&query.with_select_mode(SelectMode::Count))? {
            None | Some(Value::Null) => Ok(0),
            Some(value) => value
                .as_i64()
                .ok_or_else(|| Error::Decode(format!("COUNT(*) returned {}", value.type_name()))),
        }
    }

    /// Values of one column across matching rows.
    pub fn pluck(&self, query: &Query, column: &str) -> Result<Vec<Value>, Error> {
        query.check()?;
        let column = query.resolve_column(column)?;
        if query.descriptor().none {
            return Ok(Vec::new());
        }
        let compiled = query.with_select_mode(SelectMode::Pluck(column)).compile()?;
        let mut conn = self.pool.acquire()?;
        let rows = self.run(&mut conn, &compiled)?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().next().unwrap_or(Value::Null))
            .collect())
    }

    /// First cell of the first row.
    pub(crate) fn scalar(&self, query: &Query) -> Result<Option<Value>, Error> {
        let compiled = query.compile()?;
        let mut conn = self.pool.acquire()?;
        let rows = self.run(&mut conn, &compiled)?;
        Ok(rows.into_iter().next().and_then(|row| row.into_iter().next()))
    }

    // Associations

    /// An association of `record`.
    ///
    /// Preloaded associations are returned as is. Otherwise strict mode
    /// fails with `NotPreloaded` and permissive mode fetches it for this one
    /// record.
    pub fn association<'r>(
        &self,
        record: &'r Record,
        name: &str,
    ) -> Result<Cow<'r, Association>, Error> {
        match record.association(name) {
            Ok(association) => Ok(Cow::Borrowed(association)),
            Err(err) => match self.config.load_mode {
                LoadMode::Strict => Err(err),
                LoadMode::Permissive => {
                    warn!(
                        table = record.table(),
                        association = name,
                        "lazily loading association; preload it to avoid one query per record"
                    );
                    self.fetch_association(record, name).map(Cow::Owned)
                }
            },
        }
    }

    /// Explicitly load one association onto a single record.
    pub fn load_association(&self, record: &mut Record, name: &str) -> Result<(), Error> {
        let association = self.fetch_association(record, name)?;
        record.set_association(name, association);
        Ok(())
    }

    fn fetch_association(&self, record: &Record, name: &str) -> Result<Association, Error> {
        self.catalog.resolve_association(record.table(), name)?;
        let mut batch = [record.clone()];
        let mut conn = self.pool.acquire()?;
        self.preload(
            &mut conn,
            record.table(),
            &mut batch,
            &[PreloadSpec::new(name)],
        )?;
        batch[0].association(name).cloned()
    }

    // Plumbing

    /// Execute one compiled statement, notifying the observer.
    pub(crate) fn run(
        &self,
        conn: &mut P::Connection,
        compiled: &CompiledQuery,
    ) -> Result<Vec<Row>, Error> {
        if let Some(observer) = &self.observer {
            observer.on_execute(&compiled.sql, &compiled.params);
        }
        let started = Instant::now();
        let rows = conn.execute(&compiled.sql, &compiled.params)?;
        let elapsed = started.elapsed();

        if self.config.log_statements {
            debug!(
                sql = %compiled.sql,
                params = compiled.params.len(),
                rows = rows.len(),
                elapsed_us = elapsed.as_micros() as u64,
                "executed statement"
            );
        }
        if let Some(observer) = &self.observer {
            observer.on_complete(&compiled.sql, rows.len(), elapsed);
        }
        Ok(rows)
    }

    fn require_primary_key(&self, query: &Query) -> Result<ColumnRef, Error> {
        query
            .descriptor()
            .primary_key
            .clone()
            .ok_or_else(|| Error::MissingPrimaryKey {
                table: query.table().to_string(),
            })
    }
}

pub(crate) fn materialize(
    table: &str,
    compiled: &CompiledQuery,
    primary_key: Option<&ColumnRef>,
    rows: Vec<Row>,
) -> Result<Vec<Record>, Error> {
    rows.into_iter()
        .map(|row| Record::from_row(table, compiled.columns.clone(), primary_key, row))
        .collect()
}

fn not_found(query: &Query) -> Error {
    Error::RecordNotFound {
        table: query.table().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AssociationDef, ScalarType, Schema, TableDef};
    use crate::driver::RecordingDriver;
    use pretty_assertions::assert_eq;

    fn catalog() -> Arc<Catalog> {
        Schema::new()
            .with_table(
                TableDef::new("users")
                    .with_primary_key("id")
                    .column("id", ScalarType::Int64)
                    .column("name", ScalarType::String),
            )
            .with_table(
                TableDef::new("events")
                    .column("user_id", ScalarType::Int64)
                    .column("kind", ScalarType::String),
            )
            .with_table(
                TableDef::new("posts")
                    .with_primary_key("id")
                    .column("id", ScalarType::Int64)
                    .column("user_id", ScalarType::Int64),
            )
            .with_association(AssociationDef::has_many("users", "posts", "posts", "user_id"))
            .build()
            .unwrap()
    }

    fn executor() -> (Executor<RecordingDriver>, RecordingDriver) {
        let driver = RecordingDriver::new();
        let executor = Executor::new(catalog(), driver.clone(), ExecutorConfig::default());
        (executor, driver)
    }

    fn user(id: i64, name: &str) -> Row {
        vec![Value::Int64(id), name.into()]
    }

    #[test]
    fn test_first_orders_by_primary_key() {
        let (exec, driver) = executor();
        driver.push_rows(vec![user(1, "ada")]);
        let q = exec.query("users").unwrap();
        let record = exec.first(&q).unwrap();
        assert_eq!(record.id(), Some(&Value::Int64(1)));
        assert_eq!(
            driver.sql(),
            vec!["SELECT id, name FROM users ORDER BY id ASC LIMIT $1"]
        );
    }

    #[test]
    fn test_last_reverses_existing_order() {
        let (exec, driver) = executor();
        let q = exec.query("users").unwrap().asc("name");
        assert!(exec.last_opt(&q).unwrap().is_none());
        assert_eq!(
            driver.sql(),
            vec!["SELECT id, name FROM users ORDER BY name DESC LIMIT $1"]
        );
        assert!(matches!(
            exec.last(&q),
            Err(Error::RecordNotFound { .. })
        ));
    }

    #[test]
    fn test_first_without_primary_key() {
        let (exec, driver) = executor();
        let q = exec.query("events").unwrap();
        assert!(exec.first_opt(&q).unwrap().is_none());
        assert_eq!(driver.sql(), vec!["SELECT user_id, kind FROM events LIMIT $1"]);
    }

    #[test]
    fn test_find_requires_primary_key() {
        let (exec, driver) = executor();
        let q = exec.query("events").unwrap();
        assert!(matches!(
            exec.find(&q, 1i64),
            Err(Error::MissingPrimaryKey { .. })
        ));
        assert_eq!(driver.statement_count(), 0);
    }

    #[test]
    fn test_find() {
        let (exec, driver) = executor();
        driver.push_rows(vec![user(7, "grace")]);
        let q = exec.query("users").unwrap();
        let record = exec.find(&q, 7i64).unwrap();
        assert_eq!(record.try_get::<String>("name").unwrap(), "grace");
        let stmt = &driver.statements()[0];
        assert_eq!(stmt.sql, "SELECT id, name FROM users WHERE id = $1 LIMIT $2");
        assert_eq!(stmt.params, vec![Value::Int64(7), Value::Int64(1)]);

        assert!(matches!(exec.find(&q, 8i64), Err(Error::RecordNotFound { .. })));
    }

    #[test]
    fn test_reload() {
        let (exec, driver) = executor();
        driver.push_rows(vec![user(3, "old")]).push_rows(vec![user(3, "new")]);
        let q = exec.query("users").unwrap();
        let record = exec.first(&q).unwrap();
        let fresh = exec.reload(&record).unwrap();
        assert_eq!(fresh.try_get::<String>("name").unwrap(), "new");
    }

    #[test]
    fn test_exists_and_count() {
        let (exec, driver) = executor();
        driver
            .push_rows(vec![vec![Value::Int32(1)]])
            .push_rows(vec![])
            .push_rows(vec![vec![Value::Int64(4)]]);
        let q = exec.query("users").unwrap();
        assert!(exec.exists(&q).unwrap());
        assert!(exec.is_empty(&q).unwrap());
        assert_eq!(exec.select_count(&q).unwrap(), 4);
        assert_eq!(
            driver.sql(),
            vec![
                "SELECT 1 FROM users LIMIT 1",
                "SELECT 1 FROM users LIMIT 1",
                "SELECT COUNT(*) FROM users",
            ]
        );
    }

    #[test]
    fn test_count_on_empty_result_is_zero() {
        let (exec, _driver) = executor();
        let q = exec.query("users").unwrap();
        assert_eq!(exec.select_count(&q).unwrap(), 0);
    }

    #[test]
    fn test_pluck() {
        let (exec, driver) = executor();
        driver.push_rows(vec![vec!["a".into()], vec!["b".into()]]);
        let q = exec.query("users").unwrap();
        let names = exec.pluck(&q, "name").unwrap();
        assert_eq!(names, vec![Value::from("a"), Value::from("b")]);
        assert_eq!(driver.sql(), vec!["SELECT name FROM users"]);
    }

    #[test]
    fn test_none_short_circuits_everything() {
        let (exec, driver) = executor();
        let q = exec.query("users").unwrap().none().col("name").eq("x");
        assert!(exec.first_opt(&q).unwrap().is_none());
        assert!(exec.all(&q).unwrap().is_empty());
        assert!(matches!(exec.first(&q), Err(Error::RecordNotFound { .. })));
        assert!(!exec.exists(&q).unwrap());
        assert_eq!(exec.select_count(&q).unwrap(), 0);
        assert!(exec.pluck(&q, "name").unwrap().is_empty());
        assert_eq!(driver.statement_count(), 0);
        assert_eq!(driver.acquired(), 0);
    }

    #[test]
    fn test_build_error_raised_before_driver() {
        let (exec, driver) = executor();
        let q = exec.query("users").unwrap().col("name").eq(None::<String>);
        assert!(matches!(exec.all(&q), Err(Error::NullArgument { .. })));
        assert_eq!(driver.acquired(), 0);
    }

    #[test]
    fn test_driver_error_passes_through_and_releases() {
        let (exec, driver) = executor();
        driver.push_error("connection reset");
        let q = exec.query("users").unwrap();
        let err = exec.all(&q).unwrap_err();
        assert_eq!(err.to_string(), "driver error: connection reset");
        assert_eq!(driver.acquired(), 1);
        assert_eq!(driver.released(), 1);
    }

    #[test]
    fn test_acquire_failure_is_driver_error() {
        let (exec, driver) = executor();
        driver.fail_acquire("pool exhausted");
        let q = exec.query("users").unwrap();
        assert!(matches!(exec.all(&q), Err(Error::Driver(_))));
    }

    #[test]
    fn test_strict_association_access() {
        let (exec, driver) = executor();
        driver.push_rows(vec![user(1, "ada")]);
        let record = exec.first(&exec.query("users").unwrap()).unwrap();
        assert!(matches!(
            exec.association(&record, "posts"),
            Err(Error::NotPreloaded { .. })
        ));
        assert_eq!(driver.statement_count(), 1);
    }

    #[test]
    fn test_permissive_association_access_fetches() {
        let driver = RecordingDriver::new();
        let config = ExecutorConfig::new().with_load_mode(LoadMode::Permissive);
        let exec = Executor::new(catalog(), driver.clone(), config);
        driver
            .push_rows(vec![user(1, "ada")])
            .push_rows(vec![vec![Value::Int64(10), Value::Int64(1)]]);
        let record = exec.first(&exec.query("users").unwrap()).unwrap();
        let posts = exec.association(&record, "posts").unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(
            driver.sql()[1],
            "SELECT id, user_id FROM posts WHERE user_id IN ($1)"
        );
    }

    #[test]
    fn test_load_association() {
        let (exec, driver) = executor();
        driver.push_rows(vec![user(1, "ada")]);
        let mut record = exec.first(&exec.query("users").unwrap()).unwrap();
        exec.load_association(&mut record, "posts").unwrap();
        assert!(record.many("posts").unwrap().is_empty());
        assert!(matches!(
            exec.load_association(&mut record, "comments"),
            Err(Error::UnknownAssociation { .. })
        ));
    }
}
