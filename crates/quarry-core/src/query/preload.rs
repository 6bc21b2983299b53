//! Batched association preloading.
//!
//! For each preload the executor collects the distinct key values of the
//! parent batch and issues one statement selecting every child whose key
//! is in that set. Children are then matched back to their parents by key.
//! Nested preloads run against the fetched children after they arrive, so
//! each level waits for the one above it.

use std::collections::{HashMap, HashSet};

use quarry_proto::PreloadSpec;
use tracing::trace;

use super::builder::Query;
use super::executor::{materialize, Executor};
use crate::catalog::ResolvedAssociation;
use crate::driver::ConnectionPool;
use crate::error::Error;
use crate::record::{distinct_keys, Association, Record, RowKey};

impl<P: ConnectionPool> Executor<P> {
    /// Resolve `specs` against `records` of `table`, attaching results.
    pub(crate) fn preload(
        &self,
        conn: &mut P::Connection,
        table: &str,
        records: &mut [Record],
        specs: &[PreloadSpec],
    ) -> Result<(), Error> {
        if records.is_empty() {
            return Ok(());
        }
        for spec in specs {
            let assoc = self
                .catalog()
                .resolve_association(table, &spec.association)?
                .clone();
            let children = self.fetch_children(conn, &assoc, spec, records)?;
            attach(records, &assoc, children);
        }
        Ok(())
    }

    fn fetch_children(
        &self,
        conn: &mut P::Connection,
        assoc: &ResolvedAssociation,
        spec: &PreloadSpec,
        parents: &[Record],
    ) -> Result<Vec<Record>, Error> {
        let keys = distinct_keys(parents, &assoc.source.name);
        let base = match &spec.nested {
            Some(nested) => Query::from_descriptor(self.catalog().clone(), (**nested).clone()),
            None => self.catalog().query(assoc.target_table())?,
        };
        if keys.is_empty() || base.descriptor().none {
            trace!(
                association = assoc.name(),
                parents = parents.len(),
                "preload skipped, no keys"
            );
            return Ok(Vec::new());
        }

        trace!(
            association = assoc.name(),
            parents = parents.len(),
            keys = keys.len(),
            "preloading"
        );
        let key_count = keys.len();
        let query = base.column(&assoc.target).in_list(keys);
        let compiled = query.compile()?;
        let rows = self.run(conn, &compiled)?;

        let d = query.descriptor();
        let mut children = materialize(&d.table, &compiled, d.primary_key.as_ref(), rows)?;
        if d.has_joins() {
            dedup_by_id(&mut children);
        }
        trace!(
            association = assoc.name(),
            keys = key_count,
            children = children.len(),
            "preload batch fetched"
        );
        self.preload(conn, assoc.target_table(), &mut children, &spec.preloads)?;
        Ok(children)
    }
}

/// Drop repeated children, keeping first-seen order. A join in the
/// preload block yields one row per matching joined record.
fn dedup_by_id(children: &mut Vec<Record>) {
    let mut seen = HashSet::new();
    children.retain(|child| match child.id().and_then(RowKey::from_value) {
        Some(key) => seen.insert(key),
        None => true,
    });
}

/// Assign each parent the children whose target key equals its source key.
///
/// Parents without a match get an empty collection or `None`, never an
/// absent association.
fn attach(parents: &mut [Record], assoc: &ResolvedAssociation, children: Vec<Record>) {
    let mut by_key: HashMap<RowKey, Vec<Record>> = HashMap::new();
    for child in children {
        if let Some(key) = child.get(&assoc.target.name).and_then(RowKey::from_value) {
            by_key.entry(key).or_default().push(child);
        }
    }

    let collection = assoc.def.kind.is_collection();
    for parent in parents.iter_mut() {
        let matched = parent
            .get(&assoc.source.name)
            .and_then(RowKey::from_value)
            .and_then(|key| by_key.get(&key));
        let association = if collection {
            Association::Many(matched.cloned().unwrap_or_default())
        } else {
            Association::One(matched.and_then(|m| m.first()).cloned().map(Box::new))
        };
        parent.set_association(assoc.name(), association);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use quarry_proto::Value;

    use super::*;
    use crate::catalog::{AssociationDef, Catalog, ScalarType, Schema, TableDef};
    use crate::config::ExecutorConfig;
    use crate::driver::RecordingDriver;

    fn catalog() -> Arc<Catalog> {
        Schema::new()
            .with_table(
                TableDef::new("users")
                    .with_primary_key("id")
                    .column("id", ScalarType::Int64),
            )
            .with_table(
                TableDef::new("posts")
                    .with_primary_key("id")
                    .column("id", ScalarType::Int64)
                    .nullable_column("user_id", ScalarType::Int64),
            )
            .with_table(
                TableDef::new("comments")
                    .with_primary_key("id")
                    .column("id", ScalarType::Int64)
                    .column("post_id", ScalarType::Int64)
                    .column("body", ScalarType::String),
            )
            .with_association(AssociationDef::has_many("users", "posts", "posts", "user_id"))
            .with_association(AssociationDef::has_many("posts", "comments", "comments", "post_id"))
            .with_association(AssociationDef::belongs_to("posts", "user", "users", "user_id"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_belongs_to_shares_parent() {
        let driver = RecordingDriver::new();
        let exec = Executor::new(catalog(), driver.clone(), ExecutorConfig::default());
        driver
            .push_rows(vec![
                vec![Value::Int64(10), Value::Int64(1)],
                vec![Value::Int64(11), Value::Int64(1)],
                vec![Value::Int64(12), Value::Null],
            ])
            .push_rows(vec![vec![Value::Int64(1)]]);

        let q = exec.query("posts").unwrap().with("user");
        let posts = exec.all(&q).unwrap();

        let statements = driver.statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].sql, "SELECT id FROM users WHERE id IN ($1)");
        assert_eq!(statements[1].params, vec![Value::Int64(1)]);

        assert_eq!(posts[0].one("user").unwrap().unwrap().id(), Some(&Value::Int64(1)));
        assert_eq!(posts[1].one("user").unwrap().unwrap().id(), Some(&Value::Int64(1)));
        assert!(posts[2].one("user").unwrap().is_none());
    }

    #[test]
    fn test_no_keys_no_query() {
        let driver = RecordingDriver::new();
        let exec = Executor::new(catalog(), driver.clone(), ExecutorConfig::default());
        driver.push_rows(vec![vec![Value::Int64(12), Value::Null]]);

        let q = exec.query("posts").unwrap().with("user");
        let posts = exec.all(&q).unwrap();
        assert_eq!(driver.statement_count(), 1);
        assert!(posts[0].is_loaded("user"));
        assert!(posts[0].one("user").unwrap().is_none());
    }

    #[test]
    fn test_empty_parent_batch_skips_preload() {
        let driver = RecordingDriver::new();
        let exec = Executor::new(catalog(), driver.clone(), ExecutorConfig::default());
        let q = exec.query("users").unwrap().with("posts");
        assert!(exec.all(&q).unwrap().is_empty());
        assert_eq!(driver.statement_count(), 1);
    }

    #[test]
    fn test_joined_preload_attaches_each_child_once() {
        let driver = RecordingDriver::new();
        let exec = Executor::new(catalog(), driver.clone(), ExecutorConfig::default());
        driver
            .push_rows(vec![vec![Value::Int64(1)]])
            .push_rows(vec![
                vec![Value::Int64(10), Value::Int64(1)],
                vec![Value::Int64(10), Value::Int64(1)],
                vec![Value::Int64(11), Value::Int64(1)],
            ]);

        let q = exec.query("users").unwrap().with_query("posts", |p| {
            p.where_assoc("comments", |c| c.col("body").like("%rust%"))
        });
        let users = exec.all(&q).unwrap();

        assert_eq!(
            driver.statements()[1].sql,
            "SELECT posts.id, posts.user_id FROM posts \
             INNER JOIN comments ON posts.id = comments.post_id \
             WHERE comments.body LIKE $1 AND posts.user_id IN ($2)"
        );
        let ids: Vec<_> = users[0]
            .many("posts")
            .unwrap()
            .into_iter()
            .map(|p| p.id().cloned())
            .collect();
        assert_eq!(ids, vec![Some(Value::Int64(10)), Some(Value::Int64(11))]);
    }
}
