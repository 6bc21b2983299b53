//! Join graph construction.
//!
//! Joins are keyed by association path (`posts`, `posts.comments`) and kept
//! in the order they were first declared. Re-joining a path changes its
//! kind in place and accumulates its `ON` conditions; it never adds a
//! second `JOIN` clause.

use std::sync::Arc;

use quarry_proto::{BuildError, Descriptor, JoinKind, JoinSpec};

use super::builder::Query;
use crate::catalog::ResolvedAssociation;

impl Query {
    /// `INNER JOIN` an association.
    pub fn join(&self, association: &str) -> Query {
        self.add_join(association, JoinKind::Inner, None)
    }

    /// `INNER JOIN` an association.
    pub fn inner_join(&self, association: &str) -> Query {
        self.add_join(association, JoinKind::Inner, None)
    }

    /// `LEFT JOIN` an association.
    pub fn left_join(&self, association: &str) -> Query {
        self.add_join(association, JoinKind::Left, None)
    }

    /// `RIGHT JOIN` an association.
    pub fn right_join(&self, association: &str) -> Query {
        self.add_join(association, JoinKind::Right, None)
    }

    /// `FULL JOIN` an association.
    pub fn full_join(&self, association: &str) -> Query {
        self.add_join(association, JoinKind::Full, None)
    }

    /// Join an association with extra conditions on the joined side.
    ///
    /// The block receives an unscoped query on the associated table; its
    /// conditions are rendered into the `ON` clause. Joins made inside the
    /// block are added to this query under the association's path.
    pub fn join_with<F>(&self, association: &str, kind: JoinKind, block: F) -> Query
    where
        F: FnOnce(Query) -> Query,
    {
        let target = match self.resolve_path(association) {
            Ok(steps) => match steps.last() {
                Some((_, assoc)) => assoc.target_table().to_string(),
                None => return self.clone(),
            },
            Err(error) => return self.fail(error),
        };
        match self.unscoped_on(&target) {
            Ok(base) => {
                let mut nested = block(base).descriptor().clone();
                let error = nested.error.take();
                let lifted = std::mem::take(Arc::make_mut(&mut nested.joins));
                let mut query = self.add_join(association, kind, Some(nested));
                for mut join in lifted {
                    join.path = format!("{}.{}", association, join.path);
                    query = query.ensure_join(join);
                }
                match error {
                    Some(error) => query.fail(error),
                    None => query,
                }
            }
            Err(error) => self.fail(error),
        }
    }

    /// `INNER JOIN` with `ON` conditions.
    pub fn inner_join_with<F>(&self, association: &str, block: F) -> Query
    where
        F: FnOnce(Query) -> Query,
    {
        self.join_with(association, JoinKind::Inner, block)
    }

    /// `LEFT JOIN` with `ON` conditions.
    pub fn left_join_with<F>(&self, association: &str, block: F) -> Query
    where
        F: FnOnce(Query) -> Query,
    {
        self.join_with(association, JoinKind::Left, block)
    }

    /// `RIGHT JOIN` with `ON` conditions.
    pub fn right_join_with<F>(&self, association: &str, block: F) -> Query
    where
        F: FnOnce(Query) -> Query,
    {
        self.join_with(association, JoinKind::Right, block)
    }

    /// `FULL JOIN` with `ON` conditions.
    pub fn full_join_with<F>(&self, association: &str, block: F) -> Query
    where
        F: FnOnce(Query) -> Query,
    {
        self.join_with(association, JoinKind::Full, block)
    }

    /// Filter on an associated table, inner-joining it if not yet joined.
    pub fn where_assoc<F>(&self, association: &str, block: F) -> Query
    where
        F: FnOnce(Query) -> Query,
    {
        self.where_assoc_with(association, true, block)
    }

    /// Filter on an associated table.
    ///
    /// The block's conditions are merged under AND with every column
    /// qualified by the associated table. With `auto_inner_join` false the
    /// caller must join the association; otherwise compilation fails with
    /// `UnjoinedAssociation`.
    pub fn where_assoc_with<F>(&self, association: &str, auto_inner_join: bool, block: F) -> Query
    where
        F: FnOnce(Query) -> Query,
    {
        let steps = match self.resolve_path(association) {
            Ok(steps) => steps,
            Err(error) => return self.fail(error),
        };
        let target = match steps.last() {
            Some((_, assoc)) => assoc.target_table().to_string(),
            None => return self.clone(),
        };
        let sub = match self.unscoped_on(&target) {
            Ok(base) => block(base),
            Err(error) => return self.fail(error),
        };
        let sub = sub.descriptor();

        let mut query = self.clone();
        if auto_inner_join {
            for (path, assoc) in &steps {
                query = query.ensure_join(join_spec(path, assoc, JoinKind::Inner));
            }
        }
        for join in sub.joins.iter() {
            let mut join = join.clone();
            join.path = format!("{}.{}", association, join.path);
            query = query.ensure_join(join);
        }
        if !sub.conditions.is_empty() {
            query = query.and_condition(sub.conditions.through_association(association));
        }
        match &sub.error {
            Some(error) => query.fail(error.clone()),
            None => query,
        }
    }

    /// Add `join` unless a join on the same path exists.
    pub(crate) fn ensure_join(&self, join: JoinSpec) -> Query {
        if self.descriptor().join(&join.path).is_some() {
            return self.clone();
        }
        self.derive(|d| Arc::make_mut(&mut d.joins).push(join))
    }

    fn add_join(&self, path: &str, kind: JoinKind, nested: Option<Descriptor>) -> Query {
        let steps = match self.resolve_path(path) {
            Ok(steps) => steps,
            Err(error) => return self.fail(error),
        };
        let Some((last_path, last_assoc)) = steps.last() else {
            return self.clone();
        };

        let mut query = self.clone();
        for (prefix, assoc) in &steps[..steps.len() - 1] {
            query = query.ensure_join(join_spec(prefix, assoc, kind));
        }

        let spec = join_spec(last_path, last_assoc, kind);
        query.derive(|d| {
            let joins = Arc::make_mut(&mut d.joins);
            match joins.iter_mut().find(|j| j.path == spec.path) {
                Some(existing) => {
                    existing.kind = kind;
                    if let Some(nested) = nested {
                        existing.nested = Some(Arc::new(match existing.nested.take() {
                            Some(prior) => accumulate(&prior, nested),
                            None => nested,
                        }));
                    }
                }
                None => joins.push(JoinSpec {
                    nested: nested.map(Arc::new),
                    ..spec
                }),
            }
        })
    }

    /// Resolve a dot-separated association path into `(path prefix,
    /// association)` steps starting at the root table.
    pub(crate) fn resolve_path(
        &self,
        path: &str,
    ) -> Result<Vec<(String, ResolvedAssociation)>, BuildError> {
        let mut steps = Vec::new();
        let mut table = self.table().to_string();
        let mut prefix = String::new();
        for segment in path.split('.') {
            let assoc = self
                .catalog()
                .association(&table, segment)
                .cloned()
                .ok_or_else(|| BuildError::UnknownAssociation {
                    table: table.clone(),
                    association: segment.to_string(),
                })?;
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            table = assoc.target_table().to_string();
            steps.push((prefix.clone(), assoc));
        }
        Ok(steps)
    }

    fn unscoped_on(&self, table: &str) -> Result<Query, BuildError> {
        self.catalog()
            .unscoped(table)
            .map_err(|e| BuildError::InvalidArgument(e.to_string()))
    }
}

fn join_spec(path: &str, assoc: &ResolvedAssociation, kind: JoinKind) -> JoinSpec {
    JoinSpec {
        path: path.to_string(),
        kind,
        table: assoc.target_table().to_string(),
        local: assoc.source.clone(),
        foreign: assoc.target.clone(),
        nested: None,
    }
}

/// AND the conditions of `next` onto `prior`.
fn accumulate(prior: &Descriptor, next: Descriptor) -> Descriptor {
    let mut merged = prior.clone();
    merged.conditions = Arc::new(prior.conditions.and((*next.conditions).clone()));
    merged
}
