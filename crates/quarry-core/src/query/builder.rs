//! The chainable, immutable query builder.
//!
//! Every method takes `&self` and returns a new [`Query`]; the receiver is
//! never altered. Descriptor sub-parts live behind `Arc`, so a derived
//! query shares everything it did not touch with its source.
//!
//! Builder-stage problems (a null handed to a non-nilable predicate, an
//! unknown column or association) do not break the chain. The first one is
//! recorded on the descriptor and returned by [`Query::to_sql`] or by the
//! terminal operation, before any statement reaches a driver.

use std::fmt;
use std::sync::Arc;

use quarry_proto::{
    BuildError, ColumnRef, Condition, Descriptor, Distinct, NullsPolicy, OrderDirection,
    OrderSpec, PreloadSpec, Predicate, SelectMode, Value,
};

use super::compiler::{compile, CompiledQuery};
use super::filter::ColumnFilter;
use super::literal::to_prepared_sql;
use crate::catalog::Catalog;
use crate::error::Error;

/// An immutable query over one table.
#[derive(Clone)]
pub struct Query {
    catalog: Arc<Catalog>,
    descriptor: Descriptor,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.catalog, &other.catalog) && self.descriptor == other.descriptor
    }
}

impl Query {
    pub(crate) fn from_descriptor(catalog: Arc<Catalog>, descriptor: Descriptor) -> Self {
        Self {
            catalog,
            descriptor,
        }
    }

    /// The underlying descriptor.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Root table name.
    pub fn table(&self) -> &str {
        &self.descriptor.table
    }

    /// The catalog this query resolves names against.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Derive a query by editing a copy of the descriptor.
    pub(crate) fn derive(&self, edit: impl FnOnce(&mut Descriptor)) -> Query {
        let mut descriptor = self.descriptor.clone();
        edit(&mut descriptor);
        Query::from_descriptor(self.catalog.clone(), descriptor)
    }

    /// Derive a query carrying a builder error.
    pub(crate) fn fail(&self, error: BuildError) -> Query {
        self.derive(|d| d.record_error(error))
    }

    /// A query on the same table with nothing but the table set.
    pub(crate) fn blank(&self) -> Query {
        let d = &self.descriptor;
        Query::from_descriptor(
            self.catalog.clone(),
            Descriptor::new(d.table.clone(), d.columns.clone(), d.primary_key.clone()),
        )
    }

    /// A scoped query on another table, or the error as a build error.
    pub(crate) fn query_on(&self, table: &str) -> Result<Query, BuildError> {
        self.catalog
            .query(table)
            .map_err(|e| BuildError::InvalidArgument(e.to_string()))
    }

    /// Resolve a column of the root table.
    pub(crate) fn resolve_column(&self, name: &str) -> Result<ColumnRef, BuildError> {
        self.descriptor
            .columns
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| BuildError::UnknownColumn {
                table: self.descriptor.table.clone(),
                column: name.to_string(),
            })
    }

    // Predicates

    /// Start a predicate on a root-table column.
    pub fn col(&self, name: &str) -> ColumnFilter {
        match self.resolve_column(name) {
            Ok(column) => ColumnFilter::new(self.clone(), column),
            Err(error) => ColumnFilter::new(self.fail(error), self.placeholder(name)),
        }
    }

    /// Start a predicate on a column handle.
    pub fn column(&self, column: &ColumnRef) -> ColumnFilter {
        if column.table != self.descriptor.table {
            let error = BuildError::InvalidArgument(format!(
                "column {} does not belong to {}; use where_assoc for associated tables",
                column.qualified(),
                self.descriptor.table
            ));
            return ColumnFilter::new(self.fail(error), column.clone());
        }
        ColumnFilter::new(self.clone(), column.clone())
    }

    fn placeholder(&self, name: &str) -> ColumnRef {
        ColumnRef::new(
            self.descriptor.table.clone(),
            name,
            quarry_proto::ColumnType::Nullable(quarry_proto::ScalarType::String),
        )
    }

    /// AND a raw predicate onto the conditions.
    pub fn filter(&self, predicate: Predicate) -> Query {
        self.and_condition(Condition::leaf(predicate))
    }

    pub(crate) fn and_condition(&self, condition: Condition) -> Query {
        self.derive(|d| d.conditions = Arc::new(d.conditions.and(condition)))
    }

    /// Combine the accumulated conditions with the block's under OR.
    ///
    /// The block receives an empty query on the same table; its conditions
    /// become one side of the OR and are parenthesized when they mix
    /// combinators.
    ///
    /// Only the block's conditions and joins are kept. Ordering, grouping,
    /// paging, distinct, preloads or `none` set inside any condition block
    /// record an `InvalidArgument` error instead of being dropped.
    pub fn or<F>(&self, block: F) -> Query
    where
        F: FnOnce(Query) -> Query,
    {
        let sub = block(self.blank());
        let condition = (*sub.descriptor.conditions).clone();
        self.merge_block(sub, |d| d.conditions = Arc::new(d.conditions.or(condition)))
    }

    /// AND an explicitly parenthesized group built by the block.
    pub fn where_<F>(&self, block: F) -> Query
    where
        F: FnOnce(Query) -> Query,
    {
        let sub = block(self.blank());
        let condition = (*sub.descriptor.conditions).clone().parenthesized();
        self.merge_block(sub, |d| d.conditions = Arc::new(d.conditions.and(condition)))
    }

    /// AND the negation of the group built by the block: `NOT (...)`.
    pub fn not_where<F>(&self, block: F) -> Query
    where
        F: FnOnce(Query) -> Query,
    {
        let sub = block(self.blank());
        let conditions = (*sub.descriptor.conditions).clone();
        if conditions.is_empty() {
            return self.merge_block(sub, |_| {});
        }
        let condition = conditions.negated();
        self.merge_block(sub, |d| d.conditions = Arc::new(d.conditions.and(condition)))
    }

    /// Fold a block's joins and errors into `self`, then apply `edit`.
    fn merge_block(&self, sub: Query, edit: impl FnOnce(&mut Descriptor)) -> Query {
        let mut query = self.derive(edit);
        for join in sub.descriptor.joins.iter() {
            query = query.ensure_join(join.clone());
        }
        if let Some(error) = sub.descriptor.error.clone() {
            query = query.fail(error);
        }
        if let Some(part) = discarded_part(&sub.descriptor) {
            query = query.fail(BuildError::InvalidArgument(format!(
                "{} cannot be set inside a condition block",
                part
            )));
        }
        query
    }

    // Scopes

    /// Apply a named scope registered on this table.
    pub fn scope(&self, name: &str) -> Query {
        match self.catalog.scope(&self.descriptor.table, name) {
            Some(scope) => scope(self.clone()),
            None => self.fail(BuildError::UnknownScope {
                table: self.descriptor.table.clone(),
                scope: name.to_string(),
            }),
        }
    }

    // Preloads

    /// Preload an association.
    pub fn with(&self, association: &str) -> Query {
        self.with_query(association, |q| q)
    }

    /// Preload an association, refining the child query.
    ///
    /// Preloads declared inside the block are resolved against the fetched
    /// children. A `limit` inside the block bounds the whole child batch,
    /// not each parent's share of it.
    pub fn with_query<F>(&self, association: &str, block: F) -> Query
    where
        F: FnOnce(Query) -> Query,
    {
        let target = match self.catalog.association(&self.descriptor.table, association) {
            Some(resolved) => resolved.target_table().to_string(),
            None => {
                return self.fail(BuildError::UnknownAssociation {
                    table: self.descriptor.table.clone(),
                    association: association.to_string(),
                })
            }
        };
        let base = match self.query_on(&target) {
            Ok(query) => query,
            Err(error) => return self.fail(error),
        };

        let mut nested = block(base).descriptor;
        let preloads = std::mem::take(Arc::make_mut(&mut nested.preloads));
        let error = nested.error.take();

        let spec = PreloadSpec {
            association: association.to_string(),
            nested: Some(Arc::new(nested)),
            preloads,
        };

        let query = self.derive(|d| {
            let list = Arc::make_mut(&mut d.preloads);
            match list.iter_mut().find(|p| p.association == spec.association) {
                Some(existing) => *existing = spec,
                None => list.push(spec),
            }
        });
        match error {
            Some(error) => query.fail(error),
            None => query,
        }
    }

    // Ordering, grouping, paging

    /// Append an `ORDER BY` entry.
    pub fn order_by(&self, column: &str, direction: OrderDirection) -> Query {
        match self.resolve_column(column) {
            Ok(column) => self.push_order(OrderSpec {
                column,
                direction,
                nulls: None,
            }),
            Err(error) => self.fail(error),
        }
    }

    /// Append an `ORDER BY` entry with explicit null placement.
    pub fn order_by_nulls(
        &self,
        column: &str,
        direction: OrderDirection,
        nulls: NullsPolicy,
    ) -> Query {
        match self.resolve_column(column) {
            Ok(column) => self.push_order(OrderSpec {
                column,
                direction,
                nulls: Some(nulls),
            }),
            Err(error) => self.fail(error),
        }
    }

    /// Shorthand for ascending order.
    pub fn asc(&self, column: &str) -> Query {
        self.order_by(column, OrderDirection::Asc)
    }

    /// Shorthand for descending order.
    pub fn desc(&self, column: &str) -> Query {
        self.order_by(column, OrderDirection::Desc)
    }

    pub(crate) fn push_order(&self, order: OrderSpec) -> Query {
        self.derive(|d| Arc::make_mut(&mut d.order_by).push(order))
    }

    /// Flip every ordering entry; with no ordering, order by primary key
    /// descending.
    pub fn reverse_order(&self) -> Query {
        if self.descriptor.order_by.is_empty() {
            return match &self.descriptor.primary_key {
                Some(pk) => self.push_order(OrderSpec::desc(pk.clone())),
                None => self.clone(),
            };
        }
        self.derive(|d| {
            d.order_by = Arc::new(d.order_by.iter().map(OrderSpec::reversed).collect());
        })
    }

    /// Append a `GROUP BY` column.
    pub fn group_by(&self, column: &str) -> Query {
        match self.resolve_column(column) {
            Ok(column) => self.derive(|d| Arc::make_mut(&mut d.group_by).push(column)),
            Err(error) => self.fail(error),
        }
    }

    /// Set `LIMIT`.
    pub fn limit(&self, limit: u64) -> Query {
        self.derive(|d| d.limit = Some(limit))
    }

    /// Set `OFFSET`.
    pub fn offset(&self, offset: u64) -> Query {
        self.derive(|d| d.offset = Some(offset))
    }

    /// `SELECT DISTINCT`.
    pub fn distinct(&self) -> Query {
        self.derive(|d| d.distinct = Distinct::All)
    }

    /// `SELECT DISTINCT ON (column)`.
    pub fn distinct_on(&self, column: &str) -> Query {
        match self.resolve_column(column) {
            Ok(column) => self.derive(|d| d.distinct = Distinct::On(column)),
            Err(error) => self.fail(error),
        }
    }

    /// Match nothing. Terminal operations return empty results without
    /// contacting the driver; the query stays chainable.
    pub fn none(&self) -> Query {
        self.derive(|d| d.none = true)
    }

    /// Select `COUNT(*)` instead of rows.
    pub fn count_mode(&self) -> Query {
        self.with_select_mode(SelectMode::Count)
    }

    pub(crate) fn with_select_mode(&self, mode: SelectMode) -> Query {
        self.derive(|d| d.select_mode = mode)
    }

    // Resets

    /// Remove every predicate on `column`, keeping the rest in place.
    pub fn reset_where(&self, column: &str) -> Query {
        match self.resolve_column(column) {
            Ok(column) => self.derive(|d| {
                let pruned = d.conditions.without_column(&column).unwrap_or_default();
                d.conditions = Arc::new(pruned);
            }),
            Err(error) => self.fail(error),
        }
    }

    /// Remove every predicate.
    pub fn clear_where(&self) -> Query {
        self.derive(|d| d.conditions = Arc::new(Condition::root()))
    }

    /// Remove every `ORDER BY` entry.
    pub fn reset_order(&self) -> Query {
        self.derive(|d| d.order_by = Arc::new(Vec::new()))
    }

    /// Remove `LIMIT`.
    pub fn reset_limit(&self) -> Query {
        self.derive(|d| d.limit = None)
    }

    /// Remove `OFFSET`.
    pub fn reset_offset(&self) -> Query {
        self.derive(|d| d.offset = None)
    }

    /// Remove every preload.
    pub fn reset_preloads(&self) -> Query {
        self.derive(|d| d.preloads = Arc::new(Vec::new()))
    }

    // Output

    /// Compile to SQL text and ordered parameters.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>), Error> {
        let compiled = self.compile()?;
        Ok((compiled.sql, compiled.params))
    }

    /// SQL with parameters inlined as literals, for reading and pasting.
    ///
    /// Never used for execution.
    pub fn to_prepared_sql(&self) -> Result<String, Error> {
        let compiled = self.compile()?;
        Ok(to_prepared_sql(&compiled.sql, &compiled.params))
    }

    /// Surface the first recorded builder error.
    pub(crate) fn check(&self) -> Result<(), Error> {
        match &self.descriptor.error {
            Some(error) => Err(error.clone().into()),
            None => Ok(()),
        }
    }

    pub(crate) fn compile(&self) -> Result<CompiledQuery, Error> {
        self.check()?;
        compile(&self.descriptor)
    }
}

/// First field a condition block set that merging would throw away.
fn discarded_part(d: &Descriptor) -> Option<&'static str> {
    if d.none {
        Some("none")
    } else if !d.preloads.is_empty() {
        Some("preload")
    } else if !d.order_by.is_empty() {
        Some("order")
    } else if !d.group_by.is_empty() {
        Some("group_by")
    } else if d.limit.is_some() || d.offset.is_some() {
        Some("limit or offset")
    } else if d.distinct != Distinct::None {
        Some("distinct")
    } else {
        None
    }
}
