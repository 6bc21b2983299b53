//! Column predicates.

use quarry_proto::{BuildError, ColumnRef, Condition, Operand, Operator, Predicate, Value};

use super::builder::Query;

/// A pending predicate on one column, opened by [`Query::col`].
///
/// Each operator method closes the predicate and returns the extended
/// query. [`not`](ColumnFilter::not) negates the next operator.
///
/// Plain methods reject nulls with a `NullArgument` error. The `nilable_*`
/// variants accept them: the equality family turns a null into `IS NULL`,
/// the comparison family into no constraint at all.
#[derive(Debug, Clone)]
#[must_use = "a column filter does nothing until an operator is applied"]
pub struct ColumnFilter {
    query: Query,
    column: ColumnRef,
    negated: bool,
}

impl ColumnFilter {
    pub(crate) fn new(query: Query, column: ColumnRef) -> Self {
        Self {
            query,
            column,
            negated: false,
        }
    }

    /// Negate the next operator: `eq` becomes `<>`, `in_list` becomes
    /// `NOT IN`, and so on.
    pub fn not(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// `column = value`
    pub fn eq(self, value: impl Into<Value>) -> Query {
        self.single(Operator::Eq, value.into())
    }

    /// `column > value`
    pub fn gt(self, value: impl Into<Value>) -> Query {
        self.single(Operator::Gt, value.into())
    }

    /// `column >= value`
    pub fn gte(self, value: impl Into<Value>) -> Query {
        self.single(Operator::Gte, value.into())
    }

    /// `column < value`
    pub fn lt(self, value: impl Into<Value>) -> Query {
        self.single(Operator::Lt, value.into())
    }

    /// `column <= value`
    pub fn lte(self, value: impl Into<Value>) -> Query {
        self.single(Operator::Lte, value.into())
    }

    /// `column LIKE pattern`
    pub fn like(self, pattern: impl Into<Value>) -> Query {
        self.single(Operator::Like, pattern.into())
    }

    /// `column ILIKE pattern`
    pub fn ilike(self, pattern: impl Into<Value>) -> Query {
        self.single(Operator::ILike, pattern.into())
    }

    /// `column IN (...)`. An empty set matches nothing.
    pub fn in_list<I, V>(self, values: I) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.iter().any(Value::is_null) {
            return self.null_argument(Operator::In);
        }
        self.push(Operator::In, Operand::List(values))
    }

    /// `column IS NULL` when `nil` is true, `column IS NOT NULL` otherwise.
    pub fn is_nil(self, nil: bool) -> Query {
        let operator = if nil {
            Operator::IsNull
        } else {
            Operator::IsNotNull
        };
        self.push(operator, Operand::None)
    }

    /// `column BETWEEN low AND high`
    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Query {
        let (low, high) = (low.into(), high.into());
        if low.is_null() || high.is_null() {
            return self.null_argument(Operator::Between);
        }
        self.push(Operator::Between, Operand::Pair(low, high))
    }

    /// `value = ANY(column)` on an array column.
    pub fn includes(self, value: impl Into<Value>) -> Query {
        if !self.column.column_type.is_array() {
            let error = BuildError::InvalidArgument(format!(
                "includes requires an array column, {} is not one",
                self.column.qualified()
            ));
            return self.query.fail(error);
        }
        self.single(Operator::Any, value.into())
    }

    /// Like [`eq`](Self::eq), with null meaning `IS NULL`.
    pub fn nilable_eq(self, value: impl Into<Value>) -> Query {
        let value = value.into();
        if value.is_null() {
            return self.is_nil(true);
        }
        self.eq(value)
    }

    /// Like [`in_list`](Self::in_list), with `None` meaning `IS NULL`.
    pub fn nilable_in_list<I, V>(self, values: Option<I>) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        match values {
            Some(values) => self.in_list(values),
            None => self.is_nil(true),
        }
    }

    /// Like [`gt`](Self::gt), with null meaning no constraint.
    pub fn nilable_gt(self, value: impl Into<Value>) -> Query {
        self.optional(value.into(), |f, v| f.gt(v))
    }

    /// Like [`gte`](Self::gte), with null meaning no constraint.
    pub fn nilable_gte(self, value: impl Into<Value>) -> Query {
        self.optional(value.into(), |f, v| f.gte(v))
    }

    /// Like [`lt`](Self::lt), with null meaning no constraint.
    pub fn nilable_lt(self, value: impl Into<Value>) -> Query {
        self.optional(value.into(), |f, v| f.lt(v))
    }

    /// Like [`lte`](Self::lte), with null meaning no constraint.
    pub fn nilable_lte(self, value: impl Into<Value>) -> Query {
        self.optional(value.into(), |f, v| f.lte(v))
    }

    /// Like [`like`](Self::like), with null meaning no constraint.
    pub fn nilable_like(self, pattern: impl Into<Value>) -> Query {
        self.optional(pattern.into(), |f, v| f.like(v))
    }

    /// Like [`ilike`](Self::ilike), with null meaning no constraint.
    pub fn nilable_ilike(self, pattern: impl Into<Value>) -> Query {
        self.optional(pattern.into(), |f, v| f.ilike(v))
    }

    fn optional(self, value: Value, apply: fn(Self, Value) -> Query) -> Query {
        if value.is_null() {
            self.query
        } else {
            apply(self, value)
        }
    }

    fn single(self, operator: Operator, value: Value) -> Query {
        if value.is_null() {
            return self.null_argument(operator);
        }
        self.push(operator, Operand::Single(value))
    }

    fn null_argument(self, operator: Operator) -> Query {
        let method = if self.negated {
            format!("not.{}", operator.method_name())
        } else {
            operator.method_name().to_string()
        };
        self.query.fail(BuildError::NullArgument {
            table: self.column.table.clone(),
            column: self.column.name.clone(),
            operator: method,
        })
    }

    fn push(self, operator: Operator, operand: Operand) -> Query {
        let predicate = Predicate::new(self.column, operator, operand).with_negated(self.negated);
        self.query.and_condition(Condition::leaf(predicate))
    }
}
