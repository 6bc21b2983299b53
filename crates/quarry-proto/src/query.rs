//! Query descriptor IR.
//!
//! A [`Descriptor`] is the immutable in-memory form of a SELECT statement:
//! a condition tree, a join graph, a preload plan and the ordering,
//! grouping, paging and projection flags. Sub-parts are held behind `Arc`
//! so that deriving a new descriptor shares everything it did not touch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::types::ColumnType;
use crate::value::Value;

/// Typed handle to a table column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Table the column belongs to.
    pub table: String,
    /// Column name.
    pub name: String,
    /// Declared column type.
    pub column_type: ColumnType,
}

impl ColumnRef {
    /// Create a column reference.
    pub fn new(table: impl Into<String>, name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            column_type,
        }
    }

    /// `table.column` form.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.name)
    }

    /// Check if both references point at the same table column.
    pub fn same_column(&self, other: &ColumnRef) -> bool {
        self.table == other.table && self.name == other.name
    }
}

/// Comparison operators a predicate can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `LIKE`
    Like,
    /// `ILIKE`
    ILike,
    /// `IN (...)`
    In,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
    /// `$n = ANY(column)`
    Any,
    /// `BETWEEN $a AND $b`
    Between,
}

impl Operator {
    /// Operator name used by builder methods and error messages.
    pub fn method_name(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::NotEq => "not_eq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Like => "like",
            Operator::ILike => "ilike",
            Operator::In => "in_list",
            Operator::IsNull => "is_nil",
            Operator::IsNotNull => "is_not_nil",
            Operator::Any => "includes",
            Operator::Between => "between",
        }
    }

    /// The operator that selects the complement of this one.
    ///
    /// `In`, `Like`, `ILike`, `Any` and `Between` have no single-token
    /// complement and return themselves; the renderer adds `NOT` for those.
    pub fn negate(&self) -> Operator {
        match self {
            Operator::Eq => Operator::NotEq,
            Operator::NotEq => Operator::Eq,
            Operator::Gt => Operator::Lte,
            Operator::Gte => Operator::Lt,
            Operator::Lt => Operator::Gte,
            Operator::Lte => Operator::Gt,
            Operator::IsNull => Operator::IsNotNull,
            Operator::IsNotNull => Operator::IsNull,
            other => *other,
        }
    }

    /// Whether negation is expressed by flipping the operator token.
    pub fn has_complement(&self) -> bool {
        self.negate() != *self
    }
}

/// Right-hand side of a predicate. Arity depends on the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// No value (`IS NULL`, `IS NOT NULL`).
    None,
    /// One value.
    Single(Value),
    /// Two values (`BETWEEN`).
    Pair(Value, Value),
    /// A set of values (`IN`).
    List(Vec<Value>),
}

impl Operand {
    /// Number of parameters this operand binds.
    pub fn param_count(&self) -> usize {
        match self {
            Operand::None => 0,
            Operand::Single(_) => 1,
            Operand::Pair(_, _) => 2,
            Operand::List(values) => values.len(),
        }
    }
}

/// A single column comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Column being compared.
    pub column: ColumnRef,
    /// Comparison operator.
    pub operator: Operator,
    /// Compared value(s).
    pub operand: Operand,
    /// Whether the comparison is negated.
    pub negated: bool,
    /// Association path the column was reached through, if any.
    ///
    /// Set when conditions from an associated table are merged into the
    /// owning query; such columns are always rendered table-qualified and
    /// require a join on this path.
    pub association: Option<String>,
}

impl Predicate {
    /// Create a predicate.
    pub fn new(column: ColumnRef, operator: Operator, operand: Operand) -> Self {
        Self {
            column,
            operator,
            operand,
            negated: false,
            association: None,
        }
    }

    /// Set the negation flag.
    pub fn with_negated(mut self, negated: bool) -> Self {
        self.negated = negated;
        self
    }

    /// Operator after applying the negation flag, when it has a complement.
    pub fn effective_operator(&self) -> Operator {
        if self.negated && self.operator.has_complement() {
            self.operator.negate()
        } else {
            self.operator
        }
    }

    /// Whether `NOT` must be rendered explicitly.
    pub fn needs_not_keyword(&self) -> bool {
        self.negated && !self.operator.has_complement()
    }
}

/// Boolean combinator of a condition group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Combinator {
    /// All children must hold.
    And,
    /// At least one child must hold.
    Or,
}

impl Combinator {
    /// SQL keyword.
    pub fn keyword(&self) -> &'static str {
        match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
        }
    }
}

/// An ordered group of conditions joined by one combinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// How children combine.
    pub combinator: Combinator,
    /// Child conditions, in the order they were added.
    pub children: Vec<Arc<Condition>>,
    /// Force parentheses even where precedence would not require them.
    pub parenthesized: bool,
    /// Render as `NOT (...)`.
    pub negated: bool,
}

impl Group {
    /// Create an empty group.
    pub fn new(combinator: Combinator) -> Self {
        Self {
            combinator,
            children: Vec::new(),
            parenthesized: false,
            negated: false,
        }
    }

    /// A group new siblings can be appended to without changing its meaning.
    fn is_open(&self, combinator: Combinator) -> bool {
        self.combinator == combinator && !self.parenthesized && !self.negated
    }
}

/// Condition tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// A single predicate.
    Leaf(Predicate),
    /// A combination of child conditions.
    Group(Group),
}

impl Condition {
    /// The empty AND group every descriptor starts with.
    pub fn root() -> Self {
        Condition::Group(Group::new(Combinator::And))
    }

    /// Wrap a predicate.
    pub fn leaf(predicate: Predicate) -> Self {
        Condition::Leaf(predicate)
    }

    /// True when the tree contains no predicate at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Condition::Leaf(_) => false,
            Condition::Group(group) => group.children.iter().all(|c| c.is_empty()),
        }
    }

    /// Combine with `other` under AND, appending to the open root group.
    pub fn and(&self, other: Condition) -> Condition {
        self.combine(Combinator::And, other)
    }

    /// Combine with `other` under OR.
    ///
    /// The accumulated conditions become one side of the OR; repeated calls
    /// extend the same OR group rather than nesting.
    pub fn or(&self, other: Condition) -> Condition {
        self.combine(Combinator::Or, other)
    }

    fn combine(&self, combinator: Combinator, other: Condition) -> Condition {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return match combinator {
                Combinator::And => {
                    let mut group = Group::new(Combinator::And);
                    group.children.push(Arc::new(other));
                    Condition::Group(group)
                }
                Combinator::Or => other,
            };
        }

        match self {
            Condition::Group(group) if group.is_open(combinator) => {
                let mut group = group.clone();
                group.children.push(Arc::new(other));
                Condition::Group(group)
            }
            _ => {
                let mut group = Group::new(combinator);
                group.children.push(Arc::new(self.clone()));
                group.children.push(Arc::new(other));
                Condition::Group(group)
            }
        }
    }

    /// Mark this condition as an explicit parenthesized group.
    pub fn parenthesized(self) -> Condition {
        match self {
            Condition::Group(mut group) => {
                group.parenthesized = true;
                Condition::Group(group)
            }
            leaf => {
                let mut group = Group::new(Combinator::And);
                group.parenthesized = true;
                group.children.push(Arc::new(leaf));
                Condition::Group(group)
            }
        }
    }

    /// Wrap this condition in `NOT (...)`.
    pub fn negated(self) -> Condition {
        match self.parenthesized() {
            Condition::Group(mut group) => {
                group.negated = !group.negated;
                Condition::Group(group)
            }
            leaf => leaf,
        }
    }

    /// Copy of the tree with every leaf on `column` removed.
    ///
    /// Groups left without children disappear; the order of the remaining
    /// predicates is preserved. Returns `None` if nothing is left.
    pub fn without_column(&self, column: &ColumnRef) -> Option<Condition> {
        match self {
            Condition::Leaf(predicate) => {
                if predicate.column.same_column(column) && predicate.association.is_none() {
                    None
                } else {
                    Some(self.clone())
                }
            }
            Condition::Group(group) => {
                let children: Vec<Arc<Condition>> = group
                    .children
                    .iter()
                    .filter_map(|child| child.without_column(column).map(Arc::new))
                    .collect();
                if children.is_empty() {
                    None
                } else {
                    Some(Condition::Group(Group {
                        children,
                        ..group.clone()
                    }))
                }
            }
        }
    }

    /// Copy of the tree with every leaf marked as reached through `path`.
    ///
    /// Leaves already tagged by a nested association get `path` prefixed.
    pub fn through_association(&self, path: &str) -> Condition {
        match self {
            Condition::Leaf(predicate) => {
                let mut predicate = predicate.clone();
                predicate.association = Some(match &predicate.association {
                    Some(inner) => format!("{}.{}", path, inner),
                    None => path.to_string(),
                });
                Condition::Leaf(predicate)
            }
            Condition::Group(group) => Condition::Group(Group {
                children: group
                    .children
                    .iter()
                    .map(|child| Arc::new(child.through_association(path)))
                    .collect(),
                ..group.clone()
            }),
        }
    }

    /// All predicates in rendering order.
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.collect_predicates(&mut out);
        out
    }

    fn collect_predicates<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        match self {
            Condition::Leaf(predicate) => out.push(predicate),
            Condition::Group(group) => {
                for child in &group.children {
                    child.collect_predicates(out);
                }
            }
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::root()
    }
}

/// Join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
    /// `FULL JOIN`
    Full,
}

impl JoinKind {
    /// SQL keyword preceding `JOIN`.
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        }
    }
}

/// A join on an association.
///
/// At most one join exists per association path within a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Dot-separated association path (`posts`, `posts.comments`).
    pub path: String,
    /// Join kind.
    pub kind: JoinKind,
    /// Joined table.
    pub table: String,
    /// Column on the already-joined side.
    pub local: ColumnRef,
    /// Column on the joined table.
    pub foreign: ColumnRef,
    /// Extra conditions on the joined side, rendered into the `ON` clause.
    pub nested: Option<Arc<Descriptor>>,
}

impl JoinSpec {
    /// Association name (last segment of the path).
    pub fn association(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }
}

/// An eager, batched follow-up fetch of an association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreloadSpec {
    /// Association name on the parent table.
    pub association: String,
    /// Conditions, ordering and limits applied to the children.
    pub nested: Option<Arc<Descriptor>>,
    /// Preloads resolved against the fetched children.
    pub preloads: Vec<PreloadSpec>,
}

impl PreloadSpec {
    /// Create a preload with no refinement.
    pub fn new(association: impl Into<String>) -> Self {
        Self {
            association: association.into(),
            nested: None,
            preloads: Vec::new(),
        }
    }

    /// Depth of the preload tree rooted here.
    pub fn depth(&self) -> usize {
        1 + self.preloads.iter().map(PreloadSpec::depth).max().unwrap_or(0)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl OrderDirection {
    /// SQL keyword.
    pub fn keyword(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }

    /// The opposite direction.
    pub fn reverse(&self) -> Self {
        match self {
            OrderDirection::Asc => OrderDirection::Desc,
            OrderDirection::Desc => OrderDirection::Asc,
        }
    }
}

/// Placement of nulls in an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullsPolicy {
    /// `NULLS FIRST`
    First,
    /// `NULLS LAST`
    Last,
}

impl NullsPolicy {
    /// SQL suffix.
    pub fn keyword(&self) -> &'static str {
        match self {
            NullsPolicy::First => "NULLS FIRST",
            NullsPolicy::Last => "NULLS LAST",
        }
    }

    /// The opposite placement.
    pub fn reverse(&self) -> Self {
        match self {
            NullsPolicy::First => NullsPolicy::Last,
            NullsPolicy::Last => NullsPolicy::First,
        }
    }
}

/// One `ORDER BY` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Sorted column.
    pub column: ColumnRef,
    /// Sort direction.
    pub direction: OrderDirection,
    /// Optional null placement.
    pub nulls: Option<NullsPolicy>,
}

impl OrderSpec {
    /// Create ascending order.
    pub fn asc(column: ColumnRef) -> Self {
        Self {
            column,
            direction: OrderDirection::Asc,
            nulls: None,
        }
    }

    /// Create descending order.
    pub fn desc(column: ColumnRef) -> Self {
        Self {
            column,
            direction: OrderDirection::Desc,
            nulls: None,
        }
    }

    /// Set null placement.
    pub fn with_nulls(mut self, nulls: NullsPolicy) -> Self {
        self.nulls = Some(nulls);
        self
    }

    /// Same column, opposite direction and null placement.
    pub fn reversed(&self) -> Self {
        Self {
            column: self.column.clone(),
            direction: self.direction.reverse(),
            nulls: self.nulls.map(|n| n.reverse()),
        }
    }
}

/// `DISTINCT` flavour.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Distinct {
    /// No `DISTINCT`.
    #[default]
    None,
    /// `SELECT DISTINCT`.
    All,
    /// `SELECT DISTINCT ON (column)`.
    On(ColumnRef),
}

/// Aggregate function types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    /// Sum of numeric values.
    Sum,
    /// Average of numeric values.
    Avg,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
}

impl AggregateFunction {
    /// SQL function name.
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

/// What the statement selects.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectMode {
    /// Every column of the table, in declaration order.
    #[default]
    Columns,
    /// `COUNT(*)`.
    Count,
    /// A single aggregate over one column.
    Aggregate {
        function: AggregateFunction,
        column: ColumnRef,
    },
    /// Existence check: `SELECT 1 ... LIMIT 1`.
    Exists,
    /// A single column's values.
    Pluck(ColumnRef),
}

impl SelectMode {
    /// Whether rows of this mode materialize into records.
    pub fn materializes_records(&self) -> bool {
        matches!(self, SelectMode::Columns)
    }
}

/// Immutable description of a SELECT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Root table.
    pub table: String,
    /// Root table columns in declaration order.
    pub columns: Arc<Vec<ColumnRef>>,
    /// Root table primary key, if it declares one.
    pub primary_key: Option<ColumnRef>,
    /// WHERE condition tree.
    pub conditions: Arc<Condition>,
    /// Joins in the order they were first declared.
    pub joins: Arc<Vec<JoinSpec>>,
    /// Preloads in declaration order.
    pub preloads: Arc<Vec<PreloadSpec>>,
    /// ORDER BY entries.
    pub order_by: Arc<Vec<OrderSpec>>,
    /// GROUP BY columns.
    pub group_by: Arc<Vec<ColumnRef>>,
    /// LIMIT.
    pub limit: Option<u64>,
    /// OFFSET.
    pub offset: Option<u64>,
    /// DISTINCT flavour.
    pub distinct: Distinct,
    /// Projection.
    pub select_mode: SelectMode,
    /// `none` mode: executes to an empty result without touching the driver.
    pub none: bool,
    /// First builder-stage problem, surfaced at compile or execution time.
    pub error: Option<BuildError>,
}

impl Descriptor {
    /// Create an unconstrained descriptor over a table.
    pub fn new(
        table: impl Into<String>,
        columns: Arc<Vec<ColumnRef>>,
        primary_key: Option<ColumnRef>,
    ) -> Self {
        Self {
            table: table.into(),
            columns,
            primary_key,
            conditions: Arc::new(Condition::root()),
            joins: Arc::new(Vec::new()),
            preloads: Arc::new(Vec::new()),
            order_by: Arc::new(Vec::new()),
            group_by: Arc::new(Vec::new()),
            limit: None,
            offset: None,
            distinct: Distinct::None,
            select_mode: SelectMode::Columns,
            none: false,
            error: None,
        }
    }

    /// Get a join by association path.
    pub fn join(&self, path: &str) -> Option<&JoinSpec> {
        self.joins.iter().find(|j| j.path == path)
    }

    /// Whether any join is present.
    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    /// Record a builder-stage problem, keeping the first one.
    pub fn record_error(&mut self, error: BuildError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}
