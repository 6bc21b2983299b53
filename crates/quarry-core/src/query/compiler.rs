//! SQL compiler.
//!
//! [`compile`] is a pure function from a [`Descriptor`] to SQL text and an
//! ordered parameter list. Values are never spliced into the text; every
//! value becomes a `$n` placeholder numbered by emission order. The one
//! literal is the `LIMIT 1` closing an existence check, which is fixed
//! SQL rather than a caller value. The same descriptor always compiles to
//! byte-identical output.

use std::sync::Arc;

use quarry_proto::{
    ColumnRef, Combinator, Condition, Descriptor, Distinct, Operand, Operator, OrderSpec,
    Predicate, SelectMode, Value,
};

use crate::error::Error;

/// Alias given to the inner statement when a count or aggregate has to
/// wrap a paged, distinct or grouped query.
const SUBQUERY_ALIAS: &str = "subquery";

/// Output of the compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// SQL text with `$n` placeholders.
    pub sql: String,
    /// Parameters, `params[0]` binds `$1`.
    pub params: Vec<Value>,
    /// Columns of each result row, in order.
    pub columns: Arc<Vec<ColumnRef>>,
}

/// Compile a descriptor.
///
/// Fails with `UnjoinedAssociation` when a condition was reached through
/// an association that has no join.
pub fn compile(descriptor: &Descriptor) -> Result<CompiledQuery, Error> {
    check_joins(descriptor)?;

    let mut renderer = Renderer::new(descriptor.has_joins());
    let (sql, columns) = match &descriptor.select_mode {
        SelectMode::Columns => (
            renderer.rows(descriptor)?,
            descriptor.columns.clone(),
        ),
        SelectMode::Pluck(column) => {
            let list = renderer.column(column, false);
            (
                renderer.statement(descriptor, &list)?,
                Arc::new(vec![column.clone()]),
            )
        }
        SelectMode::Count => (renderer.count(descriptor)?, Arc::new(Vec::new())),
        SelectMode::Exists => (renderer.exists(descriptor)?, Arc::new(Vec::new())),
        SelectMode::Aggregate { function, column } => {
            let sql = if needs_subquery(descriptor) {
                let inner = renderer.rows(descriptor)?;
                format!(
                    "SELECT {}({}.{}) FROM ({}) AS {}",
                    function.sql_name(),
                    SUBQUERY_ALIAS,
                    column.name,
                    inner,
                    SUBQUERY_ALIAS
                )
            } else {
                format!(
                    "SELECT {}({}) {}",
                    function.sql_name(),
                    column.qualified(),
                    renderer.filtered_source(descriptor)?
                )
            };
            (sql, Arc::new(vec![column.clone()]))
        }
    };

    Ok(CompiledQuery {
        sql,
        params: renderer.params,
        columns,
    })
}

/// Counting or aggregating over these would change their meaning unless
/// the statement is wrapped.
fn needs_subquery(d: &Descriptor) -> bool {
    d.limit.is_some() || d.offset.is_some() || d.distinct != Distinct::None || !d.group_by.is_empty()
}

/// Every predicate reached through an association needs a join on that
/// path. Predicates in a join's `ON` block are relative to the join.
fn check_joins(d: &Descriptor) -> Result<(), Error> {
    let on_blocks = d.joins.iter().filter_map(|join| {
        join.nested
            .as_ref()
            .map(|nested| (Some(join.path.as_str()), &*nested.conditions))
    });
    for (prefix, conditions) in std::iter::once((None, &*d.conditions)).chain(on_blocks) {
        for predicate in conditions.predicates() {
            let Some(association) = &predicate.association else {
                continue;
            };
            let path = match prefix {
                Some(prefix) => format!("{}.{}", prefix, association),
                None => association.clone(),
            };
            if d.join(&path).is_none() {
                return Err(Error::UnjoinedAssociation { association: path });
            }
        }
    }
    Ok(())
}

struct Renderer {
    params: Vec<Value>,
    qualify: bool,
}

impl Renderer {
    fn new(qualify: bool) -> Self {
        Self {
            params: Vec::new(),
            qualify,
        }
    }

    fn bind(&mut self, value: &Value) -> String {
        self.params.push(value.clone());
        format!("${}", self.params.len())
    }

    fn bind_count(&mut self, n: u64) -> String {
        let n = i64::try_from(n).unwrap_or(i64::MAX);
        self.bind(&Value::Int64(n))
    }

    fn column(&self, column: &ColumnRef, force: bool) -> String {
        if self.qualify || force {
            column.qualified()
        } else {
            column.name.clone()
        }
    }

    /// Full row select: every column in declaration order.
    fn rows(&mut self, d: &Descriptor) -> Result<String, Error> {
        let list = d
            .columns
            .iter()
            .map(|c| self.column(c, false))
            .collect::<Vec<_>>()
            .join(", ");
        self.statement(d, &list)
    }

    fn statement(&mut self, d: &Descriptor, list: &str) -> Result<String, Error> {
        let mut sql = String::from("SELECT ");
        match &d.distinct {
            Distinct::None => {}
            Distinct::All => sql.push_str("DISTINCT "),
            Distinct::On(column) => {
                sql.push_str(&format!("DISTINCT ON ({}) ", self.column(column, false)));
            }
        }
        sql.push_str(list);
        sql.push(' ');
        sql.push_str(&self.filtered_source(d)?);

        if !d.group_by.is_empty() {
            let cols: Vec<String> = d.group_by.iter().map(|c| self.column(c, false)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }
        if !d.order_by.is_empty() {
            let entries: Vec<String> = d.order_by.iter().map(|o| self.order(o)).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&entries.join(", "));
        }
        if let Some(limit) = d.limit {
            let p = self.bind_count(limit);
            sql.push_str(" LIMIT ");
            sql.push_str(&p);
        }
        if let Some(offset) = d.offset {
            let p = self.bind_count(offset);
            sql.push_str(" OFFSET ");
            sql.push_str(&p);
        }
        Ok(sql)
    }

    fn count(&mut self, d: &Descriptor) -> Result<String, Error> {
        if needs_subquery(d) {
            let inner = self.rows(d)?;
            return Ok(format!(
                "SELECT COUNT(*) FROM ({}) AS {}",
                inner, SUBQUERY_ALIAS
            ));
        }
        Ok(format!("SELECT COUNT(*) {}", self.filtered_source(d)?))
    }

    fn exists(&mut self, d: &Descriptor) -> Result<String, Error> {
        if needs_subquery(d) {
            let inner = self.rows(d)?;
            return Ok(format!(
                "SELECT 1 FROM ({}) AS {} LIMIT 1",
                inner, SUBQUERY_ALIAS
            ));
        }
        Ok(format!("SELECT 1 {} LIMIT 1", self.filtered_source(d)?))
    }

    /// `FROM`, joins and `WHERE`.
    fn filtered_source(&mut self, d: &Descriptor) -> Result<String, Error> {
        let mut sql = format!("FROM {}", d.table);
        for join in d.joins.iter() {
            sql.push_str(&format!(
                " {} JOIN {} ON {} = {}",
                join.kind.keyword(),
                join.table,
                join.local.qualified(),
                join.foreign.qualified()
            ));
            if let Some(nested) = &join.nested {
                if let Some(extra) = self.condition(&nested.conditions, Some(Combinator::And))? {
                    sql.push_str(" AND ");
                    sql.push_str(&extra);
                }
            }
        }
        if d.none {
            sql.push_str(" WHERE FALSE");
        } else if let Some(clause) = self.condition(&d.conditions, None)? {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        Ok(sql)
    }

    fn order(&self, order: &OrderSpec) -> String {
        let mut entry = format!(
            "{} {}",
            self.column(&order.column, false),
            order.direction.keyword()
        );
        if let Some(nulls) = order.nulls {
            entry.push(' ');
            entry.push_str(nulls.keyword());
        }
        entry
    }

    /// Render a condition tree. `parent` is the combinator of the
    /// enclosing group, `None` at the top of a clause.
    fn condition(
        &mut self,
        condition: &Condition,
        parent: Option<Combinator>,
    ) -> Result<Option<String>, Error> {
        let group = match condition {
            Condition::Leaf(predicate) => return self.predicate(predicate).map(Some),
            Condition::Group(group) => group,
        };

        let live: Vec<&Condition> = group
            .children
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| !c.is_empty())
            .collect();
        if live.is_empty() {
            return Ok(None);
        }
        if live.len() == 1 && !group.parenthesized && !group.negated {
            return self.condition(live[0], parent);
        }

        let mut parts = Vec::with_capacity(live.len());
        for child in live {
            if let Some(part) = self.condition(child, Some(group.combinator))? {
                parts.push(part);
            }
        }
        let body = parts.join(&format!(" {} ", group.combinator.keyword()));

        if group.negated {
            Ok(Some(format!("NOT ({})", body)))
        } else if parent.is_some() && (group.parenthesized || parent != Some(group.combinator)) {
            Ok(Some(format!("({})", body)))
        } else {
            Ok(Some(body))
        }
    }

    fn predicate(&mut self, p: &Predicate) -> Result<String, Error> {
        let column = self.column(&p.column, p.association.is_some());
        let not = if p.needs_not_keyword() { "NOT " } else { "" };
        let operator = p.effective_operator();

        let sql = match (operator, &p.operand) {
            (Operator::IsNull, Operand::None) => format!("{} IS NULL", column),
            (Operator::IsNotNull, Operand::None) => format!("{} IS NOT NULL", column),
            (Operator::In, Operand::List(values)) => {
                if values.is_empty() {
                    return Ok(if p.negated { "TRUE" } else { "FALSE" }.to_string());
                }
                let placeholders: Vec<String> = values.iter().map(|v| self.bind(v)).collect();
                format!("{} {}IN ({})", column, not, placeholders.join(","))
            }
            (Operator::Between, Operand::Pair(low, high)) => {
                let low = self.bind(low);
                let high = self.bind(high);
                format!("{} {}BETWEEN {} AND {}", column, not, low, high)
            }
            (Operator::Any, Operand::Single(value)) => {
                let any = format!("{} = ANY({})", self.bind(value), column);
                if p.negated {
                    format!("NOT ({})", any)
                } else {
                    any
                }
            }
            (Operator::Like, Operand::Single(value)) => {
                format!("{} {}LIKE {}", column, not, self.bind(value))
            }
            (Operator::ILike, Operand::Single(value)) => {
                format!("{} {}ILIKE {}", column, not, self.bind(value))
            }
            (op, Operand::Single(value)) => match comparison_symbol(op) {
                Some(symbol) => format!("{} {} {}", column, symbol, self.bind(value)),
                None => return Err(operand_mismatch(p)),
            },
            _ => return Err(operand_mismatch(p)),
        };
        Ok(sql)
    }
}

fn operand_mismatch(p: &Predicate) -> Error {
    Error::InvalidArgument(format!(
        "operator `{}` cannot take {} value(s) on {}",
        p.operator.method_name(),
        p.operand.param_count(),
        p.column.qualified()
    ))
}

fn comparison_symbol(op: Operator) -> Option<&'static str> {
    match op {
        Operator::Eq => Some("="),
        Operator::NotEq => Some("<>"),
        Operator::Gt => Some(">"),
        Operator::Gte => Some(">="),
        Operator::Lt => Some("<"),
        Operator::Lte => Some("<="),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quarry_proto::{AggregateFunction, ColumnType, ScalarType};

    fn col(name: &str, scalar: ScalarType) -> ColumnRef {
        ColumnRef::new("users", name, ColumnType::scalar(scalar))
    }

    fn users() -> Descriptor {
        let id = col("id", ScalarType::Int64);
        Descriptor::new(
            "users",
            Arc::new(vec![
                id.clone(),
                col("name", ScalarType::String),
                col("age", ScalarType::Int32),
            ]),
            Some(id),
        )
    }

    fn with_age_over(mut d: Descriptor, age: i32) -> Descriptor {
        let p = Predicate::new(
            col("age", ScalarType::Int32),
            Operator::Gt,
            Operand::Single(age.into()),
        );
        d.conditions = Arc::new(d.conditions.and(Condition::leaf(p)));
        d
    }

    #[test]
    fn test_plain_select() {
        let compiled = compile(&users()).unwrap();
        assert_eq!(compiled.sql, "SELECT id, name, age FROM users");
        assert!(compiled.params.is_empty());
        assert_eq!(compiled.columns.len(), 3);
    }

    #[test]
    fn test_deterministic() {
        let mut d = with_age_over(users(), 3);
        d.limit = Some(10);
        assert_eq!(compile(&d).unwrap(), compile(&d).unwrap());
    }

    #[test]
    fn test_clause_order() {
        let mut d = with_age_over(users(), 3);
        d.distinct = Distinct::On(col("name", ScalarType::String));
        d.group_by = Arc::new(vec![col("name", ScalarType::String)]);
        d.order_by = Arc::new(vec![OrderSpec::desc(col("age", ScalarType::Int32))]);
        d.limit = Some(10);
        d.offset = Some(20);
        let compiled = compile(&d).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT DISTINCT ON (name) id, name, age FROM users WHERE age > $1 \
             GROUP BY name ORDER BY age DESC LIMIT $2 OFFSET $3"
        );
        assert_eq!(
            compiled.params,
            vec![Value::Int32(3), Value::Int64(10), Value::Int64(20)]
        );
    }

    #[test]
    fn test_count_discards_order_and_columns() {
        let mut d = with_age_over(users(), 3);
        d.order_by = Arc::new(vec![OrderSpec::asc(col("name", ScalarType::String))]);
        d.select_mode = SelectMode::Count;
        assert_eq!(
            compile(&d).unwrap().sql,
            "SELECT COUNT(*) FROM users WHERE age > $1"
        );
    }

    #[test]
    fn test_count_wraps_paged_query() {
        let mut d = users();
        d.limit = Some(5);
        d.select_mode = SelectMode::Count;
        let compiled = compile(&d).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT COUNT(*) FROM (SELECT id, name, age FROM users LIMIT $1) AS subquery"
        );
        assert_eq!(compiled.params, vec![Value::Int64(5)]);
    }

    #[test]
    fn test_aggregate() {
        let mut d = with_age_over(users(), 3);
        d.select_mode = SelectMode::Aggregate {
            function: AggregateFunction::Sum,
            column: col("age", ScalarType::Int32),
        };
        assert_eq!(
            compile(&d).unwrap().sql,
            "SELECT SUM(users.age) FROM users WHERE age > $1"
        );

        d.distinct = Distinct::All;
        assert_eq!(
            compile(&d).unwrap().sql,
            "SELECT SUM(subquery.age) FROM (SELECT DISTINCT id, name, age FROM users WHERE age > $1) AS subquery"
        );
    }

    #[test]
    fn test_exists_check() {
        let mut d = with_age_over(users(), 3);
        d.select_mode = SelectMode::Exists;
        let compiled = compile(&d).unwrap();
        assert_eq!(compiled.sql, "SELECT 1 FROM users WHERE age > $1 LIMIT 1");
        assert_eq!(compiled.params, vec![Value::Int32(3)]);

        d.limit = Some(5);
        let compiled = compile(&d).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT 1 FROM (SELECT id, name, age FROM users WHERE age > $1 LIMIT $2) AS subquery LIMIT 1"
        );
        assert_eq!(compiled.params, vec![Value::Int32(3), Value::Int64(5)]);
    }

    #[test]
    fn test_pluck() {
        let mut d = users();
        d.select_mode = SelectMode::Pluck(col("name", ScalarType::String));
        d.distinct = Distinct::All;
        let compiled = compile(&d).unwrap();
        assert_eq!(compiled.sql, "SELECT DISTINCT name FROM users");
        assert_eq!(compiled.columns[0].name, "name");
    }

    #[test]
    fn test_none_renders_false() {
        let mut d = with_age_over(users(), 3);
        d.none = true;
        let compiled = compile(&d).unwrap();
        assert_eq!(compiled.sql, "SELECT id, name, age FROM users WHERE FALSE");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_operand_mismatch() {
        let mut d = users();
        let p = Predicate::new(col("age", ScalarType::Int32), Operator::Between, Operand::None);
        d.conditions = Arc::new(d.conditions.and(Condition::leaf(p)));
        assert!(matches!(compile(&d), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_unjoined_association() {
        let mut d = users();
        let mut p = Predicate::new(
            ColumnRef::new("posts", "title", ColumnType::scalar(ScalarType::String)),
            Operator::Eq,
            Operand::Single("x".into()),
        );
        p.association = Some("posts".into());
        d.conditions = Arc::new(d.conditions.and(Condition::leaf(p)));
        assert!(matches!(
            compile(&d),
            Err(Error::UnjoinedAssociation { .. })
        ));
    }
}
