//! Aggregate terminals: SUM, AVG, MIN and MAX over one column.

use quarry_proto::{AggregateFunction, ColumnRef, SelectMode, Value};

use super::builder::Query;
use super::executor::Executor;
use crate::driver::ConnectionPool;
use crate::error::Error;

impl<P: ConnectionPool> Executor<P> {
    /// `SUM(column)`, or `None` when no row matches.
    ///
    /// Integer columns sum to `Int64`, float columns to `Float64`.
    pub fn select_sum(&self, query: &Query, column: &str) -> Result<Option<Value>, Error> {
        self.aggregate(query, AggregateFunction::Sum, column)
    }

    /// `AVG(column)` as `Float64`, or `None` when no row matches.
    pub fn select_avg(&self, query: &Query, column: &str) -> Result<Option<Value>, Error> {
        self.aggregate(query, AggregateFunction::Avg, column)
    }

    /// `MIN(column)`, or `None` when no row matches.
    pub fn select_min(&self, query: &Query, column: &str) -> Result<Option<Value>, Error> {
        self.aggregate(query, AggregateFunction::Min, column)
    }

    /// `MAX(column)`, or `None` when no row matches.
    pub fn select_max(&self, query: &Query, column: &str) -> Result<Option<Value>, Error> {
        self.aggregate(query, AggregateFunction::Max, column)
    }

    /// Like [`select_sum`](Self::select_sum), with zero in place of `None`.
    pub fn select_sum_or_zero(&self, query: &Query, column: &str) -> Result<Value, Error> {
        self.aggregate_or_zero(query, AggregateFunction::Sum, column)
    }

    /// Like [`select_avg`](Self::select_avg), with `0.0` in place of `None`.
    pub fn select_avg_or_zero(&self, query: &Query, column: &str) -> Result<Value, Error> {
        self.aggregate_or_zero(query, AggregateFunction::Avg, column)
    }

    /// Like [`select_min`](Self::select_min), with zero in place of `None`.
    pub fn select_min_or_zero(&self, query: &Query, column: &str) -> Result<Value, Error> {
        self.aggregate_or_zero(query, AggregateFunction::Min, column)
    }

    /// Like [`select_max`](Self::select_max), with zero in place of `None`.
    pub fn select_max_or_zero(&self, query: &Query, column: &str) -> Result<Value, Error> {
        self.aggregate_or_zero(query, AggregateFunction::Max, column)
    }

    fn aggregate(
        &self,
        query: &Query,
        function: AggregateFunction,
        column: &str,
    ) -> Result<Option<Value>, Error> {
        query.check()?;
        let column = query.resolve_column(column)?;
        if matches!(function, AggregateFunction::Sum | AggregateFunction::Avg)
            && !is_numeric(&column)
        {
            return Err(Error::InvalidArgument(format!(
                "{} requires a numeric column, {} is not one",
                function.sql_name(),
                column.qualified()
            )));
        }
        if query.descriptor().none {
            return Ok(None);
        }

        let value = self.scalar(&query.with_select_mode(SelectMode::Aggregate {
            function,
            column: column.clone(),
        }))?;
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(value) => normalize(function, &column, value).map(Some),
        }
    }

    fn aggregate_or_zero(
        &self,
        query: &Query,
        function: AggregateFunction,
        column: &str,
    ) -> Result<Value, Error> {
        let resolved = query.resolve_column(column)?;
        let zero = zero(function, &resolved)?;
        Ok(self.aggregate(query, function, column)?.unwrap_or(zero))
    }
}

fn is_numeric(column: &ColumnRef) -> bool {
    !column.column_type.is_array() && column.column_type.scalar_type().is_numeric()
}

fn zero(function: AggregateFunction, column: &ColumnRef) -> Result<Value, Error> {
    let scalar = column.column_type.scalar_type();
    if !is_numeric(column) {
        return Err(Error::InvalidArgument(format!(
            "no zero value for {} column {}",
            function.sql_name(),
            column.qualified()
        )));
    }
    Ok(match function {
        AggregateFunction::Avg => Value::Float64(0.0),
        _ if scalar.is_integer() => Value::Int64(0),
        _ => Value::Float64(0.0),
    })
}

/// Coerce a driver's aggregate result into the column's numeric domain.
///
/// Drivers hand back sums and averages as integers, floats or decimal text.
fn normalize(function: AggregateFunction, column: &ColumnRef, value: Value) -> Result<Value, Error> {
    let integral = column.column_type.scalar_type().is_integer();
    let decoded = match function {
        AggregateFunction::Min | AggregateFunction::Max => return Ok(value),
        AggregateFunction::Sum if integral => as_integer(&value).map(Value::Int64),
        AggregateFunction::Sum | AggregateFunction::Avg => as_float(&value).map(Value::Float64),
    };
    decoded.ok_or_else(|| {
        Error::Decode(format!(
            "{}({}) returned {}",
            function.sql_name(),
            column.qualified(),
            value.type_name()
        ))
    })
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::String(text) => text.parse::<i64>().ok().or_else(|| {
            text.parse::<f64>()
                .ok()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::Float32(_) | Value::Float64(_) => value
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| f as i64),
        _ => value.as_i64(),
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::String(text) => text.parse::<f64>().ok(),
        _ => value.as_f64(),
    }
}
