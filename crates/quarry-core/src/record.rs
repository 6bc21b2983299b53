//! Materialized result records.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use quarry_proto::{ColumnRef, Row, Value};

use crate::error::Error;
use crate::query::literal::uuid_string;

/// Loaded value of an association on a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Association {
    /// `belongs_to` / `has_one`: zero or one record.
    One(Option<Box<Record>>),
    /// `has_many`: every matching record, possibly none.
    Many(Vec<Record>),
}

impl Association {
    /// Records held by the association, in load order.
    pub fn records(&self) -> Vec<&Record> {
        match self {
            Association::One(record) => record.iter().map(|r| r.as_ref()).collect(),
            Association::Many(records) => records.iter().collect(),
        }
    }

    /// Number of associated records.
    pub fn len(&self) -> usize {
        match self {
            Association::One(record) => usize::from(record.is_some()),
            Association::Many(records) => records.len(),
        }
    }

    /// Whether no record is associated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One row of a table, plus whatever associations were loaded for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    table: String,
    columns: Arc<Vec<ColumnRef>>,
    primary_key: Option<usize>,
    values: Row,
    associations: BTreeMap<String, Association>,
}

impl Record {
    /// Build a record from a positional row.
    ///
    /// Fails when the row width differs from the column list.
    pub fn from_row(
        table: impl Into<String>,
        columns: Arc<Vec<ColumnRef>>,
        primary_key: Option<&ColumnRef>,
        values: Row,
    ) -> Result<Self, Error> {
        let table = table.into();
        if values.len() != columns.len() {
            return Err(Error::Decode(format!(
                "{} row has {} cells, expected {}",
                table,
                values.len(),
                columns.len()
            )));
        }
        let primary_key = primary_key.and_then(|pk| columns.iter().position(|c| c.same_column(pk)));
        Ok(Self {
            table,
            columns,
            primary_key,
            values,
            associations: BTreeMap::new(),
        })
    }

    /// Table the record came from.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column handles, in row order.
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    /// Cell values, in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of a column by name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.name == column)
            .map(|i| &self.values[i])
    }

    /// Decode a column into a Rust value.
    pub fn try_get<T: FromValue>(&self, column: &str) -> Result<T, Error> {
        let value = self.get(column).ok_or_else(|| Error::UnknownColumn {
            table: self.table.clone(),
            column: column.to_string(),
        })?;
        T::from_value(value).map_err(|found| {
            Error::Decode(format!(
                "{}.{}: cannot decode {} as {}",
                self.table,
                column,
                found,
                T::TYPE_NAME
            ))
        })
    }

    /// Primary key value, when the table has one.
    pub fn id(&self) -> Option<&Value> {
        self.primary_key.map(|i| &self.values[i])
    }

    /// Loaded association, or [`Error::NotPreloaded`].
    pub fn association(&self, name: &str) -> Result<&Association, Error> {
        self.associations
            .get(name)
            .ok_or_else(|| Error::NotPreloaded {
                model: self.table.clone(),
                association: name.to_string(),
            })
    }

    /// Records of a loaded collection association.
    pub fn many(&self, name: &str) -> Result<Vec<&Record>, Error> {
        self.association(name).map(Association::records)
    }

    /// Record of a loaded singular association.
    pub fn one(&self, name: &str) -> Result<Option<&Record>, Error> {
        Ok(self.association(name)?.records().into_iter().next())
    }

    /// Whether an association has been loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.associations.contains_key(name)
    }

    /// Names of the loaded associations, sorted.
    pub fn loaded_associations(&self) -> impl Iterator<Item = &str> {
        self.associations.keys().map(String::as_str)
    }

    /// Attach a loaded association, replacing any previous value.
    pub fn set_association(&mut self, name: impl Into<String>, association: Association) {
        self.associations.insert(name.into(), association);
    }

    /// Render the record and its loaded associations as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.insert(column.name.clone(), value_to_json(value));
        }
        for (name, association) in &self.associations {
            let json = match association {
                Association::One(None) => serde_json::Value::Null,
                Association::One(Some(record)) => record.to_json(),
                Association::Many(records) => {
                    serde_json::Value::Array(records.iter().map(Record::to_json).collect())
                }
            };
            map.insert(name.clone(), json);
        }
        serde_json::Value::Object(map)
    }
}

/// Convert a value to JSON.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int32(i) => serde_json::json!(i),
        Value::Int64(i) => serde_json::json!(i),
        Value::Float32(f) => serde_json::json!(f),
        Value::Float64(f) => serde_json::json!(f),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
        Value::Timestamp(t) => serde_json::json!(t),
        Value::Uuid(u) => serde_json::Value::String(uuid_string(u)),
        Value::BoolArray(arr) => serde_json::json!(arr),
        Value::Int32Array(arr) => serde_json::json!(arr),
        Value::Int64Array(arr) => serde_json::json!(arr),
        Value::Float64Array(arr) => serde_json::json!(arr),
        Value::StringArray(arr) => serde_json::json!(arr),
    }
}

/// Hashable form of a key cell, used to match children to parents.
///
/// Integer widths are normalized so an `Int32` foreign key matches an
/// `Int64` primary key. Floats, arrays and nulls never act as keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum RowKey {
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid([u8; 16]),
    Timestamp(i64),
}

impl RowKey {
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(RowKey::Bool(*b)),
            Value::Int32(i) => Some(RowKey::Int(i64::from(*i))),
            Value::Int64(i) => Some(RowKey::Int(*i)),
            Value::String(s) => Some(RowKey::Text(s.clone())),
            Value::Bytes(b) => Some(RowKey::Bytes(b.clone())),
            Value::Uuid(u) => Some(RowKey::Uuid(*u)),
            Value::Timestamp(t) => Some(RowKey::Timestamp(*t)),
            _ => None,
        }
    }
}

/// Distinct key values of `column` across `records`, in first-seen order.
pub(crate) fn distinct_keys(records: &[Record], column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for record in records {
        if let Some(value) = record.get(column) {
            if let Some(key) = RowKey::from_value(value) {
                if seen.insert(key) {
                    keys.push(value.clone());
                }
            }
        }
    }
    keys
}

/// Decoding of a single cell.
pub trait FromValue: Sized {
    /// Name used in decode errors.
    const TYPE_NAME: &'static str;

    /// Decode, returning the found type name on mismatch.
    fn from_value(value: &Value) -> Result<Self, &'static str>;
}

impl FromValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        value.as_bool().ok_or(value.type_name())
    }
}

impl FromValue for i32 {
    const TYPE_NAME: &'static str = "int32";

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        value.as_i32().ok_or(value.type_name())
    }
}

impl FromValue for i64 {
    const TYPE_NAME: &'static str = "int64";

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        value
            .as_i64()
            .or_else(|| value.as_timestamp())
            .ok_or(value.type_name())
    }
}

impl FromValue for f64 {
    const TYPE_NAME: &'static str = "float64";

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        value.as_f64().ok_or(value.type_name())
    }
}

impl FromValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        value.as_str().map(str::to_string).ok_or(value.type_name())
    }
}

impl FromValue for Vec<u8> {
    const TYPE_NAME: &'static str = "bytes";

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        value.as_bytes().map(<[u8]>::to_vec).ok_or(value.type_name())
    }
}

impl FromValue for Value {
    const TYPE_NAME: &'static str = "value";

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// Typed decoding of a whole record.
pub trait FromRecord: Sized {
    /// Build `Self` from a record.
    fn from_record(record: &Record) -> Result<Self, Error>;
}
