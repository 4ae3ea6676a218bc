use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A column value decoded from a binlog row image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Build a value from an unsigned integer.
    /// Values that fit in an `i64` are stored as `Int` so they decode back
    /// to the same variant after a JSON round trip.
    pub fn from_u64(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::UInt(v),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// The normalized operation carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutation kind reported by the replication client for a rows event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
    /// A rows event the client decoded but that has no normalized form.
    Other(String),
}

impl MutationKind {
    /// The normalized operation for this kind, if there is one.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            MutationKind::Insert => Some(Operation::Insert),
            MutationKind::Update => Some(Operation::Update),
            MutationKind::Delete => Some(Operation::Delete),
            MutationKind::Other(_) => None,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Other(name) => f.write_str(name),
            other => match other.operation() {
                Some(op) => f.write_str(op.as_str()),
                None => Ok(()),
            },
        }
    }
}

/// A column declaration, in table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Schema metadata for the table a notification refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// The database (schema) name.
    pub schema: String,
    /// The table name.
    pub name: String,
    /// Declared columns, in ordinal order.
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new<I, S>(schema: impl Into<String>, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: columns.into_iter().map(Column::new).collect(),
        }
    }
}

/// Column values of one row, positionally aligned with `TableSchema::columns`.
pub type RowImage = Vec<Value>;

/// A decoded rows event handed to the translator by the replication client.
///
/// For updates, `rows` holds consecutive (before, after) image pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct RowsNotification {
    pub table: TableSchema,
    pub kind: MutationKind,
    pub rows: Vec<RowImage>,
}

/// A row map containing column name to value mappings.
pub type RowMap = BTreeMap<String, Value>;

/// A normalized change event, one per affected row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The table name.
    pub table: String,
    /// The normalized operation.
    pub event: Operation,
    /// Column values of the row (after-image for updates).
    pub data: RowMap,
}
