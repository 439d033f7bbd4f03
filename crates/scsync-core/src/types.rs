use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value stored in a mirror table cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => serde_json::Value::Number(i.into()),
            Value::Text(s) => serde_json::Value::String(s),
        }
    }
}

/// A materialized row: column name to value. Ordered so that rows compare
/// and print deterministically.
pub type RowMap = BTreeMap<String, Value>;

/// The ordered primary key of a mirror row.
///
/// Composite keys keep the declaration order of the table's key columns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrimaryKey(Vec<(String, Value)>);

impl PrimaryKey {
    pub fn new(parts: Vec<(String, Value)>) -> Self {
        Self(parts)
    }

    /// Single-column key.
    pub fn single(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self(vec![(column.into(), value.into())])
    }

    pub fn parts(&self) -> &[(String, Value)] {
        &self.0
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(c, _)| c.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().map(|(_, v)| v)
    }

    /// Check whether a row carries exactly this key.
    pub fn matches(&self, row: &RowMap) -> bool {
        self.0.iter().all(|(c, v)| row.get(c) == Some(v))
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(c, v)| format!("{}={}", c, v)).collect();
        write!(f, "({})", parts.join(", "))
    }
}
