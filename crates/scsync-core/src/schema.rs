use serde::{Deserialize, Serialize};

use crate::commit::CommitValue;
use crate::error::{Error, Result};
use crate::types::Value;

/// Storage type of a mirror column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Text,
    /// Stored as integer 0/1.
    Boolean,
}

impl ColumnType {
    /// SQL type affinity used in generated DDL.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Text => "TEXT",
        }
    }

    /// Convert a commit value into a cell value of this type.
    ///
    /// Returns a message describing the mismatch on failure. Deletes are
    /// not coercible; callers handle them before getting here.
    pub fn coerce(self, value: &CommitValue) -> std::result::Result<Value, String> {
        match (self, value) {
            (_, CommitValue::Delete) => Err("delete sentinel has no cell value".into()),
            (ColumnType::Integer, CommitValue::Int(i)) => Ok(Value::Int(*i)),
            (ColumnType::Integer, CommitValue::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("'{}' is not an integer", s)),
            (ColumnType::Text, CommitValue::Text(s)) => Ok(Value::Text(s.clone())),
            (ColumnType::Text, CommitValue::Int(i)) => Ok(Value::Text(i.to_string())),
            (ColumnType::Boolean, CommitValue::Int(i @ (0 | 1))) => Ok(Value::Int(*i)),
            (ColumnType::Boolean, CommitValue::Int(i)) => {
                Err(format!("{} is not a boolean (expected 0 or 1)", i))
            }
            (ColumnType::Boolean, CommitValue::Text(s)) => match s.trim() {
                "1" | "true" => Ok(Value::Int(1)),
                "0" | "false" => Ok(Value::Int(0)),
                other => Err(format!("'{}' is not a boolean", other)),
            },
        }
    }

    /// Convert a key segment captured from a commit key.
    pub fn parse_key(self, raw: &str) -> std::result::Result<Value, String> {
        self.coerce(&CommitValue::Text(raw.to_string()))
    }
}

/// A column in a mirror table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Boolean)
    }
}

/// Schema of a materialized table. Key columns come first, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub key: Vec<ColumnDef>,
    pub columns: Vec<ColumnDef>,
    /// Rows still missing this column after a chunk are dropped.
    pub required: Option<String>,
}

impl TableSchema {
    /// Build and validate a table schema.
    pub fn new(
        name: impl Into<String>,
        key: Vec<ColumnDef>,
        columns: Vec<ColumnDef>,
    ) -> Result<Self> {
        let schema = Self {
            name: name.into(),
            key,
            columns,
            required: None,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Drop rows whose `column` is still NULL at the end of every chunk.
    pub fn require(mut self, column: impl Into<String>) -> Result<Self> {
        let column = column.into();
        if self.column(&column).is_none() {
            return Err(Error::InvalidSchema {
                table: self.name.clone(),
                message: format!("required column '{}' is not a value column", column),
            });
        }
        self.required = Some(column);
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |message: String| Error::InvalidSchema {
            table: self.name.clone(),
            message,
        };

        if !is_identifier(&self.name) {
            return Err(invalid("table name is not a valid identifier".into()));
        }
        if self.key.is_empty() {
            return Err(invalid("at least one key column is required".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for column in self.all_columns() {
            if !is_identifier(&column.name) {
                return Err(invalid(format!(
                    "column '{}' is not a valid identifier",
                    column.name
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(invalid(format!("duplicate column '{}'", column.name)));
            }
        }
        Ok(())
    }

    /// Key columns followed by value columns.
    pub fn all_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.key.iter().chain(self.columns.iter())
    }

    /// Look up a non-key column.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_key_column(&self, name: &str) -> bool {
        self.key.iter().any(|c| c.name == name)
    }

    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.key.iter().map(|c| c.name.as_str())
    }
}

/// Identifiers are interpolated into SQL, so only plain names are allowed.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
