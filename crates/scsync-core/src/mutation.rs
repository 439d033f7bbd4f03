use serde::{Deserialize, Serialize};

use crate::types::{PrimaryKey, Value};

/// What a decomposed commit does to its row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MutationOp {
    /// Insert the row with only this column set, or update the column if
    /// the row already exists.
    Upsert { column: String, value: Value },
    /// Set the column to NULL on an existing row. No-op if absent.
    Clear { column: String },
    /// Remove the whole row. No-op if absent.
    Delete,
    /// Remove every row of the table where the column is still NULL.
    Prune { column: String },
}

/// The structured form of one commit, addressed to a mirror table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMutation {
    pub table: String,
    pub key: PrimaryKey,
    pub op: MutationOp,
}

impl RowMutation {
    /// Create an upsert mutation.
    pub fn upsert(
        table: impl Into<String>,
        key: PrimaryKey,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            table: table.into(),
            key,
            op: MutationOp::Upsert {
                column: column.into(),
                value: value.into(),
            },
        }
    }

    /// Create a column clear mutation.
    pub fn clear(table: impl Into<String>, key: PrimaryKey, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key,
            op: MutationOp::Clear {
                column: column.into(),
            },
        }
    }

    /// Create a whole-row delete mutation.
    pub fn delete(table: impl Into<String>, key: PrimaryKey) -> Self {
        Self {
            table: table.into(),
            key,
            op: MutationOp::Delete,
        }
    }

    /// Create a table-wide prune of rows missing `column`. The key is empty.
    pub fn prune(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: PrimaryKey::new(Vec::new()),
            op: MutationOp::Prune {
                column: column.into(),
            },
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.op, MutationOp::Delete)
    }

    /// The column this mutation writes, if any.
    pub fn column(&self) -> Option<&str> {
        match &self.op {
            MutationOp::Upsert { column, .. }
            | MutationOp::Clear { column }
            | MutationOp::Prune { column } => Some(column),
            MutationOp::Delete => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_constructors() {
        let key = PrimaryKey::single("id", 1);
        let m = RowMutation::upsert("auctions", key.clone(), "duration", 60);
        assert_eq!(m.column(), Some("duration"));
        assert!(!m.is_delete());

        let m = RowMutation::clear("auctions", key.clone(), "seller");
        assert_eq!(m.column(), Some("seller"));

        let m = RowMutation::delete("auctions", key);
        assert!(m.is_delete());
        assert_eq!(m.column(), None);

        let m = RowMutation::prune("auctions", "sellAssetId");
        assert!(!m.is_delete());
        assert_eq!(m.column(), Some("sellAssetId"));
        assert_eq!(m.key.parts().len(), 0);
    }

    #[test]
    fn test_mutation_serializes_tagged() {
        let m = RowMutation::upsert("t", PrimaryKey::single("id", 2), "name", "a");
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["op"]["type"], "upsert");
        assert_eq!(json["op"]["value"], "a");
    }
}
