use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::mutation::{MutationOp, RowMutation};
use crate::predicate::Predicate;
use crate::schema::TableSchema;
use crate::types::{PrimaryKey, RowMap, Value};

/// Local relational store holding the materialized tables.
pub trait MirrorStore {
    /// Create any missing tables. Existing tables are left untouched.
    fn ensure_tables(&mut self, tables: &[TableSchema]) -> Result<()>;

    /// Remove every row from the given tables.
    fn clear(&mut self, tables: &[TableSchema]) -> Result<()>;

    /// Apply all mutations in one transaction. On error nothing is applied.
    fn apply(&mut self, mutations: &[RowMutation]) -> Result<()>;

    /// Rows matching `predicate`, ordered by primary key.
    fn query(&self, table: &TableSchema, predicate: &Predicate) -> Result<Vec<RowMap>>;

    /// Number of rows in a table.
    fn count(&self, table: &TableSchema) -> Result<u64>;
}

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: BTreeMap<Vec<Value>, RowMap>,
}

impl MemoryTable {
    fn key_of(&self, key: &PrimaryKey) -> Result<Vec<Value>> {
        self.schema
            .key
            .iter()
            .map(|col| {
                key.parts()
                    .iter()
                    .find(|(name, _)| *name == col.name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| Error::InvalidSchema {
                        table: self.schema.name.clone(),
                        message: format!("key {} is missing column '{}'", key, col.name),
                    })
            })
            .collect()
    }

    fn check_column(&self, column: &str) -> Result<()> {
        if self.schema.column(column).is_none() {
            return Err(Error::InvalidSchema {
                table: self.schema.name.clone(),
                message: format!("unknown column '{}'", column),
            });
        }
        Ok(())
    }

    fn apply(&mut self, mutation: &RowMutation) -> Result<()> {
        match &mutation.op {
            MutationOp::Upsert { column, value } => {
                self.check_column(column)?;
                let key = self.key_of(&mutation.key)?;
                let schema = &self.schema;
                let row = self.rows.entry(key).or_insert_with(|| {
                    let mut row: RowMap = schema
                        .columns
                        .iter()
                        .map(|c| (c.name.clone(), Value::Null))
                        .collect();
                    for (name, value) in mutation.key.parts() {
                        row.insert(name.clone(), value.clone());
                    }
                    row
                });
                row.insert(column.clone(), value.clone());
            }
            MutationOp::Clear { column } => {
                self.check_column(column)?;
                let key = self.key_of(&mutation.key)?;
                if let Some(row) = self.rows.get_mut(&key) {
                    row.insert(column.clone(), Value::Null);
                }
            }
            MutationOp::Delete => {
                let key = self.key_of(&mutation.key)?;
                self.rows.remove(&key);
            }
            MutationOp::Prune { column } => {
                self.check_column(column)?;
                self.rows
                    .retain(|_, row| row.get(column).is_some_and(|v| !v.is_null()));
            }
        }
        Ok(())
    }
}

/// In-memory mirror. Transactions are applied to a copy and swapped in.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    tables: BTreeMap<String, MemoryTable>,
    fail_applies: bool,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `apply` calls fail after staging their writes.
    pub fn fail_applies(&mut self, fail: bool) {
        self.fail_applies = fail;
    }

    fn table(&self, schema: &TableSchema) -> Result<&MemoryTable> {
        self.tables
            .get(&schema.name)
            .ok_or_else(|| Error::UnknownTable(schema.name.clone()))
    }
}

impl MirrorStore for MemoryMirror {
    fn ensure_tables(&mut self, tables: &[TableSchema]) -> Result<()> {
        for schema in tables {
            self.tables
                .entry(schema.name.clone())
                .or_insert_with(|| MemoryTable {
                    schema: schema.clone(),
                    rows: BTreeMap::new(),
                });
        }
        Ok(())
    }

    fn clear(&mut self, tables: &[TableSchema]) -> Result<()> {
        for schema in tables {
            if let Some(table) = self.tables.get_mut(&schema.name) {
                table.rows.clear();
            }
        }
        Ok(())
    }

    fn apply(&mut self, mutations: &[RowMutation]) -> Result<()> {
        let mut staged = self.tables.clone();
        for mutation in mutations {
            staged
                .get_mut(&mutation.table)
                .ok_or_else(|| Error::UnknownTable(mutation.table.clone()))?
                .apply(mutation)?;
        }

        if self.fail_applies {
            return Err(Error::Persistence("mirror transaction refused".into()));
        }
        self.tables = staged;
        Ok(())
    }

    fn query(&self, table: &TableSchema, predicate: &Predicate) -> Result<Vec<RowMap>> {
        Ok(self
            .table(table)?
            .rows
            .values()
            .filter(|row| predicate.evaluate(row))
            .cloned()
            .collect())
    }

    fn count(&self, table: &TableSchema) -> Result<u64> {
        Ok(self.table(table)?.rows.len() as u64)
    }
}
