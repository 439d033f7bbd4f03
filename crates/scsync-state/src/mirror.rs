use std::collections::HashSet;
use std::path::Path;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Transaction};
use scsync_core::{
    MirrorStore, MutationOp, Predicate, PrimaryKey, RowMap, RowMutation, TableSchema, Value,
};
use tracing::{debug, info};

use crate::error::{StateError, StateResult};

/// Quote an identifier for use in generated SQL.
fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> StateResult<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Int(i)),
        ValueRef::Real(f) => Ok(Value::Text(f.to_string())),
        ValueRef::Text(bytes) => String::from_utf8(bytes.to_vec())
            .map(Value::Text)
            .map_err(|e| StateError::Serialization(e.to_string())),
        ValueRef::Blob(_) => Err(StateError::Serialization(
            "blob cells are not supported".into(),
        )),
    }
}

/// `"a" = ?n AND "b" = ?n+1 ...` for the key columns, numbered from `first`.
fn key_clause(key: &PrimaryKey, first: usize) -> String {
    key.columns()
        .enumerate()
        .map(|(i, column)| format!("{} = ?{}", quote(column), first + i))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn key_list(key: &PrimaryKey) -> String {
    key.columns().map(quote).collect::<Vec<_>>().join(", ")
}

fn create_table_sql(schema: &TableSchema) -> String {
    let mut defs: Vec<String> = schema
        .key
        .iter()
        .map(|c| format!("{} {} NOT NULL", quote(&c.name), c.column_type.sql_type()))
        .collect();
    defs.extend(
        schema
            .columns
            .iter()
            .map(|c| format!("{} {}", quote(&c.name), c.column_type.sql_type())),
    );

    let key: Vec<String> = schema.key_names().map(quote).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}))",
        quote(&schema.name),
        defs.join(", "),
        key.join(", ")
    )
}

/// Insert the row or overwrite the given columns.
fn upsert_row(
    tx: &Transaction<'_>,
    table: &str,
    key: &PrimaryKey,
    columns: &[(&str, &Value)],
) -> StateResult<()> {
    let mut names: Vec<String> = key.columns().map(quote).collect();
    names.extend(columns.iter().map(|(c, _)| quote(c)));
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();

    let conflict = if columns.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let sets: Vec<String> = columns
            .iter()
            .map(|(c, _)| format!("{0} = excluded.{0}", quote(c)))
            .collect();
        format!("DO UPDATE SET {}", sets.join(", "))
    };

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        quote(table),
        names.join(", "),
        placeholders.join(", "),
        key_list(key),
        conflict
    );

    let values = key
        .values()
        .chain(columns.iter().map(|(_, v)| *v))
        .map(to_sql);
    tx.prepare_cached(&sql)?.execute(params_from_iter(values))?;
    Ok(())
}

fn clear_column(tx: &Transaction<'_>, table: &str, key: &PrimaryKey, column: &str) -> StateResult<()> {
    let sql = format!(
        "UPDATE {} SET {} = NULL WHERE {}",
        quote(table),
        quote(column),
        key_clause(key, 1)
    );
    tx.prepare_cached(&sql)?
        .execute(params_from_iter(key.values().map(to_sql)))?;
    Ok(())
}

fn delete_row(tx: &Transaction<'_>, table: &str, key: &PrimaryKey) -> StateResult<()> {
    let sql = format!("DELETE FROM {} WHERE {}", quote(table), key_clause(key, 1));
    tx.prepare_cached(&sql)?
        .execute(params_from_iter(key.values().map(to_sql)))?;
    Ok(())
}

fn prune_rows(tx: &Transaction<'_>, table: &str, column: &str) -> StateResult<()> {
    let sql = format!("DELETE FROM {} WHERE {} IS NULL", quote(table), quote(column));
    let pruned = tx.prepare_cached(&sql)?.execute([])?;
    if pruned > 0 {
        debug!(table, column, pruned, "Pruned incomplete rows");
    }
    Ok(())
}

/// SQLite-backed mirror of the materialized tables.
pub struct SqliteMirror {
    conn: Connection,
}

impl SqliteMirror {
    /// Open or create a mirror database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening mirror database");

        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Create an in-memory mirror (for testing).
    pub fn in_memory() -> StateResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Upsert several columns of one row in its own transaction.
    pub fn upsert(&mut self, table: &str, key: &PrimaryKey, columns: &[(&str, &Value)]) -> StateResult<()> {
        let tx = self.conn.transaction()?;
        upsert_row(&tx, table, key, columns)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete one row in its own transaction.
    pub fn delete(&mut self, table: &str, key: &PrimaryKey) -> StateResult<()> {
        let tx = self.conn.transaction()?;
        delete_row(&tx, table, key)?;
        tx.commit()?;
        Ok(())
    }

    fn existing_columns(&self, table: &str) -> StateResult<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote(table)))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;

        let mut result = HashSet::new();
        for name in names {
            result.insert(name?);
        }
        Ok(result)
    }

    fn create_tables(&mut self, tables: &[TableSchema]) -> StateResult<()> {
        for schema in tables {
            self.conn.execute(&create_table_sql(schema), [])?;

            // Columns added to a schema after the table was first created.
            let existing = self.existing_columns(&schema.name)?;
            for column in schema.columns.iter().filter(|c| !existing.contains(&c.name)) {
                info!(table = %schema.name, column = %column.name, "Adding mirror column");
                self.conn.execute(
                    &format!(
                        "ALTER TABLE {} ADD COLUMN {} {}",
                        quote(&schema.name),
                        quote(&column.name),
                        column.column_type.sql_type()
                    ),
                    [],
                )?;
            }
        }
        Ok(())
    }

    fn clear_tables(&mut self, tables: &[TableSchema]) -> StateResult<()> {
        let tx = self.conn.transaction()?;
        for schema in tables {
            tx.execute(&format!("DELETE FROM {}", quote(&schema.name)), [])?;
        }
        tx.commit()?;
        info!(tables = tables.len(), "Mirror tables cleared");
        Ok(())
    }

    fn apply_all(&mut self, mutations: &[RowMutation]) -> StateResult<()> {
        let tx = self.conn.transaction()?;
        for mutation in mutations {
            match &mutation.op {
                MutationOp::Upsert { column, value } => {
                    upsert_row(&tx, &mutation.table, &mutation.key, &[(column.as_str(), value)])?
                }
                MutationOp::Clear { column } => {
                    clear_column(&tx, &mutation.table, &mutation.key, column)?
                }
                MutationOp::Delete => delete_row(&tx, &mutation.table, &mutation.key)?,
                MutationOp::Prune { column } => prune_rows(&tx, &mutation.table, column)?,
            }
        }
        // dropping `tx` on an earlier error rolls everything back
        tx.commit()?;
        debug!(mutations = mutations.len(), "Mirror transaction committed");
        Ok(())
    }

    fn select(&self, schema: &TableSchema, predicate: &Predicate) -> StateResult<Vec<RowMap>> {
        let columns: Vec<&str> = schema.all_columns().map(|c| c.name.as_str()).collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            quote(&schema.name),
            schema.key_names().map(quote).collect::<Vec<_>>().join(", ")
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = RowMap::new();
            for (i, column) in columns.iter().enumerate() {
                map.insert(column.to_string(), from_sql(row.get_ref(i)?)?);
            }
            if predicate.evaluate(&map) {
                result.push(map);
            }
        }
        Ok(result)
    }

    fn count_rows(&self, schema: &TableSchema) -> StateResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote(&schema.name)),
            [],
            |row| row.get(0),
        )?;
        u64::try_from(count).map_err(|_| StateError::OutOfRange(format!("row count {}", count)))
    }

    fn has_table(&self, name: &str) -> StateResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn require_table(&self, schema: &TableSchema) -> scsync_core::Result<()> {
        if !self.has_table(&schema.name)? {
            return Err(scsync_core::Error::UnknownTable(schema.name.clone()));
        }
        Ok(())
    }
}

impl MirrorStore for SqliteMirror {
    fn ensure_tables(&mut self, tables: &[TableSchema]) -> scsync_core::Result<()> {
        Ok(self.create_tables(tables)?)
    }

    fn clear(&mut self, tables: &[TableSchema]) -> scsync_core::Result<()> {
        Ok(self.clear_tables(tables)?)
    }

    fn apply(&mut self, mutations: &[RowMutation]) -> scsync_core::Result<()> {
        Ok(self.apply_all(mutations)?)
    }

    fn query(&self, table: &TableSchema, predicate: &Predicate) -> scsync_core::Result<Vec<RowMap>> {
        self.require_table(table)?;
        Ok(self.select(table, predicate)?)
    }

    fn count(&self, table: &TableSchema) -> scsync_core::Result<u64> {
        self.require_table(table)?;
        Ok(self.count_rows(table)?)
    }
}
