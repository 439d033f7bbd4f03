use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use scsync_core::{CheckpointEntry, CheckpointStore};
use tracing::{debug, info};

use crate::error::{StateError, StateResult};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS checkpoints (
    stream TEXT NOT NULL,
    consumer TEXT NOT NULL,
    commit_index INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (stream, consumer)
)";

/// SQLite-backed checkpoint store.
pub struct SqliteCheckpointStore {
    conn: Connection,
}

impl SqliteCheckpointStore {
    /// Open or create a checkpoint store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening checkpoint store");

        let conn = Connection::open(path)?;
        conn.execute(SCHEMA, [])?;

        Ok(Self { conn })
    }

    /// Create an in-memory checkpoint store (for testing).
    pub fn in_memory() -> StateResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(SCHEMA, [])?;

        Ok(Self { conn })
    }

    /// When the pair's checkpoint was last written.
    pub fn updated_at(&self, stream: &str, consumer: &str) -> StateResult<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT updated_at FROM checkpoints WHERE stream = ?1 AND consumer = ?2",
                params![stream, consumer],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| StateError::Serialization(format!("bad timestamp '{}': {}", s, e)))
        })
        .transpose()
    }

    fn read(&self, stream: &str, consumer: &str) -> StateResult<u64> {
        let index: Option<i64> = self
            .conn
            .query_row(
                "SELECT commit_index FROM checkpoints WHERE stream = ?1 AND consumer = ?2",
                params![stream, consumer],
                |row| row.get(0),
            )
            .optional()?;

        index.map_or(Ok(0), to_index)
    }

    fn write(&self, stream: &str, consumer: &str, index: u64) -> StateResult<()> {
        let index = i64::try_from(index)
            .map_err(|_| StateError::OutOfRange(format!("checkpoint {}", index)))?;

        self.conn.execute(
            "INSERT INTO checkpoints (stream, consumer, commit_index, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(stream, consumer) DO UPDATE SET
                commit_index = excluded.commit_index,
                updated_at = excluded.updated_at",
            params![stream, consumer, index, Utc::now().to_rfc3339()],
        )?;

        debug!(stream, consumer, index, "Checkpoint saved");
        Ok(())
    }

    fn list(&self) -> StateResult<Vec<CheckpointEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT stream, consumer, commit_index FROM checkpoints ORDER BY stream, consumer",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (stream, consumer, index) = row?;
            result.push(CheckpointEntry {
                stream,
                consumer,
                index: to_index(index)?,
            });
        }

        Ok(result)
    }
}

fn to_index(raw: i64) -> StateResult<u64> {
    u64::try_from(raw).map_err(|_| StateError::OutOfRange(format!("checkpoint {}", raw)))
}

impl CheckpointStore for SqliteCheckpointStore {
    fn get(&self, stream: &str, consumer: &str) -> scsync_core::Result<u64> {
        Ok(self.read(stream, consumer)?)
    }

    fn set(&mut self, stream: &str, consumer: &str, index: u64) -> scsync_core::Result<()> {
        Ok(self.write(stream, consumer, index)?)
    }

    fn entries(&self) -> scsync_core::Result<Vec<CheckpointEntry>> {
        Ok(self.list()?)
    }
}
