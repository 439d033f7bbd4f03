use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A stored replay position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub stream: String,
    pub consumer: String,
    /// Number of commits applied, i.e. the next index to fetch.
    pub index: u64,
}

/// Durable replay positions per (stream, consumer) pair.
pub trait CheckpointStore {
    /// Last applied position, 0 if the pair has never been synced.
    fn get(&self, stream: &str, consumer: &str) -> Result<u64>;

    /// Persist a position. Must be durable once this returns.
    fn set(&mut self, stream: &str, consumer: &str, index: u64) -> Result<()>;

    /// All stored positions.
    fn entries(&self) -> Result<Vec<CheckpointEntry>>;

    /// Move the pair back to the start of the log.
    fn reset(&mut self, stream: &str, consumer: &str) -> Result<()> {
        self.set(stream, consumer, 0)
    }
}

/// In-memory checkpoints that remember every write.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    values: BTreeMap<(String, String), u64>,
    history: Vec<CheckpointEntry>,
    fail_writes: bool,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `set` in call order.
    pub fn history(&self) -> &[CheckpointEntry] {
        &self.history
    }

    /// Make subsequent writes fail with a persistence error.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self, stream: &str, consumer: &str) -> Result<u64> {
        Ok(self
            .values
            .get(&(stream.to_string(), consumer.to_string()))
            .copied()
            .unwrap_or(0))
    }

    fn set(&mut self, stream: &str, consumer: &str, index: u64) -> Result<()> {
        if self.fail_writes {
            return Err(crate::Error::Persistence("checkpoint write refused".into()));
        }
        self.values
            .insert((stream.to_string(), consumer.to_string()), index);
        self.history.push(CheckpointEntry {
            stream: stream.to_string(),
            consumer: consumer.to_string(),
            index,
        });
        Ok(())
    }

    fn entries(&self) -> Result<Vec<CheckpointEntry>> {
        Ok(self
            .values
            .iter()
            .map(|((stream, consumer), index)| CheckpointEntry {
                stream: stream.clone(),
                consumer: consumer.clone(),
                index: *index,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_zero() {
        let store = MemoryCheckpointStore::new();
        assert_eq!(store.get("sc", "auction").unwrap(), 0);
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn test_set_get_reset() {
        let mut store = MemoryCheckpointStore::new();
        store.set("sc", "auction", 1000).unwrap();
        store.set("sc", "exchange", 20).unwrap();
        assert_eq!(store.get("sc", "auction").unwrap(), 1000);

        store.reset("sc", "auction").unwrap();
        assert_eq!(store.get("sc", "auction").unwrap(), 0);
        assert_eq!(store.history().len(), 3);
        assert_eq!(store.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_write_keeps_value() {
        let mut store = MemoryCheckpointStore::new();
        store.set("sc", "c", 5).unwrap();
        store.fail_writes(true);
        assert!(store.set("sc", "c", 10).is_err());
        assert_eq!(store.get("sc", "c").unwrap(), 5);
    }
}
