use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use scsync_core::{CheckpointEntry, CheckpointStore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StateError, StateResult};

/// One consumer's position in the counter file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum Count {
    /// Plain index written without its stream. Trusted for any stream.
    Bare(u64),
    Tracked { stream: String, index: u64 },
}

impl Count {
    /// A position recorded for a different stream does not apply.
    fn index_for(&self, stream: &str) -> u64 {
        match self {
            Count::Bare(index) => *index,
            Count::Tracked { stream: s, index } if s == stream => *index,
            Count::Tracked { .. } => 0,
        }
    }
}

/// Checkpoints kept in a JSON file mapping consumer name to its stream and
/// index. There is one file per environment.
///
/// The file is shared by every consumer of the environment. Writes take an
/// exclusive lock on `<file>.lock`, re-read the file and replace only their
/// own entry, so concurrent consumers never overwrite each other.
#[derive(Debug)]
pub struct CounterFile {
    path: PathBuf,
}

impl CounterFile {
    /// `<dir>/<env>_counts.json`.
    pub fn path_for(dir: impl AsRef<Path>, env: &str) -> PathBuf {
        dir.as_ref().join(format!("{}_counts.json", env))
    }

    /// Open the file, which need not exist yet. An existing file must parse.
    pub fn open(path: impl Into<PathBuf>) -> StateResult<Self> {
        let file = Self { path: path.into() };
        file.read()?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    fn read(&self) -> StateResult<BTreeMap<String, Count>> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                StateError::Serialization(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }

    /// Exclusive lock over the whole file, released when the handle drops.
    fn lock(&self) -> StateResult<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let lock_path = self.sibling(".lock");
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| io_error(&lock_path, e))?;
        lock.lock_exclusive().map_err(|e| io_error(&lock_path, e))?;
        Ok(lock)
    }

    /// Rewrite the whole file through a temp file and an atomic rename.
    /// Callers hold the lock.
    fn write(&self, counts: &BTreeMap<String, Count>) -> StateResult<()> {
        let json = serde_json::to_string_pretty(counts)
            .map_err(|e| StateError::Serialization(e.to_string()))?;

        let tmp = self.sibling(".tmp");
        let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, e))?;

        debug!(path = %self.path.display(), "Counter file saved");
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StateError {
    StateError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl CheckpointStore for CounterFile {
    fn get(&self, stream: &str, consumer: &str) -> scsync_core::Result<u64> {
        Ok(self
            .read()?
            .get(consumer)
            .map(|count| count.index_for(stream))
            .unwrap_or(0))
    }

    fn set(&mut self, stream: &str, consumer: &str, index: u64) -> scsync_core::Result<()> {
        let _lock = self.lock()?;
        let mut counts = self.read()?;
        counts.insert(
            consumer.to_string(),
            Count::Tracked {
                stream: stream.to_string(),
                index,
            },
        );
        self.write(&counts)?;
        Ok(())
    }

    fn entries(&self) -> scsync_core::Result<Vec<CheckpointEntry>> {
        Ok(self
            .read()?
            .into_iter()
            .map(|(consumer, count)| match count {
                Count::Bare(index) => CheckpointEntry {
                    stream: String::new(),
                    consumer,
                    index,
                },
                Count::Tracked { stream, index } => CheckpointEntry {
                    stream,
                    consumer,
                    index,
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let file = CounterFile::open(CounterFile::path_for(dir.path(), "testnet")).unwrap();
        assert_eq!(file.get("sc", "asset-trade-auction").unwrap(), 0);
        assert!(file.entries().unwrap().is_empty());
        assert!(!file.path().exists());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = CounterFile::path_for(dir.path(), "simulator");

        let mut file = CounterFile::open(&path).unwrap();
        file.set("sc", "lotto", 1000).unwrap();
        file.set("sc", "username", 7).unwrap();

        let reopened = CounterFile::open(&path).unwrap();
        assert_eq!(reopened.get("sc", "lotto").unwrap(), 1000);
        assert_eq!(reopened.get("sc", "username").unwrap(), 7);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_reads_plain_json_map() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("testnet_counts.json");
        fs::write(&path, r#"{"asset-trade-auction": 2000, "asset-trade-exchange": 35}"#).unwrap();

        let file = CounterFile::open(&path).unwrap();
        assert_eq!(file.get("any", "asset-trade-exchange").unwrap(), 35);
        assert_eq!(file.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("testnet_counts.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            CounterFile::open(&path),
            Err(StateError::Serialization(_))
        ));
    }

    #[test]
    fn test_failed_save_keeps_previous_value() {
        let dir = TempDir::new().unwrap();
        let path = CounterFile::path_for(dir.path(), "testnet");

        let mut file = CounterFile::open(&path).unwrap();
        file.set("sc", "lotto", 5).unwrap();

        // a directory where the temp file goes makes the save fail
        fs::create_dir(path.with_extension("json.tmp")).unwrap();

        let err = file.set("sc", "lotto", 10).unwrap_err();
        assert!(matches!(err, scsync_core::Error::Persistence(_)));
        assert_eq!(file.get("sc", "lotto").unwrap(), 5);
        assert_eq!(CounterFile::open(&path).unwrap().get("sc", "lotto").unwrap(), 5);
    }

    #[test]
    fn test_handles_on_same_file_keep_each_others_progress() {
        let dir = TempDir::new().unwrap();
        let path = CounterFile::path_for(dir.path(), "testnet");

        let mut first = CounterFile::open(&path).unwrap();
        let mut second = CounterFile::open(&path).unwrap();
        first.set("scA", "auctions", 2000).unwrap();
        second.set("scB", "names", 10).unwrap();

        let reopened = CounterFile::open(&path).unwrap();
        assert_eq!(reopened.get("scA", "auctions").unwrap(), 2000);
        assert_eq!(reopened.get("scB", "names").unwrap(), 10);
        assert_eq!(first.get("scB", "names").unwrap(), 10);
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        let dir = TempDir::new().unwrap();
        let path = CounterFile::path_for(dir.path(), "simulator");

        let writers: Vec<_> = (0..4)
            .map(|n| {
                let path = path.clone();
                thread::spawn(move || {
                    let mut file = CounterFile::open(&path).unwrap();
                    for index in 1..=25 {
                        file.set("sc", &format!("consumer-{n}"), index).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let file = CounterFile::open(&path).unwrap();
        for n in 0..4 {
            assert_eq!(file.get("sc", &format!("consumer-{n}")).unwrap(), 25);
        }
    }

    #[test]
    fn test_position_belongs_to_its_stream() {
        let dir = TempDir::new().unwrap();
        let path = CounterFile::path_for(dir.path(), "testnet");

        let mut file = CounterFile::open(&path).unwrap();
        file.set("contract-old", "auctions", 2000).unwrap();

        assert_eq!(file.get("contract-old", "auctions").unwrap(), 2000);
        assert_eq!(file.get("contract-new", "auctions").unwrap(), 0);

        let entries = file.entries().unwrap();
        assert_eq!(entries[0].stream, "contract-old");
        assert_eq!(entries[0].index, 2000);
    }
}
