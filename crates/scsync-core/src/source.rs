use std::collections::HashMap;
use std::sync::Mutex;

use crate::commit::{Commit, CommitValue};
use crate::error::{Error, Result};

/// Read-only access to the append-only commit log of a stream (contract).
pub trait CommitSource {
    /// Total number of commits ever appended to the stream.
    fn count(&self, stream: &str) -> Result<u64>;

    /// Commits with indices in `[start, end)`, in index order.
    fn fetch(&self, stream: &str, start: u64, end: u64) -> Result<Vec<Commit>>;
}

/// Check a fetch range against the count observed at call time.
pub fn check_range(start: u64, end: u64, count: u64) -> Result<()> {
    if start > end || end > count {
        return Err(Error::InvalidRange { start, end, count });
    }
    Ok(())
}

/// An in-memory commit log, used as a fake daemon in tests.
#[derive(Default)]
pub struct MemoryCommitSource {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    logs: HashMap<String, Vec<(String, CommitValue)>>,
    /// Number of upcoming calls that fail with a transient error.
    failures: u32,
    /// If set, only this many commits are visible per stream.
    visible: Option<u64>,
    calls: usize,
}

impl MemoryCommitSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a commit to a stream's log.
    pub fn push(&self, stream: &str, key: impl Into<String>, value: impl Into<CommitValue>) {
        let mut state = self.lock();
        state
            .logs
            .entry(stream.to_string())
            .or_default()
            .push((key.into(), value.into()));
    }

    /// Make the next `n` calls fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.lock().failures = n;
    }

    /// Pretend the remote log has only `count` commits (`None` shows all).
    pub fn set_visible(&self, count: Option<u64>) {
        self.lock().visible = count;
    }

    /// Number of count/fetch calls served, including failed ones.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another test thread panicked mid-push.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MemoryState {
    fn begin_call(&mut self) -> Result<()> {
        self.calls += 1;
        if self.failures > 0 {
            self.failures -= 1;
            return Err(Error::TransientFetch("simulated network failure".into()));
        }
        Ok(())
    }

    fn visible_len(&self, stream: &str) -> u64 {
        let len = self.logs.get(stream).map_or(0, |log| log.len() as u64);
        self.visible.map_or(len, |v| v.min(len))
    }
}

impl CommitSource for MemoryCommitSource {
    fn count(&self, stream: &str) -> Result<u64> {
        let mut state = self.lock();
        state.begin_call()?;
        Ok(state.visible_len(stream))
    }

    fn fetch(&self, stream: &str, start: u64, end: u64) -> Result<Vec<Commit>> {
        let mut state = self.lock();
        state.begin_call()?;
        check_range(start, end, state.visible_len(stream))?;

        let log = state.logs.get(stream).map(Vec::as_slice).unwrap_or_default();
        Ok((start..end)
            .map(|index| {
                let (key, value) = &log[index as usize];
                Commit::new(index, key.clone(), value.clone())
            })
            .collect())
    }
}
