use std::ops::Range;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::checkpoint::CheckpointStore;
use crate::chunk::{ChunkPlan, DEFAULT_CHUNK_SIZE};
use crate::commit::Commit;
use crate::decompose::Decomposer;
use crate::error::{Error, Result};
use crate::mirror::MirrorStore;
use crate::retry::RetryPolicy;
use crate::source::CommitSource;

/// A named projection of one stream into a set of mirror tables.
#[derive(Debug, Clone)]
pub struct Consumer {
    /// Checkpoint name, unique per stream.
    pub name: String,
    /// Contract id whose commit log is replayed.
    pub stream: String,
    pub decomposer: Decomposer,
}

impl Consumer {
    pub fn new(name: impl Into<String>, stream: impl Into<String>, decomposer: Decomposer) -> Self {
        Self {
            name: name.into(),
            stream: stream.into(),
            decomposer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaterializerConfig {
    /// Commits fetched and applied per transaction.
    pub chunk_size: u64,
    pub retry: RetryPolicy,
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Fetching,
    Applying,
    Failed,
}

/// Outcome of one successful sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub consumer: String,
    /// Checkpoint the sync started from.
    pub from: u64,
    /// Checkpoint the sync ended at.
    pub to: u64,
    pub chunks: u64,
    pub commits: u64,
    pub mutations: u64,
    /// Commits that produced no mutation.
    pub ignored: u64,
    /// Whether the mirror tables were cleared for a full resync.
    pub reset: bool,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.from == self.to && !self.reset
    }
}

/// Replays a commit log into the mirror, one chunk per transaction.
pub struct Materializer<'a, S, C, M> {
    source: &'a S,
    checkpoints: &'a mut C,
    mirror: &'a mut M,
    config: MaterializerConfig,
    state: SyncState,
}

impl<'a, S, C, M> Materializer<'a, S, C, M>
where
    S: CommitSource,
    C: CheckpointStore,
    M: MirrorStore,
{
    pub fn new(
        source: &'a S,
        checkpoints: &'a mut C,
        mirror: &'a mut M,
        config: MaterializerConfig,
    ) -> Self {
        Self {
            source,
            checkpoints,
            mirror,
            config,
            state: SyncState::Idle,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Bring the consumer's tables up to date with the remote log.
    ///
    /// On error the checkpoint stays at the last committed chunk and the
    /// materializer enters [`SyncState::Failed`]. Calling `sync` again
    /// resumes from there.
    pub fn sync(&mut self, consumer: &Consumer) -> Result<SyncReport> {
        match self.run(consumer) {
            Ok(report) => {
                self.state = SyncState::Idle;
                Ok(report)
            }
            Err(e) => {
                self.state = SyncState::Failed;
                error!(
                    consumer = %consumer.name,
                    stream = %consumer.stream,
                    error = %e,
                    "Sync failed"
                );
                Err(e)
            }
        }
    }

    /// Move the consumer's checkpoint back to 0. The next sync clears its
    /// tables and replays the whole log.
    pub fn reset(&mut self, consumer: &Consumer) -> Result<()> {
        self.checkpoints.reset(&consumer.stream, &consumer.name)?;
        info!(consumer = %consumer.name, stream = %consumer.stream, "Checkpoint reset");
        Ok(())
    }

    fn run(&mut self, consumer: &Consumer) -> Result<SyncReport> {
        let stream = consumer.stream.as_str();
        let tables = consumer.decomposer.tables();

        let from = self.checkpoints.get(stream, &consumer.name)?;
        self.mirror.ensure_tables(tables)?;

        let mut report = SyncReport {
            consumer: consumer.name.clone(),
            from,
            to: from,
            ..Default::default()
        };

        if from == 0 {
            self.mirror.clear(tables)?;
            report.reset = true;
        }

        self.state = SyncState::Fetching;
        let source = self.source;
        let total = self
            .config
            .retry
            .run("count", || source.count(stream))?;

        if from > total {
            return Err(Error::InvalidRange {
                start: from,
                end: from,
                count: total,
            });
        }

        info!(
            consumer = %consumer.name,
            stream,
            checkpoint = from,
            total,
            "Starting sync"
        );

        for range in ChunkPlan::new(from, total, self.config.chunk_size) {
            self.state = SyncState::Fetching;
            let commits = self
                .config
                .retry
                .run("fetch", || source.fetch(stream, range.start, range.end))?;
            verify_dense(&commits, &range, total)?;

            self.state = SyncState::Applying;
            let mut mutations = Vec::with_capacity(commits.len());
            for commit in &commits {
                match consumer.decomposer.decompose_commit(commit)? {
                    Some(mutation) => mutations.push(mutation),
                    None => report.ignored += 1,
                }
            }

            let decomposed = mutations.len();
            mutations.extend(consumer.decomposer.prunes());

            self.mirror.apply(&mutations)?;
            self.checkpoints.set(stream, &consumer.name, range.end)?;

            report.chunks += 1;
            report.commits += commits.len() as u64;
            report.mutations += decomposed as u64;
            report.to = range.end;

            debug!(
                consumer = %consumer.name,
                start = range.start,
                end = range.end,
                mutations = decomposed,
                "Chunk applied"
            );
        }

        info!(
            consumer = %consumer.name,
            from = report.from,
            to = report.to,
            chunks = report.chunks,
            mutations = report.mutations,
            "Sync complete"
        );

        Ok(report)
    }
}

/// The source must return exactly the indices of the requested range.
fn verify_dense(commits: &[Commit], range: &Range<u64>, total: u64) -> Result<()> {
    let dense = commits.len() as u64 == range.end - range.start
        && commits
            .iter()
            .zip(range.clone())
            .all(|(commit, index)| commit.index == index);

    if !dense {
        return Err(Error::InvalidRange {
            start: range.start,
            end: range.end,
            count: total,
        });
    }
    Ok(())
}
