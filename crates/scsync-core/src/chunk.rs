use std::ops::Range;

/// Default number of commits fetched and applied per transaction.
pub const DEFAULT_CHUNK_SIZE: u64 = 1000;

/// Splits the commit range `[from, to)` into consecutive chunks.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    next: u64,
    end: u64,
    size: u64,
}

impl ChunkPlan {
    /// A zero chunk size is treated as one commit per chunk.
    pub fn new(from: u64, to: u64, size: u64) -> Self {
        Self {
            next: from,
            end: to,
            size: size.max(1),
        }
    }

    /// Number of chunks left to yield.
    pub fn remaining(&self) -> u64 {
        if self.next >= self.end {
            0
        } else {
            (self.end - self.next).div_ceil(self.size)
        }
    }
}

impl Iterator for ChunkPlan {
    type Item = Range<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.size).min(self.end);
        self.next = end;
        Some(start..end)
    }
}
