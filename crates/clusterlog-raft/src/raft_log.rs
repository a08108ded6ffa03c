//! Replicated log contract required by the leader, plus an in-memory log.
//!
//! The leader never writes through these traits; it only opens readers over
//! the shared log, one per follower. A reader positioned in
//! [`ReaderMode::CommittedOnly`] never exposes an entry above the commit
//! index, even if the log already holds it.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{EntryPayload, IndexedEntry, LogIndex, ReaderMode, Term};

/// Read access to the leader's append-only log.
pub trait RaftLog: Send + Sync {
    /// Index of the oldest entry still held (compaction moves it forward).
    fn first_index(&self) -> LogIndex;

    /// Index of the newest entry, or `first_index - 1` when empty.
    fn last_index(&self) -> LogIndex;

    /// Highest index known to be replicated to a quorum.
    fn commit_index(&self) -> LogIndex;

    /// Opens a reader whose next entry is `from`, clamped to what the view holds.
    fn open_reader(&self, from: LogIndex, mode: ReaderMode) -> Box<dyn LogReader>;
}

/// Forward reader over a [`RaftLog`].
pub trait LogReader: Send {
    /// Returns true if [`LogReader::next_entry`] would yield an entry.
    fn has_next(&self) -> bool;

    /// Returns the next entry and moves past it.
    fn next_entry(&mut self) -> Option<IndexedEntry>;

    /// Repositions the reader so the next entry is `index`.
    ///
    /// Returns the index actually reached: the first held index if `index`
    /// was compacted away, or one past the end of the view if `index` lies
    /// beyond it.
    fn reset(&mut self, index: LogIndex) -> LogIndex;

    /// Index the next call to [`LogReader::next_entry`] would return.
    fn next_index(&self) -> LogIndex;
}

#[derive(Debug)]
struct LogInner {
    entries: VecDeque<IndexedEntry>,
    /// Index of `entries[0]`, or the next index to be written when empty.
    first: u64,
    commit: u64,
}

impl LogInner {
    fn last(&self) -> u64 {
        self.first + self.entries.len() as u64 - 1
    }

    fn get(&self, index: u64) -> Option<&IndexedEntry> {
        if index < self.first {
            return None;
        }
        self.entries.get((index - self.first) as usize)
    }

    fn visible_bound(&self, mode: ReaderMode) -> u64 {
        match mode {
            ReaderMode::All => self.last(),
            ReaderMode::CommittedOnly => self.commit.min(self.last()),
        }
    }
}

/// In-memory [`RaftLog`] shared between the leader and its readers.
///
/// Cloning yields another handle to the same log.
#[derive(Debug, Clone)]
pub struct MemoryRaftLog {
    inner: Arc<RwLock<LogInner>>,
}

impl MemoryRaftLog {
    /// Creates an empty log whose first entry will be written at index 1.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(LogInner {
                entries: VecDeque::new(),
                first: 1,
                commit: 0,
            })),
        }
    }

    /// Appends an entry and returns its index.
    pub fn append(&self, term: Term, payload: EntryPayload) -> LogIndex {
        let mut inner = self.inner.write();
        let index = LogIndex::new(inner.last() + 1);
        inner
            .entries
            .push_back(IndexedEntry::new(index, term, payload));
        index
    }

    /// Advances the commit index, capped at the last entry. Never moves it back.
    pub fn commit(&self, index: LogIndex) -> LogIndex {
        let mut inner = self.inner.write();
        let capped = index.as_u64().min(inner.last());
        inner.commit = inner.commit.max(capped);
        LogIndex::new(inner.commit)
    }

    /// Removes every entry after `index`, as a leader change may require.
    pub fn truncate_after(&self, index: LogIndex) {
        let mut inner = self.inner.write();
        let keep_last = index.as_u64().max(inner.first - 1);
        while inner.last() > keep_last {
            inner.entries.pop_back();
        }
        inner.commit = inner.commit.min(keep_last);
        tracing::debug!(index = %index, last = inner.last(), "truncated log");
    }

    /// Drops every entry before `index`, as after taking a snapshot.
    pub fn compact_before(&self, index: LogIndex) {
        let mut inner = self.inner.write();
        let target = index.as_u64().min(inner.last() + 1);
        while inner.first < target {
            inner.entries.pop_front();
            inner.first += 1;
        }
        tracing::debug!(index = %index, first = inner.first, "compacted log");
    }

    /// Returns the entry at `index` if it is still held.
    pub fn get(&self, index: LogIndex) -> Option<IndexedEntry> {
        self.inner.read().get(index.as_u64()).cloned()
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if the log holds no entry
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

impl Default for MemoryRaftLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RaftLog for MemoryRaftLog {
    fn first_index(&self) -> LogIndex {
        LogIndex::new(self.inner.read().first)
    }

    fn last_index(&self) -> LogIndex {
        LogIndex::new(self.inner.read().last())
    }

    fn commit_index(&self) -> LogIndex {
        LogIndex::new(self.inner.read().commit)
    }

    fn open_reader(&self, from: LogIndex, mode: ReaderMode) -> Box<dyn LogReader> {
        let mut reader = MemoryLogReader {
            inner: Arc::clone(&self.inner),
            next: 1,
            mode,
        };
        reader.reset(from);
        Box::new(reader)
    }
}

/// Reader over a [`MemoryRaftLog`].
#[derive(Debug)]
pub struct MemoryLogReader {
    inner: Arc<RwLock<LogInner>>,
    next: u64,
    mode: ReaderMode,
}

impl LogReader for MemoryLogReader {
    fn has_next(&self) -> bool {
        let inner = self.inner.read();
        self.next >= inner.first && self.next <= inner.visible_bound(self.mode)
    }

    fn next_entry(&mut self) -> Option<IndexedEntry> {
        let entry = {
            let inner = self.inner.read();
            if self.next > inner.visible_bound(self.mode) {
                return None;
            }
            inner.get(self.next).cloned()
        }?;
        self.next += 1;
        Some(entry)
    }

    fn reset(&mut self, index: LogIndex) -> LogIndex {
        let inner = self.inner.read();
        let upper = inner.visible_bound(self.mode) + 1;
        self.next = index.as_u64().max(1).max(inner.first).min(upper);
        LogIndex::new(self.next)
    }

    fn next_index(&self) -> LogIndex {
        LogIndex::new(self.next)
    }
}
