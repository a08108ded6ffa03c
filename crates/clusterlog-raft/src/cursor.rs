//! Per-follower replication position over the shared log.

use crate::raft_log::{LogReader, RaftLog};
use crate::types::{IndexedEntry, LogIndex, ReaderMode, ReplicationError, Result};

/// Tracks the last entry handed out to one follower's replication driver.
///
/// The current entry doubles as the consistency anchor of the next append:
/// after [`ReplicationCursor::seek`] it is the entry just before the
/// requested index, and [`ReplicationCursor::advance`] yields the requested
/// index itself.
pub struct ReplicationCursor {
    reader: Box<dyn LogReader>,
    mode: ReaderMode,
    current: Option<IndexedEntry>,
}

impl ReplicationCursor {
    /// Opens a cursor positioned on the last entry visible in `mode`.
    ///
    /// A committed-only cursor ends at the commit index even when the log
    /// already holds later entries.
    pub fn open_at_end(log: &dyn RaftLog, mode: ReaderMode) -> Self {
        let end = match mode {
            ReaderMode::All => log.last_index(),
            ReaderMode::CommittedOnly => log.commit_index(),
        };
        let mut reader = log.open_reader(end, mode);
        let current = if reader.has_next() {
            reader.next_entry()
        } else {
            None
        };
        tracing::debug!(
            mode = ?mode,
            current = current.as_ref().map(|e| e.index.as_u64()).unwrap_or(0),
            "opened replication cursor at end of log"
        );
        Self {
            reader,
            mode,
            current,
        }
    }

    /// Repositions the cursor just before `index`.
    ///
    /// Returns false when the log no longer holds that position (compacted
    /// away, or beyond what this view exposes); the current entry is then
    /// empty, meaning the follower needs a snapshot instead of entries.
    pub fn seek(&mut self, index: LogIndex) -> bool {
        let prev = index.prev();
        if prev == LogIndex::ZERO {
            self.current = None;
            let reached = self.reader.reset(LogIndex::new(1));
            return reached == LogIndex::new(1);
        }

        let reached = self.reader.reset(prev);
        if reached == prev && self.reader.has_next() {
            self.current = self.reader.next_entry();
            self.current.is_some()
        } else {
            tracing::debug!(
                index = %index,
                reached = %reached,
                "seek target not held by log"
            );
            self.current = None;
            false
        }
    }

    /// Returns true if [`ReplicationCursor::advance`] would succeed.
    pub fn has_next(&self) -> bool {
        self.reader.has_next()
    }

    /// Returns the next entry and makes it current.
    pub fn advance(&mut self) -> Result<&IndexedEntry> {
        match self.reader.next_entry() {
            Some(entry) => Ok(&*self.current.insert(entry)),
            None => Err(ReplicationError::CursorExhausted {
                last: self.current_index(),
            }),
        }
    }

    /// The entry last returned or positioned by this cursor, if any.
    pub fn current_entry(&self) -> Option<&IndexedEntry> {
        self.current.as_ref()
    }

    /// Index of the current entry, or 0 when none is positioned.
    pub fn current_index(&self) -> LogIndex {
        self.current
            .as_ref()
            .map(|e| e.index)
            .unwrap_or(LogIndex::ZERO)
    }

    /// View this cursor reads through
    pub fn mode(&self) -> ReaderMode {
        self.mode
    }
}

impl std::fmt::Debug for ReplicationCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationCursor")
            .field("mode", &self.mode)
            .field("current", &self.current_index())
            .field("next", &self.reader.next_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft_log::MemoryRaftLog;
    use crate::types::{EntryPayload, Term};

    fn log_with(n: u64) -> MemoryRaftLog {
        let log = MemoryRaftLog::new();
        for _ in 0..n {
            log.append(Term::new(1), EntryPayload::Initial);
        }
        log
    }

    #[test]
    fn test_open_at_end_positions_on_last_entry() {
        let log = log_with(4);
        let mut cursor = ReplicationCursor::open_at_end(&log, ReaderMode::All);
        assert_eq!(cursor.current_index(), LogIndex::new(4));
        assert!(!cursor.has_next());

        log.append(Term::new(1), EntryPayload::Initial);
        assert_eq!(cursor.advance().unwrap().index, LogIndex::new(5));
    }

    #[test]
    fn test_open_at_end_of_empty_log() {
        let log = MemoryRaftLog::new();
        let cursor = ReplicationCursor::open_at_end(&log, ReaderMode::All);
        assert!(cursor.current_entry().is_none());
        assert_eq!(cursor.current_index(), LogIndex::ZERO);
    }

    #[test]
    fn test_committed_only_opens_at_commit() {
        let log = log_with(6);
        log.commit(LogIndex::new(3));
        let cursor = ReplicationCursor::open_at_end(&log, ReaderMode::CommittedOnly);
        assert_eq!(cursor.current_index(), LogIndex::new(3));
        assert!(!cursor.has_next());
    }

    #[test]
    fn test_seek_then_advance_yields_target() {
        let log = log_with(10);
        let mut cursor = ReplicationCursor::open_at_end(&log, ReaderMode::All);
        assert!(cursor.seek(LogIndex::new(4)));
        assert_eq!(cursor.current_index(), LogIndex::new(3));
        assert_eq!(cursor.advance().unwrap().index, LogIndex::new(4));
        assert_eq!(cursor.current_index(), LogIndex::new(4));
    }

    #[test]
    fn test_seek_to_first_index() {
        let log = log_with(3);
        let mut cursor = ReplicationCursor::open_at_end(&log, ReaderMode::All);
        assert!(cursor.seek(LogIndex::new(1)));
        assert!(cursor.current_entry().is_none());
        assert_eq!(cursor.advance().unwrap().index, LogIndex::new(1));
    }

    #[test]
    fn test_seek_past_truncated_end_is_empty() {
        let log = log_with(8);
        log.truncate_after(LogIndex::new(5));
        let mut cursor = ReplicationCursor::open_at_end(&log, ReaderMode::All);
        assert!(!cursor.seek(LogIndex::new(10)));
        assert!(cursor.current_entry().is_none());
        assert!(matches!(
            cursor.advance(),
            Err(ReplicationError::CursorExhausted { .. })
        ));
    }

    #[test]
    fn test_seek_into_compacted_prefix_requires_snapshot() {
        let log = log_with(20);
        log.compact_before(LogIndex::new(15));
        let mut cursor = ReplicationCursor::open_at_end(&log, ReaderMode::All);
        assert!(!cursor.seek(LogIndex::new(5)));
        assert!(cursor.current_entry().is_none());
        assert!(!cursor.seek(LogIndex::new(1)));
        assert!(cursor.seek(LogIndex::new(16)));
        assert_eq!(cursor.current_index(), LogIndex::new(15));
    }

    #[test]
    fn test_advance_on_exhausted_cursor_fails() {
        let log = log_with(2);
        let mut cursor = ReplicationCursor::open_at_end(&log, ReaderMode::All);
        let err = cursor.advance().unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::CursorExhausted { last } if last == LogIndex::new(2)
        ));
        // a failed advance keeps the current entry
        assert_eq!(cursor.current_index(), LogIndex::new(2));
    }

    #[test]
    fn test_committed_only_never_yields_uncommitted() {
        let log = log_with(3);
        log.commit(LogIndex::new(3));
        let mut cursor = ReplicationCursor::open_at_end(&log, ReaderMode::CommittedOnly);
        for _ in 0..5 {
            log.append(Term::new(2), EntryPayload::Initial);
        }
        assert!(!cursor.has_next());
        assert!(cursor.advance().is_err());

        log.commit(LogIndex::new(5));
        assert_eq!(cursor.advance().unwrap().index, LogIndex::new(4));
        assert_eq!(cursor.advance().unwrap().index, LogIndex::new(5));
        assert!(cursor.advance().is_err());
    }
}
