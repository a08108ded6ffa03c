//! Leader-side replication state for a single follower.
//!
//! The replication driver asks this state whether it may send an append,
//! heartbeat, configure or install request, and reports back when the
//! request completes. Counters, flags and timestamps sit behind one small
//! lock so that completion callbacks arriving on I/O threads never wait on
//! cursor traversal; the cursor and the snapshot reader each have their own
//! lock and are only touched by the follower's driver.

use std::fmt;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;

use crate::clock::SharedClock;
use crate::config::ReplicationConfig;
use crate::cursor::ReplicationCursor;
use crate::pacer::AppendPacer;
use crate::raft_log::RaftLog;
use crate::snapshot::SnapshotChunkReader;
use crate::types::{
    IndexedEntry, LogIndex, MemberRole, Millis, NodeId, RaftMember, Result, Term,
};

#[derive(Debug)]
struct Progress {
    role: MemberRole,
    term: Term,
    config_index: LogIndex,
    match_index: LogIndex,
    snapshot_index: LogIndex,
    next_snapshot_index: LogIndex,
    next_snapshot_chunk: Option<Bytes>,
    heartbeat_time: Millis,
    response_time: Millis,
    in_flight_appends: usize,
    append_succeeded: bool,
    append_sent_at: Millis,
    configuring: bool,
    installing: bool,
    failures: u32,
    first_failure_at: Option<Millis>,
    pacer: AppendPacer,
}

impl Progress {
    fn new(role: MemberRole, window: usize) -> Self {
        Self {
            role,
            term: Term::default(),
            config_index: LogIndex::ZERO,
            match_index: LogIndex::ZERO,
            snapshot_index: LogIndex::ZERO,
            next_snapshot_index: LogIndex::ZERO,
            next_snapshot_chunk: None,
            heartbeat_time: 0,
            response_time: 0,
            in_flight_appends: 0,
            append_succeeded: false,
            append_sent_at: 0,
            configuring: false,
            installing: false,
            failures: 0,
            first_failure_at: None,
            pacer: AppendPacer::new(window),
        }
    }

    /// Clears everything that only makes sense within one leadership term.
    /// Term, config index and match index describe durable follower progress
    /// and survive.
    fn clear_ephemeral(&mut self) {
        self.snapshot_index = LogIndex::ZERO;
        self.next_snapshot_index = LogIndex::ZERO;
        self.next_snapshot_chunk = None;
        self.heartbeat_time = 0;
        self.response_time = 0;
        self.in_flight_appends = 0;
        self.append_succeeded = false;
        self.append_sent_at = 0;
        self.configuring = false;
        self.installing = false;
        self.failures = 0;
        self.first_failure_at = None;
        self.pacer.clear();
    }
}

/// Point-in-time copy of a follower's replication bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FollowerStatus {
    /// Follower identity
    pub id: NodeId,
    /// Voting role
    pub role: MemberRole,
    /// Last term the follower acknowledged
    pub term: Term,
    /// Last configuration index the follower acknowledged
    pub config_index: LogIndex,
    /// Highest index confirmed stored by the follower
    pub match_index: LogIndex,
    /// Snapshot index known to be installed on the follower
    pub snapshot_index: LogIndex,
    /// Outstanding append requests
    pub in_flight_appends: usize,
    /// Outcome of the last completed append
    pub last_append_succeeded: bool,
    /// Whether a configure request is outstanding
    pub configuring: bool,
    /// Whether an install request is outstanding
    pub installing: bool,
    /// Consecutive failures
    pub failure_count: u32,
    /// When the current failure streak began
    pub first_failure_at: Option<Millis>,
    /// Last heartbeat sent
    pub heartbeat_time: Millis,
    /// Last response received
    pub response_time: Millis,
    /// Mean append round-trip time (ms)
    pub mean_append_rtt_ms: f64,
}

/// Replication state the leader keeps for one cluster member.
pub struct FollowerReplicationState {
    id: NodeId,
    max_appends: usize,
    clock: SharedClock,
    progress: Mutex<Progress>,
    cursor: Mutex<ReplicationCursor>,
    snapshot_reader: Mutex<Option<Box<dyn SnapshotChunkReader>>>,
}

impl FollowerReplicationState {
    /// Creates state for `member`, with a cursor at the end of `log`.
    pub fn new(
        member: RaftMember,
        config: &ReplicationConfig,
        clock: SharedClock,
        log: &dyn RaftLog,
    ) -> Self {
        let cursor = ReplicationCursor::open_at_end(log, member.role.reader_mode());
        Self {
            id: member.id,
            max_appends: config.max_appends_per_follower.max(1),
            clock,
            progress: Mutex::new(Progress::new(member.role, config.append_window_size)),
            cursor: Mutex::new(cursor),
            snapshot_reader: Mutex::new(None),
        }
    }

    /// Resets the state at the start of a leadership term.
    ///
    /// Clears in-flight bookkeeping, gates, failure streak and snapshot
    /// progress, drops any attached snapshot reader and reopens the cursor at
    /// the end of `log` in the view the member's current role requires.
    pub fn reset_state(&self, log: &dyn RaftLog) {
        let role = {
            let mut progress = self.progress.lock();
            progress.clear_ephemeral();
            progress.role
        };
        let cursor = ReplicationCursor::open_at_end(log, role.reader_mode());
        let current = cursor.current_index();
        *self.cursor.lock() = cursor;
        self.snapshot_reader.lock().take();

        tracing::debug!(
            node_id = %self.id,
            role = %role,
            cursor = %current,
            "reset follower replication state"
        );
    }

    /// Member identity
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Member descriptor with its current role
    pub fn member(&self) -> RaftMember {
        RaftMember::new(self.id, self.progress.lock().role)
    }

    /// Current voting role
    pub fn role(&self) -> MemberRole {
        self.progress.lock().role
    }

    /// Records a role change. The cursor view follows on the next reset.
    pub fn set_role(&self, role: MemberRole) {
        let mut progress = self.progress.lock();
        if progress.role != role {
            tracing::info!(
                node_id = %self.id,
                from = %progress.role,
                to = %role,
                "member role changed"
            );
            progress.role = role;
        }
    }

    /// Maximum appends allowed in flight
    pub fn max_appends(&self) -> usize {
        self.max_appends
    }

    // Append pipeline

    /// Returns true if an append request may be sent now.
    ///
    /// An empty pipeline always admits a send. Otherwise the previous append
    /// must have succeeded, the pipeline must have room, and sends are spaced
    /// by the mean round-trip time divided by the pipeline depth.
    pub fn can_append(&self) -> bool {
        let progress = self.progress.lock();
        if progress.in_flight_appends == 0 {
            return true;
        }
        if !progress.append_succeeded || progress.in_flight_appends >= self.max_appends {
            return false;
        }
        let elapsed = self
            .clock
            .now_millis()
            .saturating_sub(progress.append_sent_at);
        elapsed as f64 >= progress.pacer.send_interval(self.max_appends)
    }

    /// Records that an append request was sent.
    pub fn start_append(&self) {
        let now = self.clock.now_millis();
        let mut progress = self.progress.lock();
        progress.in_flight_appends += 1;
        progress.append_sent_at = now;
    }

    /// Records the completion of an append request.
    ///
    /// `rtt_ms`, when present, feeds the pacing window. A completion with
    /// nothing in flight belongs to an earlier term and is ignored.
    pub fn complete_append(&self, succeeded: bool, rtt_ms: Option<u64>) {
        let mut progress = self.progress.lock();
        if progress.in_flight_appends == 0 {
            tracing::warn!(
                node_id = %self.id,
                "append completed with no append in flight"
            );
            return;
        }
        progress.in_flight_appends -= 1;
        if let Some(rtt) = rtt_ms {
            progress.pacer.record(rtt);
        }
        progress.append_succeeded = succeeded;
    }

    /// Flags the last append as successful without completing it.
    pub fn append_succeeded(&self) {
        self.progress.lock().append_succeeded = true;
    }

    /// Flags the last append as failed without completing it.
    pub fn append_failed(&self) {
        self.progress.lock().append_succeeded = false;
    }

    /// Outstanding append requests
    pub fn in_flight_append_count(&self) -> usize {
        self.progress.lock().in_flight_appends
    }

    /// Outcome of the most recently completed append
    pub fn last_append_succeeded(&self) -> bool {
        self.progress.lock().append_succeeded
    }

    /// Time of the most recent append send
    pub fn last_append_sent_at(&self) -> Millis {
        self.progress.lock().append_sent_at
    }

    /// Mean append round-trip time over the pacing window
    pub fn mean_append_rtt(&self) -> f64 {
        self.progress.lock().pacer.mean()
    }

    /// Returns true if a heartbeat may be sent, i.e. no append is in flight.
    pub fn can_heartbeat(&self) -> bool {
        self.progress.lock().in_flight_appends == 0
    }

    // Configuration gate

    /// Returns true if no configure request is outstanding.
    pub fn can_configure(&self) -> bool {
        !self.progress.lock().configuring
    }

    /// Records that a configure request was sent.
    pub fn start_configure(&self) {
        self.progress.lock().configuring = true;
    }

    /// Records the completion of the outstanding configure request.
    pub fn complete_configure(&self) {
        self.progress.lock().configuring = false;
    }

    /// Whether a configure request is outstanding
    pub fn is_configuring(&self) -> bool {
        self.progress.lock().configuring
    }

    // Install gate

    /// Returns true if no install request is outstanding.
    pub fn can_install(&self) -> bool {
        !self.progress.lock().installing
    }

    /// Records that an install request was sent.
    pub fn start_install(&self) {
        self.progress.lock().installing = true;
    }

    /// Records the completion of the outstanding install request.
    pub fn complete_install(&self) {
        self.progress.lock().installing = false;
    }

    /// Whether an install request is outstanding
    pub fn is_installing(&self) -> bool {
        self.progress.lock().installing
    }

    // Failure tracking

    /// Extends the consecutive failure streak and returns its new length.
    ///
    /// The streak start time is only recorded by the first failure.
    pub fn increment_failure_count(&self) -> u32 {
        let now = self.clock.now_millis();
        let mut progress = self.progress.lock();
        if progress.failures == 0 {
            progress.first_failure_at = Some(now);
            tracing::warn!(node_id = %self.id, "follower failure streak started");
        }
        progress.failures += 1;
        progress.failures
    }

    /// Ends the failure streak.
    pub fn reset_failure_count(&self) {
        let mut progress = self.progress.lock();
        if progress.failures > 0 {
            tracing::debug!(
                node_id = %self.id,
                failures = progress.failures,
                "follower recovered"
            );
        }
        progress.failures = 0;
        progress.first_failure_at = None;
    }

    /// Length of the current failure streak
    pub fn failure_count(&self) -> u32 {
        self.progress.lock().failures
    }

    /// When the current failure streak began, if one is running
    pub fn first_failure_at(&self) -> Option<Millis> {
        self.progress.lock().first_failure_at
    }

    // Follower progress

    /// Last term the follower acknowledged
    pub fn term(&self) -> Term {
        self.progress.lock().term
    }

    /// Sets the last term the follower acknowledged
    pub fn set_term(&self, term: Term) {
        self.progress.lock().term = term;
    }

    /// Last configuration index the follower acknowledged
    pub fn config_index(&self) -> LogIndex {
        self.progress.lock().config_index
    }

    /// Sets the last configuration index the follower acknowledged
    pub fn set_config_index(&self, index: LogIndex) {
        self.progress.lock().config_index = index;
    }

    /// Highest index confirmed stored by the follower
    pub fn match_index(&self) -> LogIndex {
        self.progress.lock().match_index
    }

    /// Sets the follower's match index.
    ///
    /// Negative values are rejected. A value below the current one is
    /// accepted but logged, since callers are expected to only move it forward.
    pub fn set_match_index(&self, index: i64) -> Result<()> {
        let index = LogIndex::try_from(index)?;
        let mut progress = self.progress.lock();
        if index < progress.match_index {
            tracing::warn!(
                node_id = %self.id,
                current = %progress.match_index,
                new = %index,
                "match index moved backwards"
            );
        }
        progress.match_index = index;
        Ok(())
    }

    /// Snapshot index known to be installed on the follower
    pub fn snapshot_index(&self) -> LogIndex {
        self.progress.lock().snapshot_index
    }

    /// Sets the snapshot index known to be installed on the follower
    pub fn set_snapshot_index(&self, index: LogIndex) {
        self.progress.lock().snapshot_index = index;
    }

    /// Index of the snapshot currently being transferred
    pub fn next_snapshot_index(&self) -> LogIndex {
        self.progress.lock().next_snapshot_index
    }

    /// Sets the index of the snapshot currently being transferred
    pub fn set_next_snapshot_index(&self, index: LogIndex) {
        self.progress.lock().next_snapshot_index = index;
    }

    /// Id of the chunk the follower expects next; `None` means the start.
    pub fn next_snapshot_chunk(&self) -> Option<Bytes> {
        self.progress.lock().next_snapshot_chunk.clone()
    }

    /// Sets the id of the chunk the follower expects next
    pub fn set_next_snapshot_chunk(&self, chunk: Option<Bytes>) {
        self.progress.lock().next_snapshot_chunk = chunk;
    }

    /// Last heartbeat sent
    pub fn heartbeat_time(&self) -> Millis {
        self.progress.lock().heartbeat_time
    }

    /// Records a heartbeat time; older values than the stored one are ignored.
    pub fn set_heartbeat_time(&self, time: Millis) {
        let mut progress = self.progress.lock();
        progress.heartbeat_time = progress.heartbeat_time.max(time);
    }

    /// Last response received
    pub fn response_time(&self) -> Millis {
        self.progress.lock().response_time
    }

    /// Records a response time; older values than the stored one are ignored.
    pub fn set_response_time(&self, time: Millis) {
        let mut progress = self.progress.lock();
        progress.response_time = progress.response_time.max(time);
    }

    // Cursor

    /// Runs `f` with exclusive access to the replication cursor.
    pub fn with_cursor<R>(&self, f: impl FnOnce(&mut ReplicationCursor) -> R) -> R {
        f(&mut self.cursor.lock())
    }

    /// Returns true if the cursor has another entry to hand out
    pub fn has_next_entry(&self) -> bool {
        self.cursor.lock().has_next()
    }

    /// Advances the cursor and returns the new current entry.
    pub fn next_entry(&self) -> Result<IndexedEntry> {
        self.cursor.lock().advance().cloned()
    }

    /// The cursor's current entry
    pub fn current_entry(&self) -> Option<IndexedEntry> {
        self.cursor.lock().current_entry().cloned()
    }

    /// Index of the cursor's current entry, or 0
    pub fn current_index(&self) -> LogIndex {
        self.cursor.lock().current_index()
    }

    /// Repositions the cursor just before `index`; false means a snapshot is needed.
    pub fn seek(&self, index: LogIndex) -> bool {
        self.cursor.lock().seek(index)
    }

    // Snapshot reader

    /// Attaches the reader for the snapshot being installed, replacing any previous one.
    pub fn attach_snapshot_reader(&self, reader: Box<dyn SnapshotChunkReader>) {
        tracing::debug!(
            node_id = %self.id,
            snapshot_index = %reader.index(),
            "attached snapshot reader"
        );
        *self.snapshot_reader.lock() = Some(reader);
    }

    /// Detaches and returns the snapshot reader, if one is attached.
    pub fn detach_snapshot_reader(&self) -> Option<Box<dyn SnapshotChunkReader>> {
        self.snapshot_reader.lock().take()
    }

    /// Returns true if a snapshot reader is attached
    pub fn has_snapshot_reader(&self) -> bool {
        self.snapshot_reader.lock().is_some()
    }

    /// Runs `f` with the attached snapshot reader, if any.
    pub fn with_snapshot_reader<R>(
        &self,
        f: impl FnOnce(&mut dyn SnapshotChunkReader) -> R,
    ) -> Option<R> {
        let mut guard = self.snapshot_reader.lock();
        guard.as_mut().map(|reader| f(reader.as_mut()))
    }

    /// Copies the current bookkeeping.
    pub fn status(&self) -> FollowerStatus {
        let progress = self.progress.lock();
        FollowerStatus {
            id: self.id,
            role: progress.role,
            term: progress.term,
            config_index: progress.config_index,
            match_index: progress.match_index,
            snapshot_index: progress.snapshot_index,
            in_flight_appends: progress.in_flight_appends,
            last_append_succeeded: progress.append_succeeded,
            configuring: progress.configuring,
            installing: progress.installing,
            failure_count: progress.failures,
            first_failure_at: progress.first_failure_at,
            heartbeat_time: progress.heartbeat_time,
            response_time: progress.response_time,
            mean_append_rtt_ms: progress.pacer.mean(),
        }
    }
}

impl fmt::Display for FollowerReplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.status();
        write!(
            f,
            "Follower{{member={}, role={}, term={}, configIndex={}, snapshotIndex={}, \
             matchIndex={}, heartbeatTime={}, appending={}, appendSucceeded={}, \
             configuring={}, installing={}, failures={}}}",
            s.id,
            s.role,
            s.term,
            s.config_index,
            s.snapshot_index,
            s.match_index,
            s.heartbeat_time,
            s.in_flight_appends,
            s.last_append_succeeded,
            s.configuring,
            s.installing,
            s.failure_count
        )
    }
}

impl fmt::Debug for FollowerReplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FollowerReplicationState")
            .field("status", &self.status())
            .field("cursor", &*self.cursor.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::raft_log::MemoryRaftLog;
    use crate::snapshot::MemorySnapshotReader;
    use crate::types::{EntryPayload, ReaderMode, ReplicationError};
    use std::sync::Arc;

    fn setup(max_appends: usize) -> (FollowerReplicationState, Arc<ManualClock>, MemoryRaftLog) {
        setup_with_role(max_appends, MemberRole::Voting)
    }

    fn setup_with_role(
        max_appends: usize,
        role: MemberRole,
    ) -> (FollowerReplicationState, Arc<ManualClock>, MemoryRaftLog) {
        let clock = Arc::new(ManualClock::new(1_000));
        let log = MemoryRaftLog::new();
        for _ in 0..5 {
            log.append(Term::new(1), EntryPayload::Initial);
        }
        let config = ReplicationConfig {
            max_appends_per_follower: max_appends,
            ..Default::default()
        };
        let state = FollowerReplicationState::new(
            RaftMember::new(NodeId::new(2), role),
            &config,
            clock.clone(),
            &log,
        );
        (state, clock, log)
    }

    #[test]
    fn test_can_append_with_empty_pipeline() {
        let (state, _clock, _log) = setup(2);
        assert!(state.can_append());
        assert!(!state.last_append_succeeded());
    }

    #[test]
    fn test_second_append_requires_success() {
        let (state, _clock, _log) = setup(4);
        state.start_append();
        // no append has completed successfully yet
        assert!(!state.can_append());
        state.append_succeeded();
        assert!(state.can_append());
        state.append_failed();
        assert!(!state.can_append());
    }

    #[test]
    fn test_pipeline_full_blocks_append() {
        let (state, clock, _log) = setup(2);
        state.append_succeeded();
        state.start_append();
        state.start_append();
        assert_eq!(state.in_flight_append_count(), 2);
        clock.advance(10_000);
        assert!(!state.can_append());
    }

    #[test]
    fn test_pacing_after_round_trips() {
        let (state, clock, _log) = setup(2);
        for _ in 0..2 {
            state.start_append();
            state.complete_append(true, Some(100));
        }
        assert_eq!(state.mean_append_rtt(), 100.0);

        state.start_append();
        assert!(!state.can_append());
        clock.advance(49);
        assert!(!state.can_append());
        clock.advance(1);
        assert!(state.can_append());
    }

    #[test]
    fn test_two_in_flight_then_one_completes() {
        let (state, clock, _log) = setup(2);
        state.start_append();
        state.start_append();
        assert!(!state.can_append());

        state.complete_append(true, Some(100));
        assert_eq!(state.in_flight_append_count(), 1);
        clock.advance(30);
        assert!(!state.can_append());
        clock.advance(20);
        assert!(state.can_append());
    }

    #[test]
    fn test_no_samples_means_no_delay() {
        let (state, _clock, _log) = setup(3);
        state.start_append();
        state.complete_append(true, None);
        state.start_append();
        assert_eq!(state.mean_append_rtt(), 0.0);
        assert!(state.can_append());
    }

    #[test]
    fn test_complete_without_start_never_negative() {
        let (state, _clock, _log) = setup(2);
        state.complete_append(false, None);
        assert_eq!(state.in_flight_append_count(), 0);
        assert!(state.can_append());
    }

    #[test]
    fn test_stale_completion_after_reset_is_ignored() {
        let (state, clock, log) = setup(2);
        state.start_append();
        state.reset_state(&log);

        state.complete_append(true, Some(10_000));
        assert_eq!(state.in_flight_append_count(), 0);
        assert_eq!(state.mean_append_rtt(), 0.0);
        assert!(!state.last_append_succeeded());

        // new term: one fresh round trip, then the pipeline paces on it alone
        state.start_append();
        state.complete_append(true, Some(20));
        state.start_append();
        clock.advance(10);
        assert_eq!(state.in_flight_append_count(), 1);
        assert!(state.can_append());
    }

    #[test]
    fn test_heartbeat_only_when_idle() {
        let (state, _clock, _log) = setup(2);
        assert!(state.can_heartbeat());
        state.start_append();
        assert!(!state.can_heartbeat());
        state.complete_append(true, Some(5));
        assert!(state.can_heartbeat());
    }

    #[test]
    fn test_configure_gate_independent() {
        let (state, _clock, _log) = setup(2);
        assert!(state.can_configure());
        state.start_configure();
        assert!(!state.can_configure());
        assert!(state.can_install());
        assert!(state.can_append());

        state.start_install();
        state.start_append();
        state.complete_install();
        state.complete_append(true, None);
        assert!(!state.can_configure());

        state.complete_configure();
        assert!(state.can_configure());
    }

    #[test]
    fn test_install_gate() {
        let (state, _clock, _log) = setup(2);
        state.start_install();
        assert!(!state.can_install());
        assert!(state.is_installing());
        assert!(state.can_configure());
        state.complete_install();
        assert!(state.can_install());
    }

    #[test]
    fn test_failure_streak_keeps_first_time() {
        let (state, clock, _log) = setup(2);
        assert_eq!(state.first_failure_at(), None);
        assert_eq!(state.increment_failure_count(), 1);
        assert_eq!(state.first_failure_at(), Some(1_000));
        clock.advance(500);
        assert_eq!(state.increment_failure_count(), 2);
        assert_eq!(state.first_failure_at(), Some(1_000));

        state.reset_failure_count();
        assert_eq!(state.failure_count(), 0);
        assert_eq!(state.first_failure_at(), None);

        assert_eq!(state.increment_failure_count(), 1);
        assert_eq!(state.first_failure_at(), Some(1_500));
    }

    #[test]
    fn test_set_match_index_rejects_negative() {
        let (state, _clock, _log) = setup(2);
        let err = state.set_match_index(-1).unwrap_err();
        assert!(matches!(err, ReplicationError::InvalidArgument { .. }));
        assert_eq!(state.match_index(), LogIndex::ZERO);
    }

    #[test]
    fn test_set_match_index_accepts_decrease() {
        // decreasing values are a caller bug but are deliberately not rejected
        let (state, _clock, _log) = setup(2);
        state.set_match_index(5).unwrap();
        state.set_match_index(3).unwrap();
        assert_eq!(state.match_index(), LogIndex::new(3));
    }

    #[test]
    fn test_heartbeat_and_response_times_max_merge() {
        let (state, _clock, _log) = setup(2);
        state.set_heartbeat_time(200);
        state.set_heartbeat_time(100);
        assert_eq!(state.heartbeat_time(), 200);
        state.set_response_time(300);
        state.set_response_time(250);
        assert_eq!(state.response_time(), 300);
        state.set_response_time(301);
        assert_eq!(state.response_time(), 301);
    }

    #[test]
    fn test_reset_state_clears_ephemeral_keeps_durable() {
        let (state, _clock, log) = setup(2);
        state.set_term(Term::new(3));
        state.set_config_index(LogIndex::new(2));
        state.set_match_index(4).unwrap();
        state.set_snapshot_index(LogIndex::new(1));
        state.set_next_snapshot_index(LogIndex::new(9));
        state.set_next_snapshot_chunk(Some(Bytes::from_static(b"7")));
        state.set_heartbeat_time(50);
        state.set_response_time(60);
        state.start_append();
        state.start_configure();
        state.start_install();
        state.increment_failure_count();
        state.increment_failure_count();
        state.attach_snapshot_reader(Box::new(MemorySnapshotReader::new(
            LogIndex::new(9),
            Term::new(1),
            Vec::new(),
        )));

        log.append(Term::new(2), EntryPayload::Initial);
        state.reset_state(&log);

        assert_eq!(state.failure_count(), 0);
        assert_eq!(state.first_failure_at(), None);
        assert_eq!(state.in_flight_append_count(), 0);
        assert!(state.can_configure());
        assert!(state.can_install());
        assert!(!state.last_append_succeeded());
        assert_eq!(state.heartbeat_time(), 0);
        assert_eq!(state.response_time(), 0);
        assert_eq!(state.snapshot_index(), LogIndex::ZERO);
        assert_eq!(state.next_snapshot_index(), LogIndex::ZERO);
        assert_eq!(state.next_snapshot_chunk(), None);
        assert_eq!(state.mean_append_rtt(), 0.0);
        assert!(!state.has_snapshot_reader());
        assert_eq!(state.current_index(), LogIndex::new(6));

        assert_eq!(state.term(), Term::new(3));
        assert_eq!(state.config_index(), LogIndex::new(2));
        assert_eq!(state.match_index(), LogIndex::new(4));
    }

    #[test]
    fn test_reset_uses_role_for_cursor_mode() {
        let (state, _clock, log) = setup_with_role(2, MemberRole::NonVoting);
        assert_eq!(state.with_cursor(|c| c.mode()), ReaderMode::CommittedOnly);

        state.set_role(MemberRole::Voting);
        // the cursor view only changes on reset
        assert_eq!(state.with_cursor(|c| c.mode()), ReaderMode::CommittedOnly);
        state.reset_state(&log);
        assert_eq!(state.with_cursor(|c| c.mode()), ReaderMode::All);
        assert_eq!(state.member(), RaftMember::new(NodeId::new(2), MemberRole::Voting));
    }

    #[test]
    fn test_cursor_passthrough() {
        let (state, _clock, log) = setup(2);
        assert_eq!(state.current_index(), LogIndex::new(5));
        assert!(!state.has_next_entry());
        assert!(state.seek(LogIndex::new(3)));
        assert_eq!(state.current_entry().unwrap().index, LogIndex::new(2));
        assert!(state.has_next_entry());
        assert_eq!(state.next_entry().unwrap().index, LogIndex::new(3));

        log.compact_before(LogIndex::new(4));
        assert!(!state.seek(LogIndex::new(2)));
        assert!(state.current_entry().is_none());
    }

    #[test]
    fn test_snapshot_reader_attach_detach() {
        let (state, _clock, _log) = setup(2);
        assert!(state.with_snapshot_reader(|r| r.index()).is_none());

        state.attach_snapshot_reader(Box::new(MemorySnapshotReader::from_bytes(
            LogIndex::new(4),
            Term::new(1),
            Bytes::from_static(b"abcd"),
            2,
        )));
        assert!(state.has_snapshot_reader());
        let id = state.with_snapshot_reader(|r| r.next_id()).flatten();
        assert_eq!(id, Some(Bytes::from("0")));

        let reader = state.detach_snapshot_reader().unwrap();
        assert_eq!(reader.index(), LogIndex::new(4));
        assert!(!state.has_snapshot_reader());
    }

    #[test]
    fn test_display_summary() {
        let (state, _clock, _log) = setup(2);
        state.set_match_index(3).unwrap();
        state.start_append();
        let text = state.to_string();
        assert!(text.contains("member=2"));
        assert!(text.contains("matchIndex=3"));
        assert!(text.contains("appending=1"));
    }
}
