//! Shared fixtures for replication integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use clusterlog_raft::{
    ClusterReplicationTable, EntryPayload, LogIndex, ManualClock, MemberRole, MemoryRaftLog,
    NodeId, RaftLog, RaftMember, ReplicationConfig, Term,
};

/// A leader with a log, a controllable clock and a replication table.
pub struct TestLeader {
    pub id: NodeId,
    pub term: Term,
    pub clock: Arc<ManualClock>,
    pub log: MemoryRaftLog,
    pub table: ClusterReplicationTable,
}

impl TestLeader {
    /// Leader 1 with `voters` voting followers (ids 2..) and `learners`
    /// non-voting followers after them. The log starts with an initial
    /// entry and the configuration entry naming every member.
    pub fn new(voters: u64, learners: u64) -> Self {
        Self::with_config(voters, learners, ReplicationConfig::default())
    }

    pub fn with_config(voters: u64, learners: u64, config: ReplicationConfig) -> Self {
        let id = NodeId::new(1);
        let term = Term::new(1);
        let clock = Arc::new(ManualClock::new(1_000));
        let log = MemoryRaftLog::new();

        let mut members = vec![RaftMember::voting(id.as_u64())];
        members.extend((0..voters).map(|i| RaftMember::voting(i + 2)));
        members.extend((0..learners).map(|i| {
            RaftMember::new(NodeId::new(voters + 2 + i), MemberRole::NonVoting)
        }));

        log.append(term, EntryPayload::Initial);
        log.append(term, EntryPayload::Configuration(members.clone()));

        let table = ClusterReplicationTable::new(id, config, clock.clone())
            .expect("valid replication config");
        table
            .apply_configuration(&members, &log)
            .expect("fresh table accepts configuration");
        table.reset_all(&log);

        Self {
            id,
            term,
            clock,
            log,
            table,
        }
    }

    /// Appends `n` application entries and returns the last index.
    pub fn append(&self, n: u64) -> LogIndex {
        let mut last = self.log.last_index();
        for i in 0..n {
            let payload = Bytes::from(i.to_be_bytes().to_vec());
            last = self.log.append(self.term, EntryPayload::Application(payload));
        }
        last
    }

    /// Commits whatever a quorum of voters holds.
    pub fn advance_commit(&self) -> LogIndex {
        let quorum = self.table.quorum_match_index(self.log.last_index());
        self.log.commit(quorum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leader_fixture_layout() {
        let leader = TestLeader::new(2, 1);
        assert_eq!(leader.table.len(), 3);
        assert_eq!(leader.log.last_index(), LogIndex::new(2));
        let learner = leader.table.get(NodeId::new(4)).unwrap();
        assert_eq!(learner.role(), MemberRole::NonVoting);
    }
}
