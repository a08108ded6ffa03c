//! Leader-wide table of follower replication state.
//!
//! One entry per cluster member other than the leader itself. Entries are
//! created when a member joins the leader's view (or for every member when
//! the node becomes leader) and dropped when the member leaves or leadership
//! is lost. Per-follower tasks look up their entry once and then work on the
//! shared `Arc` without touching the table again.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::clock::SharedClock;
use crate::config::ReplicationConfig;
use crate::health::{MemberHealth, ReplicationHealthReport};
use crate::member::FollowerReplicationState;
use crate::raft_log::RaftLog;
use crate::types::{LogIndex, NodeId, RaftMember, ReplicationError, Result};

/// Maps every follower to the leader's replication state for it.
pub struct ClusterReplicationTable {
    local_id: NodeId,
    config: ReplicationConfig,
    clock: SharedClock,
    followers: DashMap<NodeId, Arc<FollowerReplicationState>>,
}

impl ClusterReplicationTable {
    /// Creates an empty table for leader `local_id`.
    pub fn new(local_id: NodeId, config: ReplicationConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            local_id,
            config,
            clock,
            followers: DashMap::new(),
        })
    }

    /// Leader identity
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Settings applied to every follower
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Adds replication state for a member joining the cluster.
    pub fn add_member(
        &self,
        member: RaftMember,
        log: &dyn RaftLog,
    ) -> Result<Arc<FollowerReplicationState>> {
        if member.id == self.local_id {
            return Err(ReplicationError::InvalidArgument {
                msg: format!("leader {} cannot replicate to itself", member.id),
            });
        }
        match self.followers.entry(member.id) {
            Entry::Occupied(_) => Err(ReplicationError::MemberExists(member.id)),
            Entry::Vacant(slot) => {
                tracing::info!(
                    node_id = %member.id,
                    role = %member.role,
                    "added follower to replication table"
                );
                let state = Arc::new(FollowerReplicationState::new(
                    member,
                    &self.config,
                    Arc::clone(&self.clock),
                    log,
                ));
                slot.insert(Arc::clone(&state));
                Ok(state)
            }
        }
    }

    /// Drops the state of a member removed from the cluster.
    ///
    /// Outstanding requests to the member are never completed into the table
    /// again; dropping the state is what releases its gates.
    pub fn remove_member(&self, id: NodeId) -> Result<Arc<FollowerReplicationState>> {
        let (_, state) = self
            .followers
            .remove(&id)
            .ok_or(ReplicationError::UnknownMember(id))?;
        tracing::info!(
            node_id = %id,
            in_flight = state.in_flight_append_count(),
            "removed follower from replication table"
        );
        Ok(state)
    }

    /// Brings the table in line with a new cluster configuration.
    ///
    /// Adds missing members, removes departed ones and records role changes.
    /// The leader's own entry in `members` is skipped.
    pub fn apply_configuration(&self, members: &[RaftMember], log: &dyn RaftLog) -> Result<()> {
        let departed: Vec<NodeId> = self
            .member_ids()
            .into_iter()
            .filter(|id| !members.iter().any(|m| m.id == *id))
            .collect();
        for id in departed {
            self.remove_member(id)?;
        }

        for member in members.iter().filter(|m| m.id != self.local_id) {
            match self.get(member.id) {
                Some(state) => state.set_role(member.role),
                None => {
                    self.add_member(member.clone(), log)?;
                }
            }
        }
        Ok(())
    }

    /// State for one follower
    pub fn get(&self, id: NodeId) -> Option<Arc<FollowerReplicationState>> {
        self.followers.get(&id).map(|s| Arc::clone(s.value()))
    }

    /// Follower ids in ascending order
    pub fn member_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.followers.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Every follower's state, ordered by id
    pub fn followers(&self) -> Vec<Arc<FollowerReplicationState>> {
        let mut states: Vec<_> = self
            .followers
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        states.sort_by_key(|s| s.id());
        states
    }

    /// Resets every follower at the start of a leadership term.
    pub fn reset_all(&self, log: &dyn RaftLog) {
        for state in self.followers() {
            state.reset_state(log);
        }
        tracing::debug!(
            followers = self.followers.len(),
            last_index = %log.last_index(),
            "reset replication table for new term"
        );
    }

    /// Drops every follower, as on loss of leadership.
    pub fn clear(&self) {
        self.followers.clear();
    }

    /// Number of followers
    pub fn len(&self) -> usize {
        self.followers.len()
    }

    /// Returns true if the table holds no follower
    pub fn is_empty(&self) -> bool {
        self.followers.is_empty()
    }

    /// Highest index stored on a majority of voting members.
    ///
    /// The leader counts as a voter holding `leader_last_index`.
    pub fn quorum_match_index(&self, leader_last_index: LogIndex) -> LogIndex {
        let mut indexes: Vec<LogIndex> = self
            .followers
            .iter()
            .filter(|e| e.value().role().is_voting())
            .map(|e| e.value().match_index())
            .collect();
        indexes.push(leader_last_index);
        indexes.sort_unstable_by(|a, b| b.cmp(a));
        let quorum = indexes.len() / 2 + 1;
        indexes[quorum - 1]
    }

    /// Classifies every follower's reachability from its failure streak.
    pub fn health_report(&self) -> ReplicationHealthReport {
        let now = self.clock.now_millis();
        let members = self
            .followers()
            .iter()
            .map(|s| MemberHealth::from_status(&s.status(), now, &self.config))
            .collect();
        ReplicationHealthReport::new(self.local_id, now, members)
    }
}
