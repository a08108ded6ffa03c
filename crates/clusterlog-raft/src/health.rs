//! Follower reachability derived from failure streaks.

use serde::{Deserialize, Serialize};

use crate::config::ReplicationConfig;
use crate::member::FollowerStatus;
use crate::types::{LogIndex, MemberRole, Millis, NodeId};

/// Reachability of a follower as judged by the leader
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FollowerHealth {
    /// Last request succeeded
    Reachable,
    /// Failing, but not yet long or often enough to give up on it
    Degraded,
    /// Failure streak reached the configured threshold or age
    Unreachable,
}

impl FollowerHealth {
    /// Classifies a failure streak.
    pub fn classify(
        failure_count: u32,
        first_failure_at: Option<Millis>,
        now_ms: Millis,
        config: &ReplicationConfig,
    ) -> Self {
        if failure_count == 0 {
            return FollowerHealth::Reachable;
        }
        let failing_for = first_failure_at
            .map(|t| now_ms.saturating_sub(t))
            .unwrap_or(0);
        if failure_count >= config.failure_threshold || failing_for >= config.suspect_after_ms {
            FollowerHealth::Unreachable
        } else {
            FollowerHealth::Degraded
        }
    }

    /// Returns true if Reachable or Degraded
    pub fn is_ok(&self) -> bool {
        matches!(self, FollowerHealth::Reachable | FollowerHealth::Degraded)
    }
}

/// Health information for a single follower
#[derive(Clone, Debug, Serialize)]
pub struct MemberHealth {
    /// Follower identity
    pub id: NodeId,
    /// Voting role
    pub role: MemberRole,
    /// Classified reachability
    pub health: FollowerHealth,
    /// Consecutive failures
    pub failure_count: u32,
    /// How long the current failure streak has lasted (ms)
    pub failing_for_ms: u64,
    /// Highest index confirmed stored by the follower
    pub match_index: LogIndex,
}

impl MemberHealth {
    /// Builds the health entry for one follower.
    pub fn from_status(status: &FollowerStatus, now_ms: Millis, config: &ReplicationConfig) -> Self {
        Self {
            id: status.id,
            role: status.role,
            health: FollowerHealth::classify(
                status.failure_count,
                status.first_failure_at,
                now_ms,
                config,
            ),
            failure_count: status.failure_count,
            failing_for_ms: status
                .first_failure_at
                .map(|t| now_ms.saturating_sub(t))
                .unwrap_or(0),
            match_index: status.match_index,
        }
    }
}

/// Replication health across every follower of a leader
#[derive(Clone, Debug, Serialize)]
pub struct ReplicationHealthReport {
    /// Leader producing the report
    pub leader_id: NodeId,
    /// Report generation time
    pub checked_at_ms: Millis,
    /// Worst health of any follower
    pub overall: FollowerHealth,
    /// Per-follower details, ordered by id
    pub members: Vec<MemberHealth>,
}

impl ReplicationHealthReport {
    /// Builds a report; overall health is the worst follower health.
    pub fn new(leader_id: NodeId, checked_at_ms: Millis, mut members: Vec<MemberHealth>) -> Self {
        members.sort_by_key(|m| m.id);
        let overall = members
            .iter()
            .map(|m| m.health)
            .max()
            .unwrap_or(FollowerHealth::Reachable);
        Self {
            leader_id,
            checked_at_ms,
            overall,
            members,
        }
    }

    /// Returns true if every follower is reachable
    pub fn is_healthy(&self) -> bool {
        self.overall == FollowerHealth::Reachable
    }

    /// Followers judged unreachable
    pub fn unreachable_members(&self) -> Vec<&MemberHealth> {
        self.members
            .iter()
            .filter(|m| m.health == FollowerHealth::Unreachable)
            .collect()
    }

    /// Followers that are failing but not yet unreachable
    pub fn degraded_members(&self) -> Vec<&MemberHealth> {
        self.members
            .iter()
            .filter(|m| m.health == FollowerHealth::Degraded)
            .collect()
    }

    /// Returns true if the leader plus its voting followers that are not
    /// unreachable form a majority of the voting members.
    pub fn quorum_reachable(&self) -> bool {
        let voters: Vec<_> = self.members.iter().filter(|m| m.role.is_voting()).collect();
        let total = voters.len() + 1;
        let reachable = voters.iter().filter(|m| m.health.is_ok()).count() + 1;
        reachable > total / 2
    }
}
