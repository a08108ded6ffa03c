use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a unique identifier for a cluster member
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Creates a new NodeId from a raw u64 value
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    /// Returns the raw u64 value of this node ID
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a Raft term number
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Term(u64);

impl Term {
    /// Creates a new Term from a raw u64 value
    pub fn new(t: u64) -> Self {
        Term(t)
    }

    /// Returns the raw u64 value of this term
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a Raft log index. Index 0 never holds an entry.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LogIndex(u64);

impl LogIndex {
    /// A zero log index
    pub const ZERO: LogIndex = LogIndex(0);

    /// Creates a new LogIndex from a raw u64 value
    pub fn new(i: u64) -> Self {
        LogIndex(i)
    }

    /// Returns the raw u64 value of this log index
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the index immediately before this one, saturating at zero
    pub fn prev(self) -> Self {
        LogIndex(self.0.saturating_sub(1))
    }

    /// Returns the index immediately after this one
    pub fn next(self) -> Self {
        LogIndex(self.0.saturating_add(1))
    }
}

impl TryFrom<i64> for LogIndex {
    type Error = ReplicationError;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        u64::try_from(value)
            .map(LogIndex)
            .map_err(|_| ReplicationError::InvalidArgument {
                msg: format!("log index must not be negative, got {}", value),
            })
    }
}

impl fmt::Display for LogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds on the leader's monotonic clock.
pub type Millis = u64;

/// Which part of the log a reader is allowed to see.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReaderMode {
    /// Every written entry, including ones not yet committed
    All,
    /// Only entries at or below the commit index
    CommittedOnly,
}

/// Voting role of a cluster member
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberRole {
    /// Full voting member, counted toward quorum
    Voting,
    /// Catching up before being promoted to a voting member
    Promotable,
    /// Learner that never votes and only applies committed entries
    NonVoting,
}

impl MemberRole {
    /// Returns the log view a member with this role is replicated from.
    ///
    /// Voting and promotable members must see uncommitted entries so they can
    /// take part in commitment. Non-voting members are not counted toward
    /// quorum and only ever receive entries that can no longer be rolled back.
    pub fn reader_mode(self) -> ReaderMode {
        match self {
            MemberRole::Voting | MemberRole::Promotable => ReaderMode::All,
            MemberRole::NonVoting => ReaderMode::CommittedOnly,
        }
    }

    /// Returns true if the member counts toward quorum
    pub fn is_voting(self) -> bool {
        matches!(self, MemberRole::Voting)
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemberRole::Voting => "voting",
            MemberRole::Promotable => "promotable",
            MemberRole::NonVoting => "non-voting",
        };
        f.write_str(name)
    }
}

/// Descriptor of a cluster member as seen by the leader
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftMember {
    /// Member identity
    pub id: NodeId,
    /// Current voting role
    pub role: MemberRole,
}

impl RaftMember {
    /// Creates a new member descriptor
    pub fn new(id: NodeId, role: MemberRole) -> Self {
        Self { id, role }
    }

    /// Creates a voting member descriptor
    pub fn voting(id: u64) -> Self {
        Self::new(NodeId::new(id), MemberRole::Voting)
    }
}

/// Payload carried by a replicated log entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryPayload {
    /// Blank entry appended by a new leader at the start of its term
    Initial,
    /// Opaque application data
    Application(Bytes),
    /// New cluster configuration
    Configuration(Vec<RaftMember>),
}

/// An entry of the replicated log together with its position
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedEntry {
    /// Position of the entry in the log
    pub index: LogIndex,
    /// Term in which the entry was written
    pub term: Term,
    /// Entry payload
    pub payload: EntryPayload,
}

impl IndexedEntry {
    /// Creates a new indexed entry
    pub fn new(index: LogIndex, term: Term, payload: EntryPayload) -> Self {
        Self {
            index,
            term,
            payload,
        }
    }
}

/// Error types for the leader-side replication state
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// A caller passed a value that violates a precondition.
    #[error("invalid argument: {msg}")]
    InvalidArgument {
        /// Description of the violated precondition
        msg: String,
    },

    /// The replication cursor has no entry left to hand out.
    #[error("replication cursor exhausted after index {last}")]
    CursorExhausted {
        /// Index of the last entry the cursor returned (0 if none)
        last: LogIndex,
    },

    /// The member is not part of the replication table.
    #[error("unknown member {0}")]
    UnknownMember(NodeId),

    /// The member is already part of the replication table.
    #[error("member {0} already exists")]
    MemberExists(NodeId),

    /// The replication configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ReplicationError>;
