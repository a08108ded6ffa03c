#![warn(missing_docs)]

//! Leader-side follower replication state for a Raft replicated log: append
//! pipelining paced by observed latency, configure/install gating, per-follower
//! log cursors and failure tracking.

pub mod clock;
pub mod config;
pub mod cursor;
pub mod health;
pub mod member;
pub mod pacer;
pub mod raft_log;
pub mod snapshot;
pub mod table;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::ReplicationConfig;
pub use cursor::ReplicationCursor;
pub use health::{FollowerHealth, MemberHealth, ReplicationHealthReport};
pub use member::{FollowerReplicationState, FollowerStatus};
pub use pacer::AppendPacer;
pub use raft_log::{LogReader, MemoryRaftLog, RaftLog};
pub use snapshot::{MemorySnapshotReader, SnapshotChunk, SnapshotChunkReader};
pub use table::ClusterReplicationTable;
pub use types::*;
