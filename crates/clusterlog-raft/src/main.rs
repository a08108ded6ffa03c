#![warn(missing_docs)]

//! clog-sim: a leader replicating an in-memory log to simulated followers.
//!
//! Each follower gets its own driver task that polls the replication state's
//! gates and sends appends, heartbeats, configuration and snapshot chunks
//! over a fake network with random latency and drops. Completions run on
//! separate tasks, like transport callbacks would.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use clap::Parser;
use clusterlog_raft::{
    ClusterReplicationTable, EntryPayload, FollowerReplicationState, LogIndex, MemberRole,
    MemoryRaftLog, MemorySnapshotReader, NodeId, RaftLog, RaftMember, ReplicationConfig,
    ReplicationError, SharedClock, SystemClock, Term,
};
use parking_lot::Mutex;
use rand::Rng;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "clog-sim")]
#[command(about = "Simulate leader-side replication to a set of followers", long_about = None)]
struct Cli {
    /// Replication config file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of voting followers
    #[arg(short, long, default_value = "2")]
    followers: u64,

    /// Also replicate to one non-voting learner
    #[arg(long)]
    learner: bool,

    /// Entries the leader appends
    #[arg(short, long, default_value = "200")]
    entries: u64,

    /// Entries kept in the log behind the commit index before compacting
    #[arg(long, default_value = "64")]
    retain: u64,

    /// Shortest simulated round trip (ms)
    #[arg(long, default_value = "2")]
    min_rtt_ms: u64,

    /// Longest simulated round trip (ms)
    #[arg(long, default_value = "20")]
    max_rtt_ms: u64,

    /// Probability that a request is lost
    #[arg(long, default_value = "0.05")]
    drop_rate: f64,

    /// Give up if followers have not caught up after this many seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

#[derive(Clone, Copy)]
struct Network {
    min_rtt_ms: u64,
    max_rtt_ms: u64,
    drop_rate: f64,
}

impl Network {
    /// Round trip for one request, and whether it gets lost.
    fn sample(&self) -> (u64, bool) {
        let mut rng = rand::thread_rng();
        let rtt = rng.gen_range(self.min_rtt_ms..=self.max_rtt_ms.max(self.min_rtt_ms));
        (rtt, rng.gen_bool(self.drop_rate.clamp(0.0, 1.0)))
    }
}

/// The follower side of the simulation: only remembers how far its log goes.
#[derive(Default)]
struct SimFollower {
    last: Mutex<u64>,
    resync: AtomicBool,
}

impl SimFollower {
    /// Stores `index` if it extends the follower's log and acknowledges it.
    fn append(&self, index: LogIndex, state: &FollowerReplicationState) -> Result<bool> {
        let mut last = self.last.lock();
        if index.as_u64() > *last + 1 {
            return Ok(false);
        }
        *last = (*last).max(index.as_u64());
        state.set_match_index(i64::try_from(*last)?)?;
        Ok(true)
    }

    fn install(&self, index: LogIndex, state: &FollowerReplicationState) -> Result<()> {
        let mut last = self.last.lock();
        *last = (*last).max(index.as_u64());
        state.set_match_index(i64::try_from(*last)?)?;
        Ok(())
    }
}

struct Driver {
    state: Arc<FollowerReplicationState>,
    follower: Arc<SimFollower>,
    log: MemoryRaftLog,
    clock: SharedClock,
    net: Network,
    term: Term,
    config_index: LogIndex,
    heartbeat_interval_ms: u64,
    shutdown: Arc<AtomicBool>,
}

impl Driver {
    async fn run(self) -> Result<()> {
        self.configure().await;
        self.resync().await?;

        while !self.shutdown.load(Ordering::Acquire) {
            if self.state.in_flight_append_count() == 0 {
                let compacted_away = self.state.match_index().next() < self.log.first_index();
                if self.follower.resync.swap(false, Ordering::AcqRel) || compacted_away {
                    let backoff = u64::from(self.state.failure_count().min(10)) * 5;
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    self.resync().await?;
                    continue;
                }
            }

            if self.state.can_append() && self.state.has_next_entry() {
                let entry = match self.state.next_entry() {
                    Ok(entry) => entry,
                    Err(ReplicationError::CursorExhausted { last }) => {
                        // compacted between has_next and advance
                        tracing::debug!(
                            node_id = %self.state.id(),
                            last = %last,
                            "cursor lost its entry"
                        );
                        self.follower.resync.store(true, Ordering::Release);
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                self.state.start_append();
                tokio::spawn(send_append(
                    Arc::clone(&self.state),
                    Arc::clone(&self.follower),
                    Arc::clone(&self.clock),
                    self.net,
                    entry.index,
                ));
                continue;
            }

            let now = self.clock.now_millis();
            if self.state.can_heartbeat()
                && now.saturating_sub(self.state.heartbeat_time()) >= self.heartbeat_interval_ms
            {
                self.state.set_heartbeat_time(now);
                tokio::spawn(send_heartbeat(
                    Arc::clone(&self.state),
                    Arc::clone(&self.clock),
                    self.net,
                ));
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        Ok(())
    }

    async fn configure(&self) {
        while !self.state.can_configure() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        loop {
            self.state.start_configure();
            let (rtt, lost) = self.net.sample();
            tokio::time::sleep(Duration::from_millis(rtt)).await;
            self.state.complete_configure();
            if !lost {
                self.state.reset_failure_count();
                self.state.set_config_index(self.config_index);
                self.state.set_term(self.term);
                self.state.set_response_time(self.clock.now_millis());
                return;
            }
            self.state.increment_failure_count();
        }
    }

    /// Points the cursor after the follower's match index, installing a
    /// snapshot first if the log no longer holds that position.
    async fn resync(&self) -> Result<()> {
        let next = self.state.match_index().next();
        if self.state.seek(next) {
            return Ok(());
        }
        tracing::info!(
            node_id = %self.state.id(),
            next = %next,
            first = %self.log.first_index(),
            "log compacted past follower, installing snapshot"
        );
        self.install_snapshot().await?;
        let next = self.state.match_index().next();
        if !self.state.seek(next) {
            // compacted again while installing
            self.follower.resync.store(true, Ordering::Release);
        }
        Ok(())
    }

    async fn install_snapshot(&self) -> Result<()> {
        // covers the first retained entry so the next seek can anchor on it
        let snapshot_index = self.log.first_index();
        self.state
            .attach_snapshot_reader(Box::new(MemorySnapshotReader::from_bytes(
                snapshot_index,
                self.term,
                Bytes::from(vec![0u8; 16 * 1024]),
                4 * 1024,
            )));
        self.state.set_next_snapshot_index(snapshot_index);
        self.state.set_next_snapshot_chunk(None);

        loop {
            let Some(chunk) = self.state.with_snapshot_reader(|r| r.next_chunk()).flatten() else {
                break;
            };
            self.state.start_install();
            let (rtt, lost) = self.net.sample();
            tokio::time::sleep(Duration::from_millis(rtt)).await;
            self.state.complete_install();
            if lost {
                self.state.increment_failure_count();
                self.state.with_snapshot_reader(|r| r.seek(Some(&chunk.id)));
                continue;
            }
            self.state.reset_failure_count();
            let next_id = self.state.with_snapshot_reader(|r| r.next_id()).flatten();
            self.state.set_next_snapshot_chunk(next_id);
        }

        self.state.detach_snapshot_reader();
        self.state.set_snapshot_index(snapshot_index);
        self.state.set_next_snapshot_chunk(None);
        self.follower.install(snapshot_index, &self.state)?;
        Ok(())
    }
}

async fn send_append(
    state: Arc<FollowerReplicationState>,
    follower: Arc<SimFollower>,
    clock: SharedClock,
    net: Network,
    index: LogIndex,
) {
    let (rtt, lost) = net.sample();
    tokio::time::sleep(Duration::from_millis(rtt)).await;
    if lost {
        state.complete_append(false, None);
        let failures = state.increment_failure_count();
        tracing::debug!(node_id = %state.id(), index = %index, failures, "append lost");
        follower.resync.store(true, Ordering::Release);
        return;
    }

    state.reset_failure_count();
    state.set_response_time(clock.now_millis());
    match follower.append(index, &state) {
        Ok(true) => state.complete_append(true, Some(rtt)),
        Ok(false) => {
            state.complete_append(false, Some(rtt));
            follower.resync.store(true, Ordering::Release);
        }
        Err(e) => {
            tracing::warn!(node_id = %state.id(), error = %e, "append bookkeeping failed");
            state.complete_append(false, Some(rtt));
        }
    }
}

async fn send_heartbeat(state: Arc<FollowerReplicationState>, clock: SharedClock, net: Network) {
    let (rtt, lost) = net.sample();
    tokio::time::sleep(Duration::from_millis(rtt)).await;
    if lost {
        state.increment_failure_count();
    } else {
        state.reset_failure_count();
        state.set_response_time(clock.now_millis());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ReplicationConfig::from_file(path)?,
        None => ReplicationConfig::default(),
    };
    tracing::info!(?config, "clog-sim starting");

    let leader = NodeId::new(1);
    let term = Term::new(1);
    let clock: SharedClock = SystemClock::shared();
    let log = MemoryRaftLog::new();
    let net = Network {
        min_rtt_ms: cli.min_rtt_ms,
        max_rtt_ms: cli.max_rtt_ms,
        drop_rate: cli.drop_rate,
    };

    let mut members = vec![RaftMember::voting(leader.as_u64())];
    members.extend((0..cli.followers).map(|i| RaftMember::voting(i + 2)));
    if cli.learner {
        members.push(RaftMember::new(
            NodeId::new(cli.followers + 2),
            MemberRole::NonVoting,
        ));
    }

    log.append(term, EntryPayload::Initial);
    let config_index = log.append(term, EntryPayload::Configuration(members.clone()));

    let table = Arc::new(ClusterReplicationTable::new(
        leader,
        config.clone(),
        Arc::clone(&clock),
    )?);
    table.apply_configuration(&members, &log)?;
    table.reset_all(&log);

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut drivers = Vec::new();
    for state in table.followers() {
        let driver = Driver {
            state,
            follower: Arc::new(SimFollower::default()),
            log: log.clone(),
            clock: Arc::clone(&clock),
            net,
            term,
            config_index,
            heartbeat_interval_ms: config.heartbeat_interval_ms,
            shutdown: Arc::clone(&shutdown),
        };
        drivers.push(tokio::spawn(driver.run()));
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(cli.timeout_secs);
    let mut appended = 0;
    loop {
        if appended < cli.entries {
            let payload = Bytes::from(appended.to_be_bytes().to_vec());
            log.append(term, EntryPayload::Application(payload));
            appended += 1;
        }

        let commit = log.commit(table.quorum_match_index(log.last_index()));
        if commit.as_u64() > cli.retain {
            log.compact_before(LogIndex::new(commit.as_u64() - cli.retain));
        }

        let caught_up = table
            .followers()
            .iter()
            .all(|s| s.match_index() >= log.last_index());
        if appended == cli.entries && caught_up {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!("timed out before every follower caught up");
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    shutdown.store(true, Ordering::Release);
    for driver in drivers {
        driver.await??;
    }

    for state in table.followers() {
        tracing::info!("{}", state);
    }
    println!("{}", serde_json::to_string_pretty(&table.health_report())?);
    Ok(())
}
