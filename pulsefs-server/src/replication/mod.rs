//! ZAB-style atomic broadcast: one leader totally orders writes, followers
//! acknowledge and apply committed commands in zxid order.
//!
//! A single engine task per server owns all protocol state and is the only
//! writer of the tree. HTTP handlers and peer connections talk to it through
//! an mpsc inbox; it answers through one-shot channels resolved when the
//! relevant command commits and applies locally.

pub mod election;
pub mod message;
mod transport;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use pulsefs_core::command::{Command, Zxid};
use pulsefs_core::log::{CommandLog, LogEntry};
use pulsefs_core::tree::{Applied, Tree};
use pulsefs_core::watch::WatchRegistry;
use rand::Rng as _;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use election::{Election, Vote};
use message::PeerMessage;

/// Why a write could not be ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The command was ordered and applied, and the state machine rejected
    /// it; deterministic across the cluster.
    Store(pulsefs_core::StoreError),
    /// No leader was reachable (election in progress, leader lost, or the
    /// forward timed out). The client should retry against any member.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Our `-addr` identity; also the peer-RPC listen address.
    pub id: String,
    /// Bootstrap peer for joining an existing cluster.
    pub join: Option<String>,
    /// Election, liveness, and forwarding timeout.
    pub timeout: Duration,
    /// Scratch directory (named by `-addr`); receives installed snapshots.
    pub data_dir: PathBuf,
}

pub(crate) enum EngineRequest {
    Submit {
        command: Command,
        reply: oneshot::Sender<Result<Applied, SubmitError>>,
    },
    Peer {
        from: String,
        message: PeerMessage,
    },
    PeerConnected {
        addr: String,
    },
    PeerDisconnected {
        addr: String,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cheap handle the HTTP layer uses to talk to the engine task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineHandle {
    /// Order a write through the cluster and wait for its local apply.
    pub async fn submit(&self, command: Command) -> Result<Applied, SubmitError> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(EngineRequest::Submit { command, reply })
            .await
            .is_err()
        {
            return Err(SubmitError::Unavailable);
        }
        match tokio::time::timeout(self.timeout * 4, rx).await {
            Ok(Ok(result)) => result,
            // engine gone or the commit never came back
            _ => Err(SubmitError::Unavailable),
        }
    }

    /// Ask the engine to unregister this member and stop.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(EngineRequest::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// Start the replication engine on `peer_listener`. The returned handle is
/// the only way in; the engine owns every mutation of `tree`.
pub fn spawn(
    config: EngineConfig,
    tree: Arc<RwLock<Tree>>,
    watches: Arc<WatchRegistry>,
    log: Arc<CommandLog>,
    peer_listener: TcpListener,
) -> EngineHandle {
    let (tx, rx) = mpsc::channel(1024);
    let acceptor = transport::spawn_acceptor(peer_listener, tx.clone());

    let handle = EngineHandle {
        tx: tx.clone(),
        timeout: config.timeout,
    };
    let engine = Engine {
        config,
        tree,
        watches,
        log,
        inbox: rx,
        inbox_tx: tx,
        role: Role::Down,
        epoch: 0,
        next_counter: 0,
        last_applied: Zxid::ZERO,
        log_floor: Zxid::ZERO,
        synced: false,
        pending: BTreeMap::new(),
        waiters: HashMap::new(),
        forwards: HashMap::new(),
        next_forward_id: 0,
        links: HashMap::new(),
        connected: HashSet::new(),
        disconnected_since: HashMap::new(),
        last_leader_contact: Instant::now(),
        election_deadline: Instant::now(),
        isolated_since: None,
        acceptor,
    };
    tokio::spawn(engine.run());
    handle
}

enum Role {
    /// Startup placeholder before the first election round.
    Down,
    Electing(Election),
    Leader,
    Follower {
        leader: String,
    },
}

struct Proposal {
    acks: HashSet<String>,
}

struct Engine {
    config: EngineConfig,
    tree: Arc<RwLock<Tree>>,
    watches: Arc<WatchRegistry>,
    log: Arc<CommandLog>,
    inbox: mpsc::Receiver<EngineRequest>,
    inbox_tx: mpsc::Sender<EngineRequest>,

    role: Role,
    /// Epoch of the leadership we currently recognize.
    epoch: u32,
    /// Leader-side counter for the next zxid in this epoch.
    next_counter: u32,
    last_applied: Zxid,
    /// Oldest point our log can serve a tail from; advanced when a snapshot
    /// replaces replay history.
    log_floor: Zxid,
    /// Follower-side: caught up and allowed to acknowledge proposals.
    synced: bool,

    /// Leader-side: proposals awaiting a quorum, ordered by zxid.
    pending: BTreeMap<Zxid, Proposal>,
    /// Local requests waiting for their zxid to apply here.
    waiters: HashMap<Zxid, oneshot::Sender<Result<Applied, SubmitError>>>,
    /// Follower-side: forwarded requests not yet assigned a zxid.
    forwards: HashMap<u64, oneshot::Sender<Result<Applied, SubmitError>>>,
    next_forward_id: u64,

    /// Outgoing links, keyed by peer address.
    links: HashMap<String, mpsc::UnboundedSender<PeerMessage>>,
    connected: HashSet<String>,
    disconnected_since: HashMap<String, Instant>,

    last_leader_contact: Instant,
    election_deadline: Instant,
    /// Leader-side: since when we have been below quorum reachability.
    isolated_since: Option<Instant>,
    /// Peer acceptor task; aborted on shutdown so our address goes dark.
    acceptor: tokio::task::JoinHandle<()>,
}

impl Engine {
    async fn run(mut self) {
        if let Some(join) = self.config.join.clone() {
            self.ensure_link(&join);
        }
        self.start_election();

        let mut tick = tokio::time::interval(self.config.timeout / 4);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                request = self.inbox.recv() => match request {
                    Some(EngineRequest::Shutdown { reply }) => {
                        self.handle_shutdown();
                        self.acceptor.abort();
                        let _ = reply.send(());
                        return;
                    }
                    Some(request) => self.handle_request(request),
                    None => {
                        self.acceptor.abort();
                        return;
                    }
                },
                _ = tick.tick() => self.on_tick(),
            }
        }
    }

    // ---- membership & links -------------------------------------------

    /// Everyone we believe is (or is joining as) a cluster member.
    fn known_members(&self) -> BTreeSet<String> {
        let mut members: BTreeSet<String> = self.tree.read().members().into_iter().collect();
        members.insert(self.config.id.clone());
        if let Some(join) = &self.config.join {
            members.insert(join.clone());
        }
        members
    }

    fn ensure_link(&mut self, addr: &str) {
        if addr == self.config.id || self.links.contains_key(addr) {
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.links.insert(addr.to_string(), tx);
        transport::spawn_outgoing_link(
            addr.to_string(),
            self.config.id.clone(),
            rx,
            self.inbox_tx.clone(),
            self.config.timeout / 4,
        );
    }

    fn refresh_links(&mut self) {
        for member in self.known_members() {
            self.ensure_link(&member);
        }
    }

    fn send_to(&mut self, addr: &str, message: PeerMessage) {
        self.ensure_link(addr);
        if let Some(tx) = self.links.get(addr) {
            let _ = tx.send(message);
        }
    }

    fn broadcast(&self, message: &PeerMessage) {
        for tx in self.links.values() {
            let _ = tx.send(message.clone());
        }
    }

    // ---- request handling ---------------------------------------------

    fn handle_request(&mut self, request: EngineRequest) {
        match request {
            EngineRequest::Submit { command, reply } => self.handle_submit(command, reply),
            EngineRequest::Peer { from, message } => self.handle_peer(from, message),
            EngineRequest::PeerConnected { addr } => {
                self.connected.insert(addr.clone());
                self.disconnected_since.remove(&addr);
            }
            EngineRequest::PeerDisconnected { addr } => {
                self.connected.remove(&addr);
                self.disconnected_since
                    .entry(addr)
                    .or_insert_with(Instant::now);
            }
            EngineRequest::Shutdown { .. } => unreachable!("handled in run"),
        }
    }

    fn handle_submit(
        &mut self,
        command: Command,
        reply: oneshot::Sender<Result<Applied, SubmitError>>,
    ) {
        match &self.role {
            Role::Leader => self.propose(command, Some(reply), None),
            Role::Follower { leader } => {
                let leader = leader.clone();
                let request_id = self.next_forward_id;
                self.next_forward_id += 1;
                self.forwards.insert(request_id, reply);
                self.send_to(&leader, PeerMessage::Forward { request_id, command });
            }
            Role::Electing(_) | Role::Down => {
                let _ = reply.send(Err(SubmitError::Unavailable));
            }
        }
    }

    fn handle_peer(&mut self, from: String, message: PeerMessage) {
        // traffic from a peer is proof of life, whatever our link state says
        self.disconnected_since.remove(&from);
        match message {
            PeerMessage::Hello { .. } => {
                // a dialing peer is reachable in reverse; make sure we can
                // answer on our own link
                self.ensure_link(&from);
            }
            PeerMessage::Vote { vote } => self.handle_vote(&from, vote),
            PeerMessage::Ping { epoch } => self.handle_ping(&from, epoch),
            PeerMessage::Propose { zxid, command } => self.handle_propose(&from, zxid, command),
            PeerMessage::Ack { zxid } => self.handle_ack(&from, zxid),
            PeerMessage::Commit { zxid } => {
                if matches!(self.role, Role::Follower { .. }) {
                    self.apply_up_to(zxid);
                }
            }
            PeerMessage::SyncReq { last_zxid } => self.handle_sync_req(&from, last_zxid),
            PeerMessage::SyncResp { entries, last_zxid } => {
                self.handle_sync_resp(entries, last_zxid)
            }
            PeerMessage::Snapshot { tree, last_zxid } => self.handle_snapshot(tree, last_zxid),
            PeerMessage::Forward { request_id, command } => {
                self.handle_forward(&from, request_id, command)
            }
            PeerMessage::ForwardResult { request_id, zxid } => {
                self.handle_forward_result(request_id, zxid)
            }
        }
    }

    // ---- election ------------------------------------------------------

    fn start_election(&mut self) {
        self.fail_waiters();
        self.synced = false;
        let credentials = Vote {
            epoch: self.epoch,
            zxid: self.log.last_zxid(),
            id: self.config.id.clone(),
        };
        info!(id = %self.config.id, epoch = self.epoch, "entering election");
        self.role = Role::Electing(Election::new(self.config.id.clone(), credentials.clone()));
        let jitter = rand::rng().random_range(0..=self.config.timeout.as_millis() as u64 / 2);
        self.election_deadline =
            Instant::now() + self.config.timeout + Duration::from_millis(jitter);
        self.broadcast(&PeerMessage::Vote { vote: credentials });
        self.evaluate_election();
    }

    fn handle_vote(&mut self, from: &str, vote: Vote) {
        let response = match &mut self.role {
            Role::Electing(election) => {
                let incoming = vote.clone();
                if election.record(from, vote) {
                    VoteResponse::Broadcast(election.current().clone())
                } else if incoming < *election.current() {
                    // tell a lagging voter what we endorse; an equal ballot
                    // needs no answer or two peers would echo forever
                    VoteResponse::Reply(election.current().clone())
                } else {
                    VoteResponse::None
                }
            }
            Role::Leader => VoteResponse::LeaderReply(Vote {
                epoch: self.epoch,
                zxid: self.log.last_zxid(),
                id: self.config.id.clone(),
            }),
            Role::Follower { leader } => VoteResponse::Reply(Vote {
                epoch: self.epoch,
                zxid: self.log.last_zxid(),
                id: leader.clone(),
            }),
            Role::Down => return,
        };
        match response {
            VoteResponse::Broadcast(vote) => {
                self.broadcast(&PeerMessage::Vote { vote });
                self.evaluate_election();
            }
            VoteResponse::Reply(vote) => {
                self.send_to(from, PeerMessage::Vote { vote });
                self.evaluate_election();
            }
            VoteResponse::LeaderReply(vote) => {
                let epoch = self.epoch;
                self.send_to(from, PeerMessage::Vote { vote });
                self.send_to(from, PeerMessage::Ping { epoch });
            }
            VoteResponse::None => self.evaluate_election(),
        }
    }

    fn evaluate_election(&mut self) {
        let cluster_size = self.known_members().len();
        let Role::Electing(election) = &self.role else {
            return;
        };
        if election.has_majority(cluster_size) && election.current().id == self.config.id {
            let new_epoch = election.max_epoch() + 1;
            self.become_leader(new_epoch);
        }
    }

    fn become_leader(&mut self, epoch: u32) {
        info!(id = %self.config.id, epoch, "elected leader");
        self.epoch = epoch;
        self.next_counter = 0;
        self.role = Role::Leader;
        self.synced = true;
        self.isolated_since = None;
        self.pending.clear();
        // uncommitted leftovers from the previous leadership die with it
        self.log.truncate_after(self.last_applied);
        self.broadcast(&PeerMessage::Ping { epoch });
        self.propose(
            Command::RegisterMember {
                addr: self.config.id.clone(),
            },
            None,
            None,
        );
    }

    fn handle_ping(&mut self, from: &str, epoch: u32) {
        let already_following =
            matches!(&self.role, Role::Follower { leader } if leader == from) && self.epoch == epoch;
        if already_following {
            self.last_leader_contact = Instant::now();
            return;
        }
        let accept = epoch > self.epoch
            || (epoch == self.epoch && !matches!(self.role, Role::Leader));
        if !accept {
            return;
        }
        info!(leader = %from, epoch, "following leader");
        self.fail_waiters();
        self.epoch = epoch;
        self.role = Role::Follower {
            leader: from.to_string(),
        };
        self.synced = false;
        self.last_leader_contact = Instant::now();
        self.ensure_link(from);
        let last_zxid = self.last_applied;
        self.send_to(from, PeerMessage::SyncReq { last_zxid });
    }

    // ---- broadcast phase ----------------------------------------------

    fn propose(
        &mut self,
        command: Command,
        reply: Option<oneshot::Sender<Result<Applied, SubmitError>>>,
        forwarded_by: Option<(String, u64)>,
    ) {
        self.next_counter += 1;
        let zxid = Zxid::new(self.epoch, self.next_counter);
        self.log.append(LogEntry {
            zxid,
            command: command.clone(),
        });
        if let Some(reply) = reply {
            self.waiters.insert(zxid, reply);
        }
        if let Some((from, request_id)) = forwarded_by {
            self.send_to(
                &from,
                PeerMessage::ForwardResult {
                    request_id,
                    zxid: Some(zxid),
                },
            );
        }
        let mut acks = HashSet::new();
        acks.insert(self.config.id.clone());
        self.pending.insert(zxid, Proposal { acks });
        self.broadcast(&PeerMessage::Propose { zxid, command });
        self.try_commit();
    }

    fn handle_propose(&mut self, from: &str, zxid: Zxid, command: Command) {
        if !matches!(&self.role, Role::Follower { leader } if leader == from) {
            return;
        }
        if zxid <= self.log.last_zxid() {
            return;
        }
        self.log.append(LogEntry { zxid, command });
        if self.synced {
            self.send_to(from, PeerMessage::Ack { zxid });
        }
    }

    fn handle_ack(&mut self, from: &str, zxid: Zxid) {
        if !matches!(self.role, Role::Leader) {
            return;
        }
        if let Some(proposal) = self.pending.get_mut(&zxid) {
            proposal.acks.insert(from.to_string());
            self.try_commit();
        }
    }

    /// Commit pending proposals in zxid order as soon as the lowest one has
    /// a strict majority; later proposals never jump the queue.
    fn try_commit(&mut self) {
        if !matches!(self.role, Role::Leader) {
            return;
        }
        loop {
            let quorum = self.known_members().len() / 2;
            let Some((&zxid, proposal)) = self.pending.iter().next() else {
                break;
            };
            if proposal.acks.len() <= quorum {
                break;
            }
            self.pending.remove(&zxid);
            self.broadcast(&PeerMessage::Commit { zxid });
            self.apply_up_to(zxid);
        }
    }

    // ---- apply ---------------------------------------------------------

    fn apply_up_to(&mut self, zxid: Zxid) {
        if self.log.last_zxid() < zxid {
            // we missed proposals; fall back to synchronization
            warn!(commit = %zxid, log = %self.log.last_zxid(), "log behind commit, resyncing");
            self.request_sync();
            return;
        }
        for entry in self.log.tail_after(self.last_applied) {
            if entry.zxid > zxid {
                break;
            }
            if !is_successor(self.last_applied, entry.zxid) {
                warn!(have = %self.last_applied, next = %entry.zxid, "gap in log, resyncing");
                self.request_sync();
                return;
            }
            self.apply_entry(&entry);
        }
    }

    fn apply_entry(&mut self, entry: &LogEntry) {
        let result = self.tree.write().apply(&entry.command);
        match &result {
            Ok(applied) => {
                // release watches only after the mutation is in place
                {
                    let tree = self.tree.read();
                    for (path, version) in &applied.touched {
                        if let Some(view) = tree.view(path) {
                            self.watches.fire_updated(path, *version, &view);
                        }
                    }
                }
                for path in &applied.removed {
                    self.watches.fire_deleted(path);
                }
                if let Command::UnregisterMember { addr } = &entry.command {
                    // stop dialing a departed member; a rejoin says hello
                    self.links.remove(addr);
                    self.connected.remove(addr);
                    self.disconnected_since.remove(addr);
                }
                if entry.command.is_membership() {
                    self.refresh_links();
                }
            }
            Err(err) => {
                // deterministic rejection; every member rejects identically
                debug!(zxid = %entry.zxid, %err, "command rejected by state machine");
            }
        }
        self.last_applied = entry.zxid;
        if let Some(waiter) = self.waiters.remove(&entry.zxid) {
            let _ = waiter.send(result.map_err(SubmitError::Store));
        }
    }

    // ---- synchronization ----------------------------------------------

    fn request_sync(&mut self) {
        if let Role::Follower { leader } = &self.role {
            let leader = leader.clone();
            self.synced = false;
            let last_zxid = self.last_applied;
            self.send_to(&leader, PeerMessage::SyncReq { last_zxid });
        }
    }

    fn handle_sync_req(&mut self, from: &str, last_zxid: Zxid) {
        if !matches!(self.role, Role::Leader) {
            return;
        }
        self.ensure_link(from);

        let can_tail = last_zxid == self.log_floor || self.log.contains(last_zxid);
        if can_tail {
            let entries: Vec<LogEntry> = self
                .log
                .tail_after(last_zxid)
                .into_iter()
                .filter(|e| e.zxid <= self.last_applied)
                .collect();
            debug!(peer = %from, entries = entries.len(), "sending log tail");
            let resp = PeerMessage::SyncResp {
                entries,
                last_zxid: self.last_applied,
            };
            self.send_to(from, resp);
        } else {
            info!(peer = %from, their = %last_zxid, "history unavailable, sending snapshot");
            let snapshot = PeerMessage::Snapshot {
                tree: self.tree.read().clone(),
                last_zxid: self.last_applied,
            };
            self.send_to(from, snapshot);
        }

        // in-flight proposals the tail above does not cover
        for entry in self.log.tail_after(self.last_applied) {
            self.send_to(
                from,
                PeerMessage::Propose {
                    zxid: entry.zxid,
                    command: entry.command,
                },
            );
        }

        if !self.tree.read().members().iter().any(|m| m == from) {
            self.propose(
                Command::RegisterMember {
                    addr: from.to_string(),
                },
                None,
                None,
            );
        }
    }

    fn handle_sync_resp(&mut self, entries: Vec<LogEntry>, last_zxid: Zxid) {
        if !matches!(self.role, Role::Follower { .. }) {
            return;
        }
        // anything we logged past the applied point was never committed
        self.log.truncate_after(self.last_applied);
        for entry in entries {
            if !is_successor(self.last_applied, entry.zxid) {
                warn!(have = %self.last_applied, next = %entry.zxid, "unusable sync tail");
                self.request_sync();
                return;
            }
            self.log.append(entry.clone());
            self.apply_entry(&entry);
        }
        if self.last_applied >= last_zxid {
            self.synced = true;
            info!(upto = %self.last_applied, "synchronized with leader");
        } else {
            self.request_sync();
        }
    }

    fn handle_snapshot(&mut self, tree: Tree, last_zxid: Zxid) {
        if !matches!(self.role, Role::Follower { .. }) {
            return;
        }
        info!(upto = %last_zxid, "installing snapshot");
        self.persist_snapshot(&tree);
        *self.tree.write() = tree;
        self.log.reset(Vec::new());
        self.log_floor = last_zxid;
        self.last_applied = last_zxid;
        self.synced = true;
        self.refresh_links();
    }

    fn persist_snapshot(&self, tree: &Tree) {
        let path = self.config.data_dir.join("snapshot.json");
        match serde_json::to_vec(tree) {
            Ok(bytes) => {
                if let Err(err) = std::fs::write(&path, bytes) {
                    warn!(path = %path.display(), %err, "failed to persist snapshot");
                }
            }
            Err(err) => error!(%err, "snapshot serialization failed"),
        }
    }

    // ---- forwarding ----------------------------------------------------

    fn handle_forward(&mut self, from: &str, request_id: u64, command: Command) {
        if matches!(self.role, Role::Leader) {
            self.propose(command, None, Some((from.to_string(), request_id)));
        } else {
            // we are not in a position to order this; the origin reports 503
            self.send_to(from, PeerMessage::ForwardResult { request_id, zxid: None });
        }
    }

    fn handle_forward_result(&mut self, request_id: u64, zxid: Option<Zxid>) {
        let Some(reply) = self.forwards.remove(&request_id) else {
            return;
        };
        match zxid {
            Some(zxid) if zxid > self.last_applied => {
                self.waiters.insert(zxid, reply);
            }
            _ => {
                let _ = reply.send(Err(SubmitError::Unavailable));
            }
        }
    }

    // ---- timers --------------------------------------------------------

    fn on_tick(&mut self) {
        match &self.role {
            Role::Leader => {
                let epoch = self.epoch;
                self.broadcast(&PeerMessage::Ping { epoch });
                self.unregister_dead_members();
                self.check_quorum_reachability();
            }
            Role::Follower { .. } => {
                if self.last_leader_contact.elapsed() > self.config.timeout {
                    warn!("leader silent past the election timeout");
                    self.start_election();
                } else if !self.synced {
                    self.request_sync();
                }
            }
            Role::Electing(_) => {
                if Instant::now() >= self.election_deadline {
                    self.start_election();
                }
            }
            Role::Down => {}
        }
    }

    /// Members whose links have been down past the liveness timeout get
    /// unregistered; a reconnect re-registers them through synchronization.
    fn unregister_dead_members(&mut self) {
        let members = self.tree.read().members();
        let overdue: Vec<String> = self
            .disconnected_since
            .iter()
            .filter(|(addr, since)| {
                members.iter().any(|m| m == *addr)
                    && !self.connected.contains(*addr)
                    && since.elapsed() > self.config.timeout
            })
            .map(|(addr, _)| addr.clone())
            .collect();
        for addr in overdue {
            info!(member = %addr, "unregistering unreachable member");
            self.disconnected_since.remove(&addr);
            self.propose(Command::UnregisterMember { addr }, None, None);
        }
    }

    fn check_quorum_reachability(&mut self) {
        let members = self.known_members();
        let reachable = 1 + members
            .iter()
            .filter(|m| **m != self.config.id && self.connected.contains(*m))
            .count();
        if reachable * 2 > members.len() {
            self.isolated_since = None;
            return;
        }
        let since = *self.isolated_since.get_or_insert_with(Instant::now);
        if since.elapsed() > self.config.timeout {
            warn!("lost quorum reachability, stepping down");
            self.start_election();
        }
    }

    // ---- shutdown ------------------------------------------------------

    fn handle_shutdown(&mut self) {
        let unregister = Command::UnregisterMember {
            addr: self.config.id.clone(),
        };
        match &self.role {
            Role::Leader => {
                // single-member clusters commit this immediately; otherwise
                // it is best effort and liveness tracking finishes the job
                self.propose(unregister, None, None);
            }
            Role::Follower { leader } => {
                let leader = leader.clone();
                let request_id = self.next_forward_id;
                self.next_forward_id += 1;
                self.send_to(
                    &leader,
                    PeerMessage::Forward {
                        request_id,
                        command: unregister,
                    },
                );
            }
            Role::Electing(_) | Role::Down => {}
        }
        self.fail_waiters();
    }

    fn fail_waiters(&mut self) {
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(Err(SubmitError::Unavailable));
        }
        for (_, waiter) in self.forwards.drain() {
            let _ = waiter.send(Err(SubmitError::Unavailable));
        }
        self.pending.clear();
    }
}

enum VoteResponse {
    Broadcast(Vote),
    Reply(Vote),
    LeaderReply(Vote),
    None,
}

/// Whether `next` is the zxid immediately after `prev`: the next counter of
/// the same epoch, or the first counter of a newer epoch.
fn is_successor(prev: Zxid, next: Zxid) -> bool {
    (next.epoch() == prev.epoch() && next.counter() == prev.counter().wrapping_add(1))
        || (next.epoch() > prev.epoch() && next.counter() == 1)
}
