use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::timer::random_election_timeout;
use super::{
    Envelope, EventKind, Message, NodeEvent, NodeId, NodeRole, NodeState, RaftConfig, RaftError,
};

/// Election state machine for a single cluster member.
///
/// The node never touches the network or the clock itself: callers pass the
/// current instant in and get back the messages that should be sent. This
/// keeps every transition deterministic given the same inputs and seed.
pub struct RaftNode {
    // Node identity
    id: NodeId,
    config: RaftConfig,

    // Election state
    role: NodeRole,
    current_term: u64,
    voted_for: Option<NodeId>,
    leader_id: Option<NodeId>,
    // Distinct voters in the current candidacy, self included
    votes: HashSet<NodeId>,

    // Follower/candidate: election timeout. Leader: next heartbeat due.
    election_deadline: Instant,
    rng: StdRng,

    events: Option<mpsc::UnboundedSender<NodeEvent>>,
}

impl RaftNode {
    pub fn new(config: RaftConfig, now: Instant) -> Result<Self, RaftError> {
        config.validate()?;

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut node = Self {
            id: config.node_id,
            config,
            role: NodeRole::Follower,
            current_term: 0,
            voted_for: None,
            leader_id: None,
            votes: HashSet::new(),
            election_deadline: now,
            rng,
            events: None,
        };
        node.reset_election_deadline(now);
        Ok(node)
    }

    pub fn set_event_sender(&mut self, sender: mpsc::UnboundedSender<NodeEvent>) {
        self.events = Some(sender);
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &RaftConfig {
        &self.config
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn current_term(&self) -> u64 {
        self.current_term
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.voted_for
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.leader_id
    }

    pub fn votes_received(&self) -> usize {
        self.votes.len()
    }

    pub fn election_deadline(&self) -> Instant {
        self.election_deadline
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.role, NodeRole::Leader)
    }

    pub fn snapshot(&self) -> NodeState {
        NodeState {
            node_id: self.id,
            current_term: self.current_term,
            voted_for: self.voted_for,
            role: self.role,
            leader_id: self.leader_id,
            votes_received: self.votes.len(),
        }
    }

    /// Timer-driven transitions. Call on every polling interval.
    pub fn tick(&mut self, now: Instant) -> Vec<Envelope> {
        let mut out = Vec::new();
        if now < self.election_deadline {
            return out;
        }

        match self.role {
            NodeRole::Follower | NodeRole::Candidate => {
                // No heartbeat or granted vote arrived in time: (re)start an election.
                self.become_candidate(now, &mut out);
            }
            NodeRole::Leader => {
                if self.rng.random_bool(self.config.heartbeat_drop_probability) {
                    self.emit(
                        EventKind::HeartbeatSkipped,
                        "skipping heartbeat (simulated network loss)".to_string(),
                    );
                } else {
                    self.broadcast_heartbeat(&mut out);
                }
                self.election_deadline = now + self.config.heartbeat_interval();
            }
        }

        out
    }

    pub fn handle_message(&mut self, message: Message, now: Instant) -> Vec<Envelope> {
        let mut out = Vec::new();

        let sender = message.sender();
        if sender == self.id || !self.config.cluster.contains(&sender) {
            debug!(
                "Node {} dropping message from non-peer {}: {}",
                self.id, sender, message
            );
            return out;
        }

        match message {
            Message::RequestVote { term, candidate_id } => {
                self.handle_request_vote(term, candidate_id, now, &mut out)
            }
            Message::Vote {
                term,
                voter_id,
                granted,
            } => self.handle_vote(term, voter_id, granted, now, &mut out),
            Message::Heartbeat { term, leader_id } => self.handle_heartbeat(term, leader_id, now),
        }

        out
    }

    /// Records a send/receive failure of the owning service as an event.
    pub fn record_transport_error(&mut self, detail: &str) {
        self.emit(EventKind::TransportError, detail.to_string());
    }

    fn handle_request_vote(
        &mut self,
        term: u64,
        candidate_id: NodeId,
        now: Instant,
        out: &mut Vec<Envelope>,
    ) {
        if term < self.current_term {
            debug!(
                "Node {} ignoring stale vote request from {} (term {} < {})",
                self.id, candidate_id, term, self.current_term
            );
            return;
        }

        if term > self.current_term {
            self.become_follower(term, now);
        }

        let granted = match self.voted_for {
            None => true,
            Some(existing) => existing == candidate_id,
        };

        if granted {
            self.voted_for = Some(candidate_id);
            // A node that just voted must not start a competing election right away.
            self.reset_election_deadline(now);
            self.emit(
                EventKind::VoteGranted,
                format!("voted for candidate {candidate_id}"),
            );
        } else {
            self.emit(
                EventKind::VoteDenied,
                format!(
                    "denied vote to candidate {} (already voted for {})",
                    candidate_id,
                    self.voted_for.map_or_else(|| "nobody".to_string(), |v| v.to_string())
                ),
            );
        }

        out.push(Envelope::new(
            candidate_id,
            Message::Vote {
                term: self.current_term,
                voter_id: self.id,
                granted,
            },
        ));
    }

    fn handle_vote(
        &mut self,
        term: u64,
        voter_id: NodeId,
        granted: bool,
        now: Instant,
        out: &mut Vec<Envelope>,
    ) {
        if self.role != NodeRole::Candidate || term < self.current_term {
            return;
        }

        if term > self.current_term {
            // Votes are only valid for the term they were cast in.
            self.become_follower(term, now);
            return;
        }

        if !granted {
            debug!(
                "Node {} vote from {} was denied for term {}",
                self.id, voter_id, term
            );
            return;
        }

        if !self.votes.insert(voter_id) {
            debug!(
                "Node {} ignoring duplicate vote from {} for term {}",
                self.id, voter_id, term
            );
            return;
        }

        self.emit(
            EventKind::VoteReceived,
            format!(
                "received vote from {} (total: {})",
                voter_id,
                self.votes.len()
            ),
        );

        if self.votes.len() >= self.config.quorum() {
            self.become_leader(now, out);
        }
    }

    fn handle_heartbeat(&mut self, term: u64, leader_id: NodeId, now: Instant) {
        if term < self.current_term {
            debug!(
                "Node {} ignoring stale heartbeat from {} (term {} < {})",
                self.id, leader_id, term, self.current_term
            );
            return;
        }

        if term > self.current_term {
            self.become_follower(term, now);
        }

        if self.role != NodeRole::Follower {
            // Leaders and candidates step down even on a same-term heartbeat.
            self.become_follower(term, now);
            self.leader_id = Some(leader_id);
        } else {
            self.leader_id = Some(leader_id);
            self.reset_election_deadline(now);
            self.emit(
                EventKind::HeartbeatReceived,
                format!("heartbeat received from leader {leader_id}"),
            );
        }
    }

    fn become_candidate(&mut self, now: Instant, out: &mut Vec<Envelope>) {
        let Some(next_term) = self.current_term.checked_add(1) else {
            warn!(
                "Node {} cannot start an election: term {} is exhausted",
                self.id, self.current_term
            );
            self.reset_election_deadline(now);
            return;
        };

        self.role = NodeRole::Candidate;
        self.current_term = next_term;
        self.voted_for = Some(self.id);
        self.leader_id = None;
        self.votes.clear();
        self.votes.insert(self.id);
        self.reset_election_deadline(now);

        self.emit(
            EventKind::BecameCandidate,
            "becoming candidate and starting an election".to_string(),
        );

        let request = Message::RequestVote {
            term: self.current_term,
            candidate_id: self.id,
        };
        self.broadcast(request, out);

        // A single-member cluster wins on its own vote.
        if self.votes.len() >= self.config.quorum() {
            self.become_leader(now, out);
        }
    }

    fn become_leader(&mut self, now: Instant, out: &mut Vec<Envelope>) {
        if self.role != NodeRole::Candidate {
            return;
        }

        self.role = NodeRole::Leader;
        self.leader_id = Some(self.id);
        self.emit(EventKind::BecameLeader, "became leader!".to_string());

        self.broadcast_heartbeat(out);
        self.election_deadline = now + self.config.heartbeat_interval();
    }

    fn become_follower(&mut self, term: u64, now: Instant) {
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
        }
        self.role = NodeRole::Follower;
        self.leader_id = None;
        self.votes.clear();
        self.reset_election_deadline(now);

        self.emit(EventKind::BecameFollower, "becoming follower".to_string());
    }

    fn broadcast_heartbeat(&mut self, out: &mut Vec<Envelope>) {
        let heartbeat = Message::Heartbeat {
            term: self.current_term,
            leader_id: self.id,
        };
        self.broadcast(heartbeat, out);
        self.emit(EventKind::HeartbeatSent, "sending heartbeat".to_string());
    }

    fn broadcast(&self, message: Message, out: &mut Vec<Envelope>) {
        out.extend(self.config.peers().map(|peer| Envelope::new(peer, message)));
    }

    fn reset_election_deadline(&mut self, now: Instant) {
        let timeout = random_election_timeout(
            &mut self.rng,
            self.config.election_timeout_min,
            self.config.election_timeout_max,
        );
        self.election_deadline = now + timeout;
    }

    fn emit(&self, kind: EventKind, message: String) {
        let line = format!(
            "[Node {} | Term {} | {}] {}",
            self.id, self.current_term, self.role, message
        );
        match kind {
            EventKind::HeartbeatSent
            | EventKind::HeartbeatSkipped
            | EventKind::HeartbeatReceived => debug!("{line}"),
            EventKind::TransportError => warn!("{line}"),
            _ => info!("{line}"),
        }

        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching any more.
            let _ = tx.send(NodeEvent {
                node_id: self.id,
                term: self.current_term,
                role: self.role,
                kind,
                message,
            });
        }
    }
}
