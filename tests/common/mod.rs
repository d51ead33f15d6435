#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use ballot::raft::Envelope;
use ballot::{NodeId, NodeRole, RaftConfig, RaftNode};
use tokio::time::Instant;

/// Drives a set of state machines by hand: nothing is sent until the test
/// delivers it, and time only moves when a node is made to time out.
pub struct Harness {
    pub nodes: Vec<RaftNode>,
    pub in_flight: VecDeque<Envelope>,
    pub now: Instant,
    // term -> leader seen in that term
    leaders: HashMap<u64, NodeId>,
    // (node, term) -> vote cast in that term
    votes: HashMap<(NodeId, u64), NodeId>,
    terms: Vec<u64>,
}

impl Harness {
    /// Members are `0..size`; each node's timeout generator is seeded with `seed + id`.
    pub fn new(size: u64, seed: u64) -> Self {
        let cluster: Vec<NodeId> = (0..size).collect();
        let now = Instant::now();
        let nodes = cluster
            .iter()
            .map(|id| {
                let cfg = RaftConfig::new(*id, &cluster).with_rng_seed(seed + id);
                RaftNode::new(cfg, now).expect("valid config")
            })
            .collect();
        Self {
            nodes,
            in_flight: VecDeque::new(),
            now,
            leaders: HashMap::new(),
            votes: HashMap::new(),
            terms: vec![0; size as usize],
        }
    }

    pub fn node(&self, id: NodeId) -> &RaftNode {
        &self.nodes[id as usize]
    }

    /// Moves the clock to `id`'s deadline (if it is in the future) and ticks it.
    pub fn expire(&mut self, id: NodeId) {
        let deadline = self.nodes[id as usize].election_deadline();
        if deadline > self.now {
            self.now = deadline;
        }
        let out = self.nodes[id as usize].tick(self.now);
        self.in_flight.extend(out);
        self.check();
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    pub fn tick_all(&mut self) {
        for i in 0..self.nodes.len() {
            let out = self.nodes[i].tick(self.now);
            self.in_flight.extend(out);
        }
        self.check();
    }

    pub fn deliver(&mut self, envelope: Envelope) {
        let out = self.nodes[envelope.to as usize].handle_message(envelope.message, self.now);
        self.in_flight.extend(out);
        self.check();
    }

    /// Delivers queued messages (and their replies) until the queue is empty.
    /// Messages for which `lost` returns true vanish instead.
    pub fn deliver_all_except<F: Fn(&Envelope) -> bool>(&mut self, lost: F) {
        while let Some(envelope) = self.in_flight.pop_front() {
            if lost(&envelope) {
                continue;
            }
            self.deliver(envelope);
        }
    }

    pub fn deliver_all(&mut self) {
        self.deliver_all_except(|_| false);
    }

    pub fn leaders(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_leader())
            .map(RaftNode::id)
            .collect()
    }

    /// Id of the non-leader whose deadline comes first.
    pub fn next_to_expire(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .filter(|n| !n.is_leader())
            .min_by_key(|n| n.election_deadline())
            .map(RaftNode::id)
    }

    /// Panics if any safety property has been broken so far.
    pub fn check(&mut self) {
        for node in &self.nodes {
            let id = node.id();
            let term = node.current_term();

            assert!(
                term >= self.terms[id as usize],
                "node {id} term went backwards: {} -> {term}",
                self.terms[id as usize]
            );
            self.terms[id as usize] = term;

            if let Some(voted) = node.voted_for() {
                let previous = *self.votes.entry((id, term)).or_insert(voted);
                assert_eq!(
                    previous, voted,
                    "node {id} voted for both {previous} and {voted} in term {term}"
                );
            }

            if node.role() == NodeRole::Leader {
                assert_eq!(node.leader_id(), Some(id), "leader must point at itself");
                let previous = *self.leaders.entry(term).or_insert(id);
                assert_eq!(previous, id, "two leaders in term {term}: {previous} and {id}");
            }
        }
    }
}
