use super::{NodeId, NodeRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    BecameFollower,
    BecameCandidate,
    BecameLeader,
    VoteGranted,
    VoteDenied,
    VoteReceived,
    HeartbeatSent,
    HeartbeatSkipped,
    HeartbeatReceived,
    TransportError,
}

impl EventKind {
    pub fn is_transition(self) -> bool {
        matches!(
            self,
            EventKind::BecameFollower | EventKind::BecameCandidate | EventKind::BecameLeader
        )
    }
}

/// Something that happened on a node, stamped with the node's state at the
/// time it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub node_id: NodeId,
    pub term: u64,
    pub role: NodeRole,
    pub kind: EventKind,
    pub message: String,
}
