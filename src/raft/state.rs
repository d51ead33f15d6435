use std::fmt;

use serde::{Deserialize, Serialize};

/// Cluster-wide member identifier. Also selects the member's transport address.
pub type NodeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeRole::Follower => "FOLLOWER",
            NodeRole::Candidate => "CANDIDATE",
            NodeRole::Leader => "LEADER",
        };
        f.write_str(name)
    }
}

/// Point-in-time copy of a node's election state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub node_id: NodeId,
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
    pub role: NodeRole,
    pub leader_id: Option<NodeId>,
    pub votes_received: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_display_uses_upper_case_names() {
        assert_eq!(NodeRole::Follower.to_string(), "FOLLOWER");
        assert_eq!(NodeRole::Candidate.to_string(), "CANDIDATE");
        assert_eq!(NodeRole::Leader.to_string(), "LEADER");
    }

    #[test]
    fn node_state_serializes_to_json() {
        let state = NodeState {
            node_id: 2,
            current_term: 7,
            voted_for: Some(1),
            role: NodeRole::Follower,
            leader_id: Some(1),
            votes_received: 0,
        };
        let json = serde_json::to_string(&state).expect("serialize");
        assert!(json.contains("\"role\":\"Follower\""));
        let back: NodeState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, state);
    }
}
