//! Console rendering of node events, kept apart from the state machine so
//! output formatting can change without touching protocol code.

use crate::raft::{EventKind, NodeEvent};

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_FOLLOWER: &str = "\x1b[94m";
const COLOR_CANDIDATE: &str = "\x1b[93m";
const COLOR_LEADER: &str = "\x1b[92m";
const COLOR_EVENT: &str = "\x1b[96m";
const COLOR_ERROR: &str = "\x1b[91m";

fn color_for(kind: EventKind) -> &'static str {
    match kind {
        EventKind::BecameFollower => COLOR_FOLLOWER,
        EventKind::BecameCandidate => COLOR_CANDIDATE,
        EventKind::BecameLeader => COLOR_LEADER,
        EventKind::TransportError => COLOR_ERROR,
        _ => COLOR_EVENT,
    }
}

/// `[Node 1 | Term 3 | LEADER] became leader!`, optionally wrapped in ANSI color.
pub fn render(event: &NodeEvent, colored: bool) -> String {
    let line = format!(
        "[Node {} | Term {} | {}] {}",
        event.node_id, event.term, event.role, event.message
    );
    if colored {
        format!("{}{}{}", color_for(event.kind), line, COLOR_RESET)
    } else {
        line
    }
}
