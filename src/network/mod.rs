use std::future::Future;
use std::time::Duration;

use crate::raft::NodeId;

pub mod error;
pub mod memory;
pub mod udp;

pub use error::NetworkError;
pub use memory::{MemoryNetwork, MemoryTransport};
pub use udp::{PortMap, UdpTransport};

/// Largest datagram the receive side accepts.
pub const MAX_DATAGRAM: usize = 4096;

/// Addressed, unreliable datagram channel owned by one node.
///
/// Sends are fire-and-forget: `Ok(())` means the datagram was handed off, not
/// that it arrived. Nothing about ordering or delivery is promised.
pub trait Transport: Send + Sync + 'static {
    /// Id of the node this endpoint belongs to.
    fn local_id(&self) -> NodeId;

    fn send(&self, to: NodeId, payload: &[u8])
        -> impl Future<Output = Result<(), NetworkError>> + Send;

    /// Waits at most `wait` for one datagram. `Ok(None)` means the wait elapsed.
    fn recv(&self, wait: Duration)
        -> impl Future<Output = Result<Option<Vec<u8>>, NetworkError>> + Send;
}
