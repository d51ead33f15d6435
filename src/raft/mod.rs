mod config;
mod error;
mod event;
mod message;
mod node;
mod state;
pub mod timer;

pub use self::config::RaftConfig;
pub use self::error::{MessageError, RaftError};
pub use self::event::{EventKind, NodeEvent};
pub use self::message::{Envelope, Message};
pub use self::node::RaftNode;
pub use self::state::{NodeId, NodeRole, NodeState};

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use crate::network::Transport;

fn lock(node: &Mutex<RaftNode>) -> MutexGuard<'_, RaftNode> {
    node.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One running cluster member: the election state machine plus the receive
/// loop and the timer loop that drive it over a transport.
pub struct Raft<T: Transport> {
    pub node: Arc<Mutex<RaftNode>>,
    transport: Arc<T>,
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: Transport> Raft<T> {
    pub fn new(config: RaftConfig, transport: T) -> Result<Self, RaftError> {
        if transport.local_id() != config.node_id {
            return Err(RaftError::InvalidConfig(format!(
                "transport belongs to node {} but config is for node {}",
                transport.local_id(),
                config.node_id
            )));
        }

        let node = RaftNode::new(config, Instant::now())?;
        Ok(Self {
            node: Arc::new(Mutex::new(node)),
            transport: Arc::new(transport),
            alive: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.transport.local_id()
    }

    pub fn set_event_sender(&self, sender: mpsc::UnboundedSender<NodeEvent>) {
        lock(&self.node).set_event_sender(sender);
    }

    pub fn snapshot(&self) -> NodeState {
        lock(&self.node).snapshot()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Spawns the receive loop and the timer loop. Must run inside a tokio
    /// runtime. Calling it on a node that is already running does nothing.
    pub fn start(&mut self) {
        if self.alive.swap(true, Ordering::SeqCst) {
            return;
        }

        let (tick, wait) = {
            let node = lock(&self.node);
            (node.config().tick_interval(), node.config().receive_timeout())
        };
        info!("Starting node {}", self.id());

        self.tasks.push(tokio::spawn(receive_loop(
            Arc::clone(&self.node),
            Arc::clone(&self.transport),
            Arc::clone(&self.alive),
            wait,
        )));
        self.tasks.push(tokio::spawn(timer_loop(
            Arc::clone(&self.node),
            Arc::clone(&self.transport),
            Arc::clone(&self.alive),
            tick,
        )));
    }

    /// Clears the liveness flag and waits for both loops to notice it.
    pub async fn stop(&mut self) -> Result<(), RaftError> {
        self.alive.store(false, Ordering::SeqCst);
        for task in self.tasks.drain(..) {
            task.await?;
        }
        info!("Node {} stopped", self.id());
        Ok(())
    }
}

async fn receive_loop<T: Transport>(
    node: Arc<Mutex<RaftNode>>,
    transport: Arc<T>,
    alive: Arc<AtomicBool>,
    wait: Duration,
) {
    let id = transport.local_id();
    while alive.load(Ordering::SeqCst) {
        let payload = match transport.recv(wait).await {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(e) => {
                lock(&node).record_transport_error(&format!("error receiving: {e}"));
                // Back off so a broken socket does not spin the loop.
                sleep(wait).await;
                continue;
            }
        };

        let message = match Message::decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                debug!("Node {id} dropping undecodable datagram: {e}");
                continue;
            }
        };

        let outbound = lock(&node).handle_message(message, Instant::now());
        dispatch(&node, transport.as_ref(), outbound).await;
    }
    debug!("Node {id} receive loop exited");
}

async fn timer_loop<T: Transport>(
    node: Arc<Mutex<RaftNode>>,
    transport: Arc<T>,
    alive: Arc<AtomicBool>,
    tick: Duration,
) {
    let id = transport.local_id();
    while alive.load(Ordering::SeqCst) {
        let outbound = lock(&node).tick(Instant::now());
        dispatch(&node, transport.as_ref(), outbound).await;
        sleep(tick).await;
    }
    debug!("Node {id} timer loop exited");
}

/// Sends each envelope once. Failures are reported and never retried: the
/// next heartbeat or election round resends naturally.
async fn dispatch<T: Transport>(node: &Mutex<RaftNode>, transport: &T, outbound: Vec<Envelope>) {
    for envelope in outbound {
        let payload = envelope.message.encode();
        if let Err(e) = transport.send(envelope.to, &payload).await {
            lock(node).record_transport_error(&format!("error sending to {}: {e}", envelope.to));
        }
    }
}
