use std::time::Duration;

use log::info;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

use crate::config::ClusterConfig;
use crate::network::{MemoryNetwork, MemoryTransport, Transport, UdpTransport};
use crate::raft::{NodeEvent, NodeId, NodeRole, NodeState, Raft, RaftError};

/// Every member of a cluster running in this process.
pub struct Cluster<T: Transport> {
    nodes: Vec<Raft<T>>,
}

impl Cluster<UdpTransport> {
    /// Binds one UDP socket per member at `base_port + id`.
    pub async fn bind_udp(config: &ClusterConfig) -> Result<Self, RaftError> {
        let ports = config.port_map()?;
        let mut nodes = Vec::with_capacity(config.members.len());
        for id in &config.members {
            let transport = UdpTransport::bind(*id, ports).await?;
            nodes.push(Raft::new(config.raft_config(*id), transport)?);
        }
        Ok(Self { nodes })
    }
}

impl Cluster<MemoryTransport> {
    pub fn in_memory(config: &ClusterConfig, network: &MemoryNetwork) -> Result<Self, RaftError> {
        let nodes = config
            .members
            .iter()
            .map(|id| Raft::new(config.raft_config(*id), network.endpoint(*id)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { nodes })
    }
}

impl<T: Transport> Cluster<T> {
    pub fn from_nodes(nodes: Vec<Raft<T>>) -> Self {
        Self { nodes }
    }

    /// Routes every member's events into one channel.
    pub fn set_event_sender(&self, sender: mpsc::UnboundedSender<NodeEvent>) {
        for node in &self.nodes {
            node.set_event_sender(sender.clone());
        }
    }

    pub fn start(&mut self) {
        info!("Starting cluster of {} nodes", self.nodes.len());
        for node in &mut self.nodes {
            node.start();
        }
    }

    pub fn nodes(&self) -> &[Raft<T>] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Raft<T>> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn snapshots(&self) -> Vec<NodeState> {
        self.nodes.iter().map(Raft::snapshot).collect()
    }

    /// Members currently in the leader role, among running nodes.
    pub fn leaders(&self) -> Vec<NodeState> {
        self.nodes
            .iter()
            .filter(|n| n.is_alive())
            .map(Raft::snapshot)
            .filter(|s| s.role == NodeRole::Leader)
            .collect()
    }

    /// Polls until exactly one running node is leader and every other running
    /// node follows it in the same term, or the timeout passes.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Option<NodeState> {
        let deadline = Instant::now() + timeout;
        loop {
            let running: Vec<NodeState> = self
                .nodes
                .iter()
                .filter(|n| n.is_alive())
                .map(Raft::snapshot)
                .collect();
            let leaders: Vec<&NodeState> = running
                .iter()
                .filter(|s| s.role == NodeRole::Leader)
                .collect();
            if let [leader] = leaders.as_slice() {
                let settled = running.iter().all(|s| {
                    s.node_id == leader.node_id
                        || (s.current_term == leader.current_term
                            && s.leader_id == Some(leader.node_id))
                });
                if settled {
                    return Some((*leader).clone());
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn stop_node(&mut self, id: NodeId) -> Result<(), RaftError> {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id() == id) {
            node.stop().await?;
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), RaftError> {
        info!("Shutting down cluster");
        for node in &mut self.nodes {
            node.stop().await?;
        }
        Ok(())
    }
}
