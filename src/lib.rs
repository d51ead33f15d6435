// Election core
pub mod raft;

// Transport, bootstrap and presentation
pub mod cluster;
pub mod config;
pub mod network;
pub mod report;

// Public exports
pub use cluster::Cluster;
pub use config::ClusterConfig;
pub use raft::{Message, NodeId, NodeRole, NodeState, Raft, RaftConfig, RaftNode};
