use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::{NetworkError, PortMap};
use crate::raft::{NodeId, RaftConfig, RaftError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<RaftError> for ConfigError {
    fn from(err: RaftError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

impl From<NetworkError> for ConfigError {
    fn from(err: NetworkError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

/// Static description of a whole cluster. Every member derives its own
/// [`RaftConfig`] from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub members: Vec<NodeId>,
    pub host: String,
    pub base_port: u16,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub receive_timeout_ms: u64,
    pub heartbeat_drop_probability: f64,
    pub rng_seed: Option<u64>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            members: vec![0, 1, 2],
            host: "127.0.0.1".to_string(),
            base_port: 5000,
            election_timeout_min_ms: 2500,
            election_timeout_max_ms: 4000,
            heartbeat_interval_ms: 1000,
            tick_interval_ms: 100,
            receive_timeout_ms: 200,
            heartbeat_drop_probability: 0.4,
            rng_seed: None,
        }
    }
}

impl ClusterConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: ClusterConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn port_map(&self) -> Result<PortMap, NetworkError> {
        PortMap::new(&self.host, self.base_port)
    }

    /// Per-node configuration. Seeded clusters give each member its own
    /// stream so timeouts still differ.
    pub fn raft_config(&self, node_id: NodeId) -> RaftConfig {
        let mut cfg = RaftConfig::new(node_id, &self.members)
            .with_election_timeout(self.election_timeout_min_ms, self.election_timeout_max_ms)
            .with_heartbeat_interval(self.heartbeat_interval_ms)
            .with_loop_timing(self.tick_interval_ms, self.receive_timeout_ms)
            .with_heartbeat_drop_probability(self.heartbeat_drop_probability);
        if let Some(seed) = self.rng_seed {
            cfg = cfg.with_rng_seed(seed.wrapping_add(node_id));
        }
        cfg
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let first = *self
            .members
            .first()
            .ok_or_else(|| ConfigError::Invalid("cluster has no members".to_string()))?;

        // Member-level rules are shared with RaftConfig.
        self.raft_config(first).validate()?;

        let ports = self.port_map()?;
        for id in &self.members {
            ports.address_of(*id)?;
        }
        Ok(())
    }
}
