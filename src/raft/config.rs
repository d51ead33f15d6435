use std::time::Duration;

use super::{NodeId, RaftError};

#[derive(Debug, Clone)]
pub struct RaftConfig {
    pub node_id: NodeId,
    pub cluster: Vec<NodeId>,           // every member, self included
    pub election_timeout_min: u64,      // in milliseconds
    pub election_timeout_max: u64,      // in milliseconds
    pub heartbeat_interval: u64,        // in milliseconds
    pub tick_interval: u64,             // in milliseconds
    pub receive_timeout: u64,           // in milliseconds
    /// Fraction of leader heartbeat opportunities that are skipped on purpose.
    pub heartbeat_drop_probability: f64,
    /// Seed for the election timeout generator; `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl RaftConfig {
    pub fn new(node_id: NodeId, cluster: &[NodeId]) -> Self {
        Self {
            node_id,
            cluster: cluster.to_vec(),
            election_timeout_min: 2500,
            election_timeout_max: 4000,
            heartbeat_interval: 1000,
            tick_interval: 100,
            receive_timeout: 200,
            heartbeat_drop_probability: 0.0,
            rng_seed: None,
        }
    }

    pub fn with_election_timeout(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.election_timeout_min = min_ms;
        self.election_timeout_max = max_ms;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval = interval_ms;
        self
    }

    pub fn with_loop_timing(mut self, tick_ms: u64, receive_timeout_ms: u64) -> Self {
        self.tick_interval = tick_ms;
        self.receive_timeout = receive_timeout_ms;
        self
    }

    pub fn with_heartbeat_drop_probability(mut self, probability: f64) -> Self {
        self.heartbeat_drop_probability = probability;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout)
    }

    /// Ids of every member other than this node.
    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.cluster
            .iter()
            .copied()
            .filter(move |id| *id != self.node_id)
    }

    /// Smallest vote count that is strictly more than half of the cluster.
    pub fn quorum(&self) -> usize {
        self.cluster.len() / 2 + 1
    }

    pub fn validate(&self) -> Result<(), RaftError> {
        if !self.cluster.contains(&self.node_id) {
            return Err(RaftError::NotMember(self.node_id));
        }
        let mut sorted = self.cluster.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != self.cluster.len() {
            return Err(RaftError::InvalidConfig(
                "cluster contains duplicate member ids".to_string(),
            ));
        }
        if self.election_timeout_min > self.election_timeout_max {
            return Err(RaftError::InvalidConfig(format!(
                "election timeout min ({}) exceeds max ({})",
                self.election_timeout_min, self.election_timeout_max
            )));
        }
        if self.heartbeat_interval == 0 || self.tick_interval == 0 || self.receive_timeout == 0 {
            return Err(RaftError::InvalidConfig(
                "heartbeat, tick and receive intervals must be non-zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.heartbeat_drop_probability) {
            return Err(RaftError::InvalidConfig(format!(
                "heartbeat drop probability {} is outside [0, 1]",
                self.heartbeat_drop_probability
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_timing() {
        let cfg = RaftConfig::new(1, &[0, 1, 2]);
        assert_eq!(cfg.election_timeout_min, 2500);
        assert_eq!(cfg.election_timeout_max, 4000);
        assert_eq!(cfg.heartbeat_interval, 1000);
        assert_eq!(cfg.tick_interval, 100);
        assert_eq!(cfg.heartbeat_drop_probability, 0.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn peers_exclude_self() {
        let cfg = RaftConfig::new(1, &[0, 1, 2]);
        assert_eq!(cfg.peers().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn quorum_is_strict_majority() {
        assert_eq!(RaftConfig::new(0, &[0]).quorum(), 1);
        assert_eq!(RaftConfig::new(0, &[0, 1]).quorum(), 2);
        assert_eq!(RaftConfig::new(0, &[0, 1, 2]).quorum(), 2);
        assert_eq!(RaftConfig::new(0, &[0, 1, 2, 3]).quorum(), 3);
        assert_eq!(RaftConfig::new(0, &[0, 1, 2, 3, 4]).quorum(), 3);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(matches!(
            RaftConfig::new(9, &[0, 1]).validate(),
            Err(RaftError::NotMember(9))
        ));
        assert!(RaftConfig::new(0, &[0, 1, 1]).validate().is_err());
        assert!(RaftConfig::new(0, &[0, 1])
            .with_election_timeout(500, 100)
            .validate()
            .is_err());
        assert!(RaftConfig::new(0, &[0, 1])
            .with_heartbeat_interval(0)
            .validate()
            .is_err());
        assert!(RaftConfig::new(0, &[0, 1])
            .with_loop_timing(0, 200)
            .validate()
            .is_err());
        assert!(RaftConfig::new(0, &[0, 1])
            .with_heartbeat_drop_probability(1.5)
            .validate()
            .is_err());
    }
}
