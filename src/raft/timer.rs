use rand::Rng;
use std::time::Duration;

/// Generates a random election timeout within the configured range (inclusive).
pub fn random_election_timeout<R: Rng>(rng: &mut R, min_ms: u64, max_ms: u64) -> Duration {
    let timeout_ms = rng.random_range(min_ms..=max_ms);
    Duration::from_millis(timeout_ms)
}
