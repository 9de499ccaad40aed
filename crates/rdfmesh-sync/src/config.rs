//! Agent timing configuration.

use std::time::Duration;

/// Timing knobs for one agent.
///
/// Defaults match the deployed cadence: status gossip every 5s, a local
/// edit every 2s starting after a 4s warm-up, and peers expiring after 10s
/// of silence.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Interval between status announcements.
    pub status_period: Duration,
    /// Interval between local edits.
    pub edit_period: Duration,
    /// Delay before the first local edit, leaving time for discovery.
    pub edit_start_delay: Duration,
    /// Silence after which a known peer is evicted.
    pub peer_ttl: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            status_period: Duration::from_secs(5),
            edit_period: Duration::from_secs(2),
            edit_start_delay: Duration::from_secs(4),
            peer_ttl: Duration::from_secs(10),
        }
    }
}
