//! Upgrade lifecycle phase and coordinator statistics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the coordinator is in an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpgradePhase {
    /// No upgrade running; requests are served immediately.
    #[default]
    Idle,
    /// Waiting for in-flight requests to finish.
    Draining,
    /// Writing the new configuration and rebuilding the cache.
    Swapping,
    /// Serving requests queued during the upgrade.
    DrainingQueue,
}

impl UpgradePhase {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            UpgradePhase::Idle => "Idle",
            UpgradePhase::Draining => "Draining",
            UpgradePhase::Swapping => "Swapping",
            UpgradePhase::DrainingQueue => "DrainingQueue",
        }
    }
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub active_requests: usize,
    pub queued_requests: usize,
    pub upgrade_in_progress: bool,
    pub phase: UpgradePhase,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub upgrades_succeeded: u64,
    pub upgrades_failed: u64,
    /// Upgrades refused because another one was running.
    pub upgrades_rejected: u64,
    /// Request records currently held for `request_status`.
    pub retained_records: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_default_is_idle() {
        assert_eq!(UpgradePhase::default(), UpgradePhase::Idle);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(UpgradePhase::DrainingQueue.to_string(), "DrainingQueue");
    }

    #[test]
    fn test_phase_serializes_screaming_snake() {
        let json = serde_json::to_string(&UpgradePhase::DrainingQueue).unwrap();
        assert_eq!(json, "\"DRAINING_QUEUE\"");
    }
}
