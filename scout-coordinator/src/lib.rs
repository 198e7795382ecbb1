//! SCOUT Coordinator - Upgrade Coordination
//!
//! Owns the only mutable coordination state in SCOUT: whether an upgrade is
//! running, how many consumer requests are in flight, and which requests are
//! waiting for an upgrade to commit.

pub mod coordinator;
pub mod phase;

pub use coordinator::{UpgradeCoordinator, UPGRADE_IN_PROGRESS_MESSAGE};
pub use phase::{CoordinatorStats, UpgradePhase};
