//! SCOUT Research - Configuration Cache and Researcher
//!
//! The researcher owns the in-memory copy of the active model configuration,
//! keeps it consistent with the configuration store through read-repair, and
//! applies upgrades with rollback. Research calls are delegated to a
//! [`scout_llm::ResearchProvider`].

pub mod cache;
pub mod researcher;

pub use cache::{estimate_prompt_tokens, CacheStats, ConfigCache, SnapshotRejected};
pub use researcher::Researcher;
