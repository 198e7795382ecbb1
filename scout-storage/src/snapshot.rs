//! Persisted configuration cache snapshots.
//!
//! The cache serializes itself after each rebuild so a restarted process can
//! resume with the same session. Snapshots are opaque strings here; the cache
//! owns the encoding and treats anything it cannot decode as a cache miss.

use async_trait::async_trait;
use scout_core::{ScoutError, ScoutResult, StoreError};
use std::sync::RwLock;

/// Slot holding the most recent serialized cache snapshot.
#[async_trait]
pub trait CacheSnapshotStore: Send + Sync {
    /// Load the stored snapshot, if any.
    async fn load(&self) -> ScoutResult<Option<String>>;

    /// Replace the stored snapshot.
    async fn save(&self, snapshot: &str) -> ScoutResult<()>;

    /// Remove the stored snapshot.
    async fn clear(&self) -> ScoutResult<()>;
}

/// In-memory snapshot slot.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    slot: RwLock<Option<String>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `snapshot` already stored (used to simulate a restart).
    pub fn with_snapshot(snapshot: impl Into<String>) -> Self {
        Self {
            slot: RwLock::new(Some(snapshot.into())),
        }
    }

    /// Current raw contents.
    pub fn raw(&self) -> Option<String> {
        self.slot.read().ok().and_then(|slot| slot.clone())
    }
}

#[async_trait]
impl CacheSnapshotStore for InMemorySnapshotStore {
    async fn load(&self) -> ScoutResult<Option<String>> {
        self.slot
            .read()
            .map(|slot| slot.clone())
            .map_err(|_| ScoutError::Store(StoreError::LockPoisoned))
    }

    async fn save(&self, snapshot: &str) -> ScoutResult<()> {
        let mut slot = self
            .slot
            .write()
            .map_err(|_| ScoutError::Store(StoreError::LockPoisoned))?;
        *slot = Some(snapshot.to_string());
        Ok(())
    }

    async fn clear(&self) -> ScoutResult<()> {
        let mut slot = self
            .slot
            .write()
            .map_err(|_| ScoutError::Store(StoreError::LockPoisoned))?;
        *slot = None;
        Ok(())
    }
}
