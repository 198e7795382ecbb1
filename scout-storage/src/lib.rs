//! SCOUT Storage - Configuration Store Traits and In-Memory Implementation
//!
//! Defines the storage abstraction the researcher reads and writes model
//! configuration rows through, plus the slot the configuration cache persists
//! its snapshot to. Durable backends are supplied by the embedding service.

pub mod snapshot;

pub use snapshot::{CacheSnapshotStore, InMemorySnapshotStore};

use async_trait::async_trait;
use chrono::Utc;
use scout_core::{
    new_entity_id, ConfigFilter, ConfigId, ConfigStoreRow, NewConfigRow, ScoutError, ScoutResult,
    StoreError,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

// ============================================================================
// CONFIG STORE TRAIT
// ============================================================================

/// Durable store of model configuration rows.
///
/// Implementations must guarantee that `updated_at` strictly increases across
/// successful writes; caches compare against it to detect staleness.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the most recently updated row matching `filter`.
    async fn read_latest(&self, filter: &ConfigFilter) -> ScoutResult<Option<ConfigStoreRow>>;

    /// Write a new row and return its id.
    async fn write(&self, row: NewConfigRow) -> ScoutResult<ConfigId>;

    /// Rows matching `filter`, newest first, at most `limit`.
    async fn history(&self, filter: &ConfigFilter, limit: usize) -> ScoutResult<Vec<ConfigStoreRow>>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory configuration store.
///
/// Supports write-failure injection so callers can exercise rollback paths.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    rows: RwLock<Vec<ConfigStoreRow>>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
    reads: AtomicU64,
}

impl InMemoryConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `write` fail (or succeed again with `false`).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of `read_latest` calls.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a fully formed row, as an external writer would.
    ///
    /// Rejects rows whose `updated_at` does not move the store's clock forward.
    pub fn insert_row(&self, row: ConfigStoreRow) -> ScoutResult<ConfigId> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| ScoutError::Store(StoreError::LockPoisoned))?;
        if let Some(latest) = rows.iter().map(|r| r.updated_at).max() {
            if row.updated_at <= latest {
                return Err(ScoutError::Store(StoreError::WriteFailed {
                    provider: row.provider.clone(),
                    model: row.model.clone(),
                    reason: format!(
                        "updated_at {} does not advance past {}",
                        row.updated_at, latest
                    ),
                }));
            }
        }
        let id = row.id;
        rows.push(row);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn read_latest(&self, filter: &ConfigFilter) -> ScoutResult<Option<ConfigStoreRow>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let rows = self
            .rows
            .read()
            .map_err(|_| ScoutError::Store(StoreError::LockPoisoned))?;
        Ok(rows
            .iter()
            .filter(|row| filter.matches(row))
            .max_by_key(|row| row.updated_at)
            .cloned())
    }

    async fn write(&self, row: NewConfigRow) -> ScoutResult<ConfigId> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ScoutError::Store(StoreError::WriteFailed {
                provider: row.provider,
                model: row.model,
                reason: "store rejected the write".to_string(),
            }));
        }
        if row.provider.trim().is_empty() || row.model.trim().is_empty() {
            return Err(ScoutError::Store(StoreError::WriteFailed {
                provider: row.provider,
                model: row.model,
                reason: "provider and model are required".to_string(),
            }));
        }

        let mut rows = self
            .rows
            .write()
            .map_err(|_| ScoutError::Store(StoreError::LockPoisoned))?;

        // Keep the logical clock strictly increasing even if two writes land
        // within the same clock tick.
        let now = Utc::now();
        let updated_at = match rows.iter().map(|r| r.updated_at).max() {
            Some(latest) if latest >= now => latest + chrono::Duration::microseconds(1),
            _ => now,
        };

        let id = new_entity_id();
        tracing::debug!(
            config_id = %id,
            model = %row.identity().versioned(),
            "Writing config row"
        );
        rows.push(ConfigStoreRow {
            id,
            provider: row.provider,
            model: row.model,
            version: row.version,
            role: row.role,
            updated_at,
            capabilities: row.capabilities,
            pricing: row.pricing,
            tier: row.tier,
            reason: row.reason,
        });
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    async fn history(&self, filter: &ConfigFilter, limit: usize) -> ScoutResult<Vec<ConfigStoreRow>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| ScoutError::Store(StoreError::LockPoisoned))?;
        let mut matching: Vec<ConfigStoreRow> =
            rows.iter().filter(|row| filter.matches(row)).cloned().collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        matching.truncate(limit);
        Ok(matching)
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
