//! Researcher: owns the configuration cache and mediates every read and write
//! of the active model configuration.

use crate::cache::{CacheStats, ConfigCache};
use chrono::Utc;
use scout_core::{
    ConfigFilter, ConfigStoreRow, ContextUsage, MetaResearchRecord, MetaResearchReport,
    ModelIdentity, NewConfigRow, ResearchContext, ResearchError, ResearchOutcome, ScoutError,
    ScoutResult, StoreError, UpgradeOperation, UpgradeRequest, UpgradeResult,
    DEFAULT_META_HISTORY_LIMIT,
};
use scout_llm::ResearchProvider;
use scout_storage::{CacheSnapshotStore, ConfigStore};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::RwLock;

/// Cache contents plus whether the persisted snapshot has been consulted.
#[derive(Debug, Default)]
struct CacheSlot {
    cache: Option<ConfigCache>,
    snapshot_checked: bool,
}

/// Keeps the cached configuration consistent with the store.
///
/// Readers never observe a half-applied upgrade: `upgrade` holds the cache
/// write lock from the snapshot through the store write to the rebuild or
/// restore.
pub struct Researcher {
    store: Arc<dyn ConfigStore>,
    provider: Arc<dyn ResearchProvider>,
    snapshots: Option<Arc<dyn CacheSnapshotStore>>,
    filter: ConfigFilter,
    cache: RwLock<CacheSlot>,
    meta_history: StdRwLock<VecDeque<MetaResearchRecord>>,
    meta_history_limit: usize,
}

impl Researcher {
    pub fn new(store: Arc<dyn ConfigStore>, provider: Arc<dyn ResearchProvider>) -> Self {
        Self {
            store,
            provider,
            snapshots: None,
            filter: ConfigFilter::any(),
            cache: RwLock::new(CacheSlot::default()),
            meta_history: StdRwLock::new(VecDeque::new()),
            meta_history_limit: DEFAULT_META_HISTORY_LIMIT,
        }
    }

    /// Persist the cache to `snapshots` after each rebuild and restore it on
    /// first use.
    pub fn with_snapshot_store(mut self, snapshots: Arc<dyn CacheSnapshotStore>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Restrict the rows this researcher reads and writes to one role.
    pub fn with_filter(mut self, filter: ConfigFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Retain at most `limit` meta research outcomes, dropping the oldest.
    /// Zero keeps none.
    pub fn with_meta_history_limit(mut self, limit: usize) -> Self {
        self.meta_history_limit = limit;
        self
    }

    pub fn filter(&self) -> &ConfigFilter {
        &self.filter
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    // ========================================================================
    // CACHE CONSISTENCY
    // ========================================================================

    /// Whether the cache reflects the newest store row.
    ///
    /// A missing cache is never in sync. An empty store with a cache present
    /// is in sync.
    pub async fn is_cache_sync_with_db(&self) -> ScoutResult<bool> {
        self.ensure_loaded().await;
        let latest = self.store.read_latest(&self.filter).await?;
        let slot = self.cache.read().await;
        Ok(match (&slot.cache, latest) {
            (None, _) => false,
            (Some(cache), None) => cache.is_active,
            (Some(cache), Some(row)) => cache.is_fresh_against(&row),
        })
    }

    /// Rebuild the cache from the newest store row if it is stale.
    ///
    /// # Returns
    /// * `Ok(CacheStats)` - The cache after the sync
    /// * `Err(ScoutError::Research)` - If the store holds no row and no cache exists
    pub async fn sync_cache_with_db(&self) -> ScoutResult<CacheStats> {
        self.ensure_loaded().await;
        let latest = self.store.read_latest(&self.filter).await?;
        let mut slot = self.cache.write().await;
        match latest {
            Some(row) => {
                self.repair_locked(&mut slot, &row).await;
            }
            None if slot.cache.is_none() => return Err(self.missing_configuration()),
            None => {}
        }
        slot.cache
            .as_ref()
            .map(ConfigCache::stats)
            .ok_or_else(|| self.missing_configuration())
    }

    /// Serve a consumer request from the cache, read-repairing first if the
    /// store moved ahead.
    ///
    /// # Returns
    /// * `Ok(ContextUsage)` - Token accounting and the model that served it
    /// * `Err(ScoutError::Research)` - If no configuration exists anywhere
    /// * `Err(ScoutError::Store)` - If the store read fails
    pub async fn use_for_context(&self, request: &UpgradeRequest) -> ScoutResult<ContextUsage> {
        self.ensure_loaded().await;
        let latest = self.store.read_latest(&self.filter).await?;

        let mut slot = self.cache.write().await;
        if let Some(row) = &latest {
            self.repair_locked(&mut slot, row).await;
        }

        match slot.cache.as_mut() {
            Some(cache) => Ok(cache.record_use(request)),
            None => Err(self.missing_configuration()),
        }
    }

    /// Rebuild from `row` unless the cache is already fresh against it.
    async fn repair_locked(&self, slot: &mut CacheSlot, row: &ConfigStoreRow) {
        if let Some(cache) = &slot.cache {
            if cache.is_fresh_against(row) {
                return;
            }
        }

        let cache = ConfigCache::from_row(row);
        tracing::debug!(
            config_id = %row.id,
            model = %cache.current_model.versioned(),
            session_id = %cache.session_id,
            "Rebuilding configuration cache from store"
        );
        self.persist(&cache).await;
        slot.cache = Some(cache);
    }

    // ========================================================================
    // UPGRADE
    // ========================================================================

    /// Switch the active configuration to `operation`'s model.
    ///
    /// Never returns an error: a failed store write restores the previous
    /// cache exactly and is reported through `UpgradeResult::success`.
    pub async fn upgrade(&self, operation: UpgradeOperation) -> UpgradeResult {
        self.ensure_loaded().await;
        let mut slot = self.cache.write().await;

        let snapshot = slot.cache.clone();
        let old_model = snapshot.as_ref().map(|c| c.current_model.clone());
        if let Some(cache) = slot.cache.as_mut() {
            cache.is_active = false;
        }

        let new_row = NewConfigRow {
            provider: operation.provider.clone(),
            model: operation.model.clone(),
            version: operation.version.clone(),
            role: self.filter.role.clone(),
            capabilities: operation
                .capabilities
                .or_else(|| snapshot.as_ref().map(|c| c.capabilities))
                .unwrap_or_default(),
            pricing: operation
                .pricing
                .or_else(|| snapshot.as_ref().map(|c| c.pricing))
                .unwrap_or_default(),
            tier: operation.tier.unwrap_or_default(),
            reason: Some(operation.reason.clone()),
        };

        let config_id = match self.store.write(new_row.clone()).await {
            Ok(id) => id,
            Err(e) => {
                slot.cache = snapshot;
                tracing::warn!(
                    target_model = %operation.identity().versioned(),
                    error = %e,
                    "Upgrade write failed, restored previous configuration"
                );
                return UpgradeResult::failed(old_model, e.to_string(), operation.started_at);
            }
        };

        // Rebuild from the persisted row so the cache carries the store's clock.
        let written = match self.store.read_latest(&self.filter).await {
            Ok(Some(row)) if row.id == config_id => row,
            _ => {
                tracing::warn!(
                    config_id = %config_id,
                    "Written row not readable, caching from the upgrade request"
                );
                ConfigStoreRow {
                    id: config_id,
                    provider: new_row.provider,
                    model: new_row.model,
                    version: new_row.version,
                    role: new_row.role,
                    updated_at: Utc::now(),
                    capabilities: new_row.capabilities,
                    pricing: new_row.pricing,
                    tier: new_row.tier,
                    reason: new_row.reason,
                }
            }
        };
        let cache = ConfigCache::from_row(&written);

        let new_model = cache.current_model.clone();
        self.persist(&cache).await;
        slot.cache = Some(cache);

        tracing::info!(
            old_model = %old_model.as_ref().map(ModelIdentity::versioned).unwrap_or_default(),
            new_model = %new_model.versioned(),
            config_id = %config_id,
            "Configuration upgraded"
        );
        UpgradeResult::succeeded(old_model, new_model, operation.started_at)
    }

    // ========================================================================
    // RESEARCH DELEGATION
    // ========================================================================

    /// Ask the collaborator whether a better model exists and record the
    /// answer in the bounded meta research history.
    pub async fn conduct_meta_research(&self) -> ScoutResult<MetaResearchReport> {
        let current = self.current_model().await;
        let report = self.provider.conduct_meta_research(current.as_ref()).await?;

        let mut history = self
            .meta_history
            .write()
            .map_err(|_| ScoutError::Store(StoreError::LockPoisoned))?;
        if self.meta_history_limit > 0 {
            while history.len() >= self.meta_history_limit {
                history.pop_front();
            }
            history.push_back(MetaResearchRecord::from(&report));
        }

        tracing::info!(
            confidence = report.confidence,
            recommends_upgrade = report.recommends_upgrade(),
            "Meta research recorded"
        );
        Ok(report)
    }

    /// Run context research. Updated rows are picked up by the next
    /// `use_for_context` through read-repair.
    pub async fn conduct_research_and_update(
        &self,
        context: &ResearchContext,
    ) -> ScoutResult<ResearchOutcome> {
        let outcome = self.provider.conduct_research_and_update(context).await?;
        tracing::info!(
            tokens_used = outcome.tokens_used,
            updated_configs = outcome.updated_configs,
            reason = %context.reason,
            "Context research completed"
        );
        Ok(outcome)
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    pub async fn get_cache_stats(&self) -> Option<CacheStats> {
        self.ensure_loaded().await;
        self.cache.read().await.cache.as_ref().map(ConfigCache::stats)
    }

    /// Model served by the cache, falling back to the newest store row.
    pub async fn current_model(&self) -> Option<ModelIdentity> {
        self.ensure_loaded().await;
        if let Some(cache) = self.cache.read().await.cache.as_ref() {
            return Some(cache.current_model.clone());
        }
        match self.store.read_latest(&self.filter).await {
            Ok(row) => row.map(|r| r.identity()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read current model from store");
                None
            }
        }
    }

    /// Retained meta research outcomes, oldest first.
    pub fn meta_research_history(&self) -> Vec<MetaResearchRecord> {
        self.meta_history
            .read()
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    // ========================================================================
    // SNAPSHOT PERSISTENCE
    // ========================================================================

    /// Restore the persisted snapshot once, on first access.
    async fn ensure_loaded(&self) {
        if self.cache.read().await.snapshot_checked {
            return;
        }
        let mut slot = self.cache.write().await;
        if slot.snapshot_checked {
            return;
        }
        slot.snapshot_checked = true;

        let Some(snapshots) = &self.snapshots else {
            return;
        };
        match snapshots.load().await {
            Ok(Some(raw)) => match ConfigCache::decode(&raw) {
                Ok(cache) => {
                    tracing::debug!(
                        session_id = %cache.session_id,
                        model = %cache.current_model.versioned(),
                        "Restored configuration cache snapshot"
                    );
                    slot.cache = Some(cache);
                }
                Err(rejected) => {
                    tracing::warn!(reason = %rejected, "Discarding cache snapshot");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load cache snapshot");
            }
        }
    }

    async fn persist(&self, cache: &ConfigCache) {
        let Some(snapshots) = &self.snapshots else {
            return;
        };
        let encoded = match cache.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode cache snapshot");
                return;
            }
        };
        if let Err(e) = snapshots.save(&encoded).await {
            tracing::warn!(error = %e, "Failed to persist cache snapshot");
        }
    }

    fn missing_configuration(&self) -> ScoutError {
        ScoutError::Research(ResearchError::MissingConfiguration {
            role: self.filter.role_label().to_string(),
        })
    }
}

impl std::fmt::Debug for Researcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Researcher")
            .field("provider", &self.provider.provider_id())
            .field("filter", &self.filter)
            .field("snapshots", &self.snapshots.is_some())
            .finish()
    }
}
