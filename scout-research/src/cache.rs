//! Configuration cache
//!
//! In-memory copy of the active model configuration plus the prompt-template
//! bookkeeping built on top of it. The cache is stale whenever the store holds
//! a row newer than `template_cached_at`.

use chrono::Utc;
use scout_core::{
    new_entity_id, Capabilities, ConfigId, ConfigStoreRow, ContextUsage, ModelIdentity, ModelTier,
    Pricing, SessionId, Timestamp, UpgradeRequest,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TOKEN ACCOUNTING
// ============================================================================

/// Tokens spent building the shared prompt template.
pub const TEMPLATE_BASE_TOKENS: u64 = 1_200;

/// Additional tokens per framework named in the request.
pub const TOKENS_PER_FRAMEWORK: u64 = 150;

/// Upper bound applied to a request's complexity score.
pub const MAX_COMPLEXITY_SCORE: f64 = 10.0;

/// Estimate the full prompt size for a request, template included.
///
/// `(base * size_multiplier + 150 * frameworks) * (1 + complexity / 10)`,
/// with complexity clamped to `0..=10`.
pub fn estimate_prompt_tokens(request: &UpgradeRequest) -> u64 {
    let base = TEMPLATE_BASE_TOKENS as f64 * request.size_category.token_multiplier();
    let frameworks = (TOKENS_PER_FRAMEWORK * request.frameworks.len() as u64) as f64;
    let complexity = if request.complexity_score.is_nan() {
        0.0
    } else {
        request.complexity_score.clamp(0.0, MAX_COMPLEXITY_SCORE)
    };
    ((base + frameworks) * (1.0 + complexity / MAX_COMPLEXITY_SCORE)).round() as u64
}

// ============================================================================
// CONFIG CACHE
// ============================================================================

/// Cached active configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigCache {
    pub current_model: ModelIdentity,
    /// Store row the cache was built from.
    pub db_config_id: ConfigId,
    /// `updated_at` of that row.
    pub source_updated_at: Timestamp,
    /// Logical clock compared against the store. Never earlier than
    /// `source_updated_at`.
    pub template_cached_at: Timestamp,
    pub session_id: SessionId,
    pub request_count: u64,
    pub is_active: bool,
    pub tier: ModelTier,
    pub capabilities: Capabilities,
    pub pricing: Pricing,
}

impl ConfigCache {
    /// Build a fresh cache from a store row with a new session.
    pub fn from_row(row: &ConfigStoreRow) -> Self {
        let now = Utc::now();
        Self {
            current_model: row.identity(),
            db_config_id: row.id,
            source_updated_at: row.updated_at,
            template_cached_at: now.max(row.updated_at),
            session_id: new_entity_id(),
            request_count: 0,
            is_active: true,
            tier: row.tier,
            capabilities: row.capabilities,
            pricing: row.pricing,
        }
    }

    /// True when `row` is not newer than this cache. Since `template_cached_at`
    /// never predates the source row, a cache built from a newer row is
    /// always fresh against an older one.
    pub fn is_fresh_against(&self, row: &ConfigStoreRow) -> bool {
        self.is_active && self.template_cached_at >= row.updated_at
    }

    /// Account one request against the cached template.
    ///
    /// The first request of a session pays for the template; later requests
    /// only pay for their own context.
    pub fn record_use(&mut self, request: &UpgradeRequest) -> ContextUsage {
        let prompt_tokens_estimate = estimate_prompt_tokens(request);
        let template_reused = self.request_count > 0;
        let tokens_used = if template_reused {
            prompt_tokens_estimate.saturating_sub(TEMPLATE_BASE_TOKENS)
        } else {
            prompt_tokens_estimate
        };
        self.request_count += 1;

        ContextUsage {
            prompt_tokens_estimate,
            tokens_used,
            template_reused,
            model: self.current_model.clone(),
            session_id: self.session_id,
        }
    }

    /// Inspection view.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            model: self.current_model.to_string(),
            version: self.current_model.version.clone(),
            db_config_id: self.db_config_id,
            session_id: self.session_id,
            request_count: self.request_count,
            template_cached_at: self.template_cached_at,
            is_active: self.is_active,
            tier: self.tier,
        }
    }

    /// Serialize for the snapshot store.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a persisted snapshot. Inactive snapshots are rejected: they were
    /// written mid-upgrade and cannot be trusted.
    pub fn decode(raw: &str) -> Result<Self, SnapshotRejected> {
        let cache: Self = serde_json::from_str(raw)
            .map_err(|e| SnapshotRejected::Unparseable(e.to_string()))?;
        if !cache.is_active {
            return Err(SnapshotRejected::Inactive);
        }
        Ok(cache)
    }
}

/// Why a persisted snapshot was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRejected {
    Unparseable(String),
    Inactive,
}

impl fmt::Display for SnapshotRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotRejected::Unparseable(reason) => write!(f, "unparseable snapshot: {}", reason),
            SnapshotRejected::Inactive => write!(f, "snapshot marked inactive"),
        }
    }
}

/// Read-only view of the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// `provider/model`
    pub model: String,
    pub version: String,
    pub db_config_id: ConfigId,
    pub session_id: SessionId,
    pub request_count: u64,
    pub template_cached_at: Timestamp,
    pub is_active: bool,
    pub tier: ModelTier,
}

// ============================================================================
// UNIT TESTS
// ============================================================================
