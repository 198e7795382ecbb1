//! Upgrade operation types

use crate::{Capabilities, ModelIdentity, ModelTier, Pricing, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One attempt to change the active model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeOperation {
    pub provider: String,
    pub model: String,
    pub version: String,
    pub reason: String,
    pub capabilities: Option<Capabilities>,
    pub pricing: Option<Pricing>,
    pub tier: Option<ModelTier>,
    pub started_at: Timestamp,
}

impl UpgradeOperation {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        version: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            version: version.into(),
            reason: reason.into(),
            capabilities: None,
            pricing: None,
            tier: None,
            started_at: Utc::now(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn identity(&self) -> ModelIdentity {
        ModelIdentity::new(&self.provider, &self.model, &self.version)
    }
}

/// Terminal state of an upgrade attempt. Never partially visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeResult {
    pub success: bool,
    pub old_model: Option<ModelIdentity>,
    pub new_model: Option<ModelIdentity>,
    pub requires_recaching: bool,
    /// Queued requests re-targeted to the new configuration.
    pub queued_requests_processed: usize,
    /// True when the drain wait hit its deadline with requests still active.
    pub drain_timed_out: bool,
    /// Failure or rejection reason.
    pub message: Option<String>,
    pub started_at: Timestamp,
    pub completed_at: Timestamp,
}

impl UpgradeResult {
    /// Successful swap from `old_model` to `new_model`.
    pub fn succeeded(
        old_model: Option<ModelIdentity>,
        new_model: ModelIdentity,
        started_at: Timestamp,
    ) -> Self {
        Self {
            success: true,
            old_model,
            new_model: Some(new_model),
            requires_recaching: true,
            queued_requests_processed: 0,
            drain_timed_out: false,
            message: None,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Failed attempt; the active configuration is unchanged.
    pub fn failed(
        old_model: Option<ModelIdentity>,
        message: impl Into<String>,
        started_at: Timestamp,
    ) -> Self {
        Self {
            success: false,
            old_model,
            new_model: None,
            requires_recaching: false,
            queued_requests_processed: 0,
            drain_timed_out: false,
            message: Some(message.into()),
            started_at,
            completed_at: Utc::now(),
        }
    }
}
