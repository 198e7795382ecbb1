//! Research collaborator types

use crate::{Capabilities, ModelIdentity, ModelTier, Pricing, SizeCategory, Timestamp, UpgradeOperation, Urgency};
use serde::{Deserialize, Serialize};

/// Context handed to the research collaborator for a context research cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchContext {
    pub language: Option<String>,
    pub size_category: Option<SizeCategory>,
    pub role: Option<String>,
    pub urgency: Urgency,
    pub reason: String,
}

impl ResearchContext {
    /// Context for a full periodic sweep across all languages and roles.
    pub fn sweep(reason: impl Into<String>) -> Self {
        Self {
            language: None,
            size_category: None,
            role: None,
            urgency: Urgency::Normal,
            reason: reason.into(),
        }
    }
}

/// Result of `conduct_research_and_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub success: bool,
    pub tokens_used: u64,
    pub updated_configs: u32,
}

/// A concrete configuration the collaborator suggests switching to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeRecommendation {
    pub provider: String,
    pub model: String,
    pub version: String,
    pub reason: String,
    pub capabilities: Option<Capabilities>,
    pub pricing: Option<Pricing>,
    pub tier: Option<ModelTier>,
}

impl UpgradeRecommendation {
    /// Turn the recommendation into an upgrade attempt starting now.
    pub fn to_operation(&self) -> UpgradeOperation {
        UpgradeOperation {
            capabilities: self.capabilities,
            pricing: self.pricing,
            tier: self.tier,
            ..UpgradeOperation::new(&self.provider, &self.model, &self.version, &self.reason)
        }
    }
}

/// Result of `conduct_meta_research`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaResearchReport {
    pub current_model: Option<ModelIdentity>,
    pub recommendation: String,
    pub upgrade_recommendation: Option<UpgradeRecommendation>,
    /// Confidence in the recommendation (0.0 to 1.0).
    pub confidence: f64,
    pub researched_at: Timestamp,
}

impl MetaResearchReport {
    pub fn recommends_upgrade(&self) -> bool {
        self.upgrade_recommendation.is_some()
    }
}

/// History entry written for every meta research call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaResearchRecord {
    pub model_snapshot: Option<ModelIdentity>,
    pub recommendation: String,
    pub recommended_upgrade: Option<ModelIdentity>,
    pub confidence: f64,
    pub recorded_at: Timestamp,
}

impl From<&MetaResearchReport> for MetaResearchRecord {
    fn from(report: &MetaResearchReport) -> Self {
        Self {
            model_snapshot: report.current_model.clone(),
            recommendation: report.recommendation.clone(),
            recommended_upgrade: report
                .upgrade_recommendation
                .as_ref()
                .map(|r| ModelIdentity::new(&r.provider, &r.model, &r.version)),
            confidence: report.confidence,
            recorded_at: report.researched_at,
        }
    }
}
