//! SCOUT LLM - Research Collaborator Abstraction
//!
//! Provider-agnostic trait for the research procedure that discovers model
//! candidates and evaluates the active configuration. Real implementations
//! (web research, provider catalog scraping) are supplied by the embedding
//! service; this crate ships the trait and a scriptable mock.

use async_trait::async_trait;
use chrono::Utc;
use scout_core::{
    MetaResearchReport, ModelIdentity, ResearchContext, ResearchError, ResearchOutcome,
    ScoutError, ScoutResult, UpgradeRecommendation,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// RESEARCH PROVIDER TRAIT
// ============================================================================

/// Trait for research collaborators.
/// Implementations must be thread-safe (Send + Sync).
///
/// Calls are treated as opaque, potentially slow, potentially failing remote
/// operations. Callers never retry automatically.
///
/// # Example
/// ```ignore
/// struct WebResearcher { /* ... */ }
///
/// #[async_trait]
/// impl ResearchProvider for WebResearcher {
///     async fn conduct_meta_research(&self, current: Option<&ModelIdentity>)
///         -> ScoutResult<MetaResearchReport> {
///         // Compare the current model against fresh benchmarks
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    /// Research model configurations for a context and persist any updates.
    ///
    /// # Arguments
    /// * `context` - Language/size/role the research targets
    ///
    /// # Returns
    /// * `Ok(ResearchOutcome)` - Tokens spent and number of configs updated
    /// * `Err(ScoutError::Research)` - If the research call fails
    async fn conduct_research_and_update(
        &self,
        context: &ResearchContext,
    ) -> ScoutResult<ResearchOutcome>;

    /// Evaluate whether a better configuration than `current` exists.
    ///
    /// # Arguments
    /// * `current` - The configuration currently active, if any
    ///
    /// # Returns
    /// * `Ok(MetaResearchReport)` - Recommendation with confidence
    /// * `Err(ScoutError::Research)` - If the research call fails
    async fn conduct_meta_research(
        &self,
        current: Option<&ModelIdentity>,
    ) -> ScoutResult<MetaResearchReport>;

    /// Identifier used in logs and errors.
    fn provider_id(&self) -> &str;
}

// ============================================================================
// MOCK PROVIDER FOR TESTING
// ============================================================================

/// Scriptable research provider for tests.
///
/// Meta research returns queued recommendations in order, then falls back to
/// a "keep current model" report. Either call can be made to fail or to take
/// a fixed amount of time.
#[derive(Debug, Default)]
pub struct MockResearchProvider {
    recommendations: Mutex<VecDeque<(UpgradeRecommendation, f64)>>,
    fail_context: AtomicBool,
    fail_meta: AtomicBool,
    latency: Mutex<Option<Duration>>,
    context_calls: AtomicU64,
    meta_calls: AtomicU64,
    updated_configs_per_call: AtomicU64,
}

impl MockResearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a recommendation returned by the next meta research call.
    pub fn push_recommendation(&self, recommendation: UpgradeRecommendation, confidence: f64) {
        if let Ok(mut queue) = self.recommendations.lock() {
            queue.push_back((recommendation, confidence));
        }
    }

    /// Make context research fail.
    pub fn set_fail_context(&self, fail: bool) {
        self.fail_context.store(fail, Ordering::SeqCst);
    }

    /// Make meta research fail.
    pub fn set_fail_meta(&self, fail: bool) {
        self.fail_meta.store(fail, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = Some(latency);
        }
    }

    /// Number of configs each context research call reports as updated.
    pub fn set_updated_configs(&self, count: u64) {
        self.updated_configs_per_call.store(count, Ordering::Relaxed);
    }

    pub fn context_calls(&self) -> u64 {
        self.context_calls.load(Ordering::Relaxed)
    }

    pub fn meta_calls(&self) -> u64 {
        self.meta_calls.load(Ordering::Relaxed)
    }

    async fn simulate_latency(&self) {
        let latency = self.latency.lock().ok().and_then(|slot| *slot);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ResearchProvider for MockResearchProvider {
    async fn conduct_research_and_update(
        &self,
        context: &ResearchContext,
    ) -> ScoutResult<ResearchOutcome> {
        self.context_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        if self.fail_context.load(Ordering::SeqCst) {
            return Err(ScoutError::Research(ResearchError::ProviderFailed {
                provider: self.provider_id().to_string(),
                message: format!("context research failed: {}", context.reason),
            }));
        }

        // Rough estimate: 4 chars per token of the research brief
        let tokens_used = 2_000 + (context.reason.len() as u64 / 4);
        Ok(ResearchOutcome {
            success: true,
            tokens_used,
            updated_configs: self.updated_configs_per_call.load(Ordering::Relaxed) as u32,
        })
    }

    async fn conduct_meta_research(
        &self,
        current: Option<&ModelIdentity>,
    ) -> ScoutResult<MetaResearchReport> {
        self.meta_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        if self.fail_meta.load(Ordering::SeqCst) {
            return Err(ScoutError::Research(ResearchError::MetaResearchFailed {
                reason: "mock meta research failure".to_string(),
            }));
        }

        let next = self
            .recommendations
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());

        let report = match next {
            Some((recommendation, confidence)) => MetaResearchReport {
                current_model: current.cloned(),
                recommendation: format!(
                    "Switch to {}/{}: {}",
                    recommendation.provider, recommendation.model, recommendation.reason
                ),
                upgrade_recommendation: Some(recommendation),
                confidence,
                researched_at: Utc::now(),
            },
            None => MetaResearchReport {
                current_model: current.cloned(),
                recommendation: "Current model remains the best available option".to_string(),
                upgrade_recommendation: None,
                confidence: 0.9,
                researched_at: Utc::now(),
            },
        };
        Ok(report)
    }

    fn provider_id(&self) -> &str {
        "mock-research"
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn recommendation() -> UpgradeRecommendation {
        UpgradeRecommendation {
            provider: "anthropic".to_string(),
            model: "claude-4-sonnet".to_string(),
            version: "v1".to_string(),
            reason: "better code quality".to_string(),
            capabilities: None,
            pricing: None,
            tier: None,
        }
    }

    #[tokio::test]
    async fn test_meta_research_without_script_keeps_model() {
        let provider = MockResearchProvider::new();
        let current = ModelIdentity::new("google", "gemini-2.5-flash", "v1");
        let report = provider.conduct_meta_research(Some(&current)).await.unwrap();
        assert!(!report.recommends_upgrade());
        assert_eq!(report.current_model, Some(current));
        assert_eq!(provider.meta_calls(), 1);
    }

    #[tokio::test]
    async fn test_meta_research_returns_scripted_recommendations_in_order() {
        let provider = MockResearchProvider::new();
        provider.push_recommendation(recommendation(), 0.95);
        let mut second = recommendation();
        second.model = "claude-4-opus".to_string();
        provider.push_recommendation(second, 0.5);

        let first = provider.conduct_meta_research(None).await.unwrap();
        assert_eq!(first.confidence, 0.95);
        assert_eq!(
            first.upgrade_recommendation.map(|r| r.model).as_deref(),
            Some("claude-4-sonnet")
        );

        let next = provider.conduct_meta_research(None).await.unwrap();
        assert_eq!(
            next.upgrade_recommendation.map(|r| r.model).as_deref(),
            Some("claude-4-opus")
        );

        let fallback = provider.conduct_meta_research(None).await.unwrap();
        assert!(!fallback.recommends_upgrade());
    }

    #[tokio::test]
    async fn test_meta_research_failure() {
        let provider = MockResearchProvider::new();
        provider.set_fail_meta(true);
        let err = provider.conduct_meta_research(None).await.unwrap_err();
        assert!(matches!(
            err,
            ScoutError::Research(ResearchError::MetaResearchFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_context_research_reports_updates() {
        let provider = MockResearchProvider::new();
        provider.set_updated_configs(3);
        let outcome = provider
            .conduct_research_and_update(&ResearchContext::sweep("quarterly"))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.updated_configs, 3);
        assert!(outcome.tokens_used >= 2_000);
        assert_eq!(provider.context_calls(), 1);
    }

    #[tokio::test]
    async fn test_context_research_failure_names_provider() {
        let provider = MockResearchProvider::new();
        provider.set_fail_context(true);
        let err = provider
            .conduct_research_and_update(&ResearchContext::sweep("quarterly"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("mock-research"));
    }
}
