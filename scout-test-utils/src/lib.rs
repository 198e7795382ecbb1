//! SCOUT Test Utilities
//!
//! Shared test infrastructure for the SCOUT workspace:
//! - Proptest generators for request and configuration types
//! - Fixtures for seeded stores and common requests
//! - Assertions for SCOUT error variants

pub use scout_llm::MockResearchProvider;
pub use scout_storage::{InMemoryConfigStore, InMemorySnapshotStore};

pub use scout_core::{
    Capabilities, ConfigStoreRow, JobType, ModelIdentity, ModelTier, NewConfigRow, Pricing,
    ResearchError, ScoutError, ScoutResult, SizeCategory, StoreError, Timestamp, UpgradeRequest,
    UpgradeRecommendation, Urgency,
};

use async_trait::async_trait;
use chrono::Utc;
use scout_core::{ConfigFilter, ConfigId};
use scout_storage::ConfigStore;
use tokio::sync::watch;

// ============================================================================
// GATED STORE
// ============================================================================

/// Open/closed barrier that async callers wait on.
#[derive(Debug)]
pub struct Gate {
    open: watch::Sender<bool>,
}

impl Gate {
    /// Create an open gate.
    pub fn new() -> Self {
        let (open, _) = watch::channel(true);
        Self { open }
    }

    pub fn close(&self) {
        self.open.send_replace(false);
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Wait until the gate is open.
    pub async fn pass(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory store whose reads and writes can be held at a gate.
///
/// Lets tests freeze an upgrade mid-swap or keep a request in flight.
#[derive(Debug, Default)]
pub struct GatedConfigStore {
    inner: InMemoryConfigStore,
    reads: Gate,
    writes: Gate,
}

impl GatedConfigStore {
    pub fn new(inner: InMemoryConfigStore) -> Self {
        Self {
            inner,
            reads: Gate::new(),
            writes: Gate::new(),
        }
    }

    pub fn inner(&self) -> &InMemoryConfigStore {
        &self.inner
    }

    pub fn reads(&self) -> &Gate {
        &self.reads
    }

    pub fn writes(&self) -> &Gate {
        &self.writes
    }
}

#[async_trait]
impl ConfigStore for GatedConfigStore {
    async fn read_latest(&self, filter: &ConfigFilter) -> ScoutResult<Option<ConfigStoreRow>> {
        self.reads.pass().await;
        self.inner.read_latest(filter).await
    }

    async fn write(&self, row: NewConfigRow) -> ScoutResult<ConfigId> {
        self.writes.pass().await;
        self.inner.write(row).await
    }

    async fn history(&self, filter: &ConfigFilter, limit: usize) -> ScoutResult<Vec<ConfigStoreRow>> {
        self.inner.history(filter, limit).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for SCOUT types.

    use super::*;
    use proptest::prelude::*;

    /// Generate an Urgency variant.
    pub fn arb_urgency() -> impl Strategy<Value = Urgency> {
        prop_oneof![Just(Urgency::Normal), Just(Urgency::Critical)]
    }

    /// Generate a SizeCategory variant.
    pub fn arb_size_category() -> impl Strategy<Value = SizeCategory> {
        prop_oneof![
            Just(SizeCategory::Small),
            Just(SizeCategory::Medium),
            Just(SizeCategory::Large),
            Just(SizeCategory::Enterprise),
        ]
    }

    /// Generate a ModelTier variant.
    pub fn arb_model_tier() -> impl Strategy<Value = ModelTier> {
        prop_oneof![
            Just(ModelTier::Economy),
            Just(ModelTier::Standard),
            Just(ModelTier::Premium),
        ]
    }

    /// Generate a JobType variant.
    pub fn arb_job_type() -> impl Strategy<Value = JobType> {
        prop_oneof![
            Just(JobType::QuarterlyContext),
            Just(JobType::QuarterlyMeta),
            Just(JobType::UnscheduledMissingConfig),
            Just(JobType::ManualTrigger),
        ]
    }

    /// Generate capability scores in `0.0..=1.0`.
    pub fn arb_capabilities() -> impl Strategy<Value = Capabilities> {
        (0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0).prop_map(
            |(quality, speed, context_window, reasoning, code_quality)| Capabilities {
                quality,
                speed,
                context_window,
                reasoning,
                code_quality,
            },
        )
    }

    /// Generate a provider/model/version triple.
    pub fn arb_model_identity() -> impl Strategy<Value = ModelIdentity> {
        (
            prop_oneof![Just("google"), Just("anthropic"), Just("openai")],
            "[a-z][a-z0-9.-]{2,16}",
            "v[0-9]{1,2}",
        )
            .prop_map(|(provider, model, version)| ModelIdentity::new(provider, model, version))
    }

    /// Generate a consumer request with any urgency.
    pub fn arb_upgrade_request() -> impl Strategy<Value = UpgradeRequest> {
        (
            prop_oneof![Just("rust"), Just("typescript"), Just("python"), Just("go")],
            arb_size_category(),
            prop_oneof![Just("security"), Just("performance"), Just("review")],
            prop::collection::vec("[a-z]{3,10}", 0..4),
            0.0f64..=10.0,
            arb_urgency(),
        )
            .prop_map(|(language, size, role, frameworks, complexity, urgency)| {
                UpgradeRequest::new(language, size, role)
                    .with_frameworks(frameworks)
                    .with_complexity(complexity)
                    .with_urgency(urgency)
            })
    }

    /// Generate a Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64)
            .prop_map(|secs| chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;
    use std::sync::Arc;

    /// Stored row for `provider/model`, updated `age` ago.
    pub fn config_row(provider: &str, model: &str, age: chrono::Duration) -> ConfigStoreRow {
        ConfigStoreRow {
            id: scout_core::new_entity_id(),
            provider: provider.to_string(),
            model: model.to_string(),
            version: "v1".to_string(),
            role: None,
            updated_at: Utc::now() - age,
            capabilities: Capabilities {
                quality: 0.8,
                speed: 0.9,
                context_window: 0.9,
                reasoning: 0.7,
                code_quality: 0.75,
            },
            pricing: Pricing {
                input: 0.3,
                output: 2.5,
            },
            tier: ModelTier::Standard,
            reason: Some("initial configuration".to_string()),
        }
    }

    /// The baseline configuration most tests start from.
    pub fn gemini_flash_row() -> ConfigStoreRow {
        config_row("google", "gemini-2.5-flash", chrono::Duration::hours(1))
    }

    /// Store holding `gemini_flash_row()`.
    pub fn seeded_store() -> Arc<InMemoryConfigStore> {
        Arc::new(seeded_in_memory())
    }

    /// Gated store holding `gemini_flash_row()`, both gates open.
    pub fn seeded_gated_store() -> Arc<GatedConfigStore> {
        Arc::new(GatedConfigStore::new(seeded_in_memory()))
    }

    fn seeded_in_memory() -> InMemoryConfigStore {
        let store = InMemoryConfigStore::new();
        // A fresh store has no rows, so any timestamp advances its clock.
        let _ = store.insert_row(gemini_flash_row());
        store
    }

    /// Row ready for `ConfigStore::write`.
    pub fn new_config_row(provider: &str, model: &str) -> NewConfigRow {
        NewConfigRow {
            provider: provider.to_string(),
            model: model.to_string(),
            version: "v1".to_string(),
            role: None,
            capabilities: Capabilities::default(),
            pricing: Pricing::default(),
            tier: ModelTier::Standard,
            reason: Some("external update".to_string()),
        }
    }

    /// Recommendation to move to `provider/model`.
    pub fn recommendation(provider: &str, model: &str) -> UpgradeRecommendation {
        UpgradeRecommendation {
            provider: provider.to_string(),
            model: model.to_string(),
            version: "v1".to_string(),
            reason: "higher code quality at similar cost".to_string(),
            capabilities: None,
            pricing: None,
            tier: Some(ModelTier::Premium),
        }
    }

    /// A medium TypeScript review request.
    pub fn normal_request() -> UpgradeRequest {
        UpgradeRequest::new("typescript", SizeCategory::Medium, "security")
            .with_frameworks(vec!["react".to_string()])
    }

    /// Same as `normal_request` but critical.
    pub fn critical_request() -> UpgradeRequest {
        normal_request().with_urgency(Urgency::Critical)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for SCOUT error variants.

    use super::*;

    /// Assert that a result is a store error.
    pub fn assert_store_error<T: std::fmt::Debug>(result: &ScoutResult<T>) {
        assert!(
            matches!(result, Err(ScoutError::Store(_))),
            "Expected store error, got {:?}",
            result
        );
    }

    /// Assert that a result is a research error.
    pub fn assert_research_error<T: std::fmt::Debug>(result: &ScoutResult<T>) {
        assert!(
            matches!(result, Err(ScoutError::Research(_))),
            "Expected research error, got {:?}",
            result
        );
    }

    /// Assert that a result reports a missing configuration.
    pub fn assert_missing_configuration<T: std::fmt::Debug>(result: &ScoutResult<T>) {
        assert!(
            matches!(
                result,
                Err(ScoutError::Research(ResearchError::MissingConfiguration { .. }))
            ),
            "Expected MissingConfiguration, got {:?}",
            result
        );
    }

    /// Assert that a result is a configuration error.
    pub fn assert_config_error<T: std::fmt::Debug>(result: &ScoutResult<T>) {
        assert!(
            matches!(result, Err(ScoutError::Config(_))),
            "Expected config error, got {:?}",
            result
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_seeded_store_holds_baseline() {
        let store = fixtures::seeded_store();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_assertions_match_variants() {
        let missing: ScoutResult<()> = Err(ScoutError::Research(
            ResearchError::MissingConfiguration {
                role: "any".to_string(),
            },
        ));
        assertions::assert_missing_configuration(&missing);
        assertions::assert_research_error(&missing);

        let store: ScoutResult<()> = Err(ScoutError::Store(StoreError::LockPoisoned));
        assertions::assert_store_error(&store);
    }

    #[tokio::test]
    async fn test_seeded_store_reads_latest() {
        let store = fixtures::seeded_store();
        let latest = store
            .read_latest(&scout_core::ConfigFilter::any())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.model, "gemini-2.5-flash");
        assert!(latest.updated_at < Utc::now());
    }

    #[tokio::test]
    async fn test_gate_holds_writes_until_opened() {
        let store = fixtures::seeded_gated_store();
        store.writes().close();

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .write(fixtures::new_config_row("openai", "gpt-4.1"))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.inner().len(), 1);

        store.writes().open();
        writer.await.unwrap().unwrap();
        assert_eq!(store.inner().len(), 2);
    }
}
