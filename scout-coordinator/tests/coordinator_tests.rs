//! Upgrade coordination under concurrent traffic.
//!
//! A gated store freezes the upgrade in the Swapping phase (writes held) or
//! keeps a request in flight (reads held) so queueing and draining can be
//! observed deterministically.

use scout_coordinator::{UpgradeCoordinator, UpgradePhase, UPGRADE_IN_PROGRESS_MESSAGE};
use scout_core::{CoordinatorConfig, RequestStatus, UpgradeOperation};
use scout_research::Researcher;
use scout_test_utils::fixtures::{critical_request, normal_request, seeded_gated_store};
use scout_test_utils::{GatedConfigStore, MockResearchProvider};
use std::sync::Arc;
use std::time::Duration;

fn setup(config: CoordinatorConfig) -> (UpgradeCoordinator, Arc<GatedConfigStore>) {
    let store = seeded_gated_store();
    let researcher = Researcher::new(store.clone(), Arc::new(MockResearchProvider::new()));
    (UpgradeCoordinator::new(Arc::new(researcher), config), store)
}

fn sonnet_upgrade() -> UpgradeOperation {
    UpgradeOperation::new("anthropic", "claude-4-sonnet", "v1", "better review accuracy")
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("timed out waiting for {}", what);
}

async fn wait_for_phase(coordinator: &UpgradeCoordinator, phase: UpgradePhase) {
    wait_until(phase.as_db_str(), || coordinator.phase() == phase).await;
}

fn spawn_upgrade(
    coordinator: &UpgradeCoordinator,
    operation: UpgradeOperation,
) -> tokio::task::JoinHandle<scout_core::UpgradeResult> {
    let coordinator = coordinator.clone();
    tokio::spawn(async move { coordinator.upgrade(operation).await })
}

// ============================================================================
// MUTUAL EXCLUSION
// ============================================================================

#[tokio::test]
async fn test_second_upgrade_is_rejected_while_first_runs() {
    let (coordinator, store) = setup(CoordinatorConfig::development());
    store.writes().close();

    let first = spawn_upgrade(&coordinator, sonnet_upgrade());
    wait_for_phase(&coordinator, UpgradePhase::Swapping).await;

    let second = coordinator
        .upgrade(UpgradeOperation::new("openai", "gpt-4.1", "v1", "cheaper"))
        .await;
    assert!(!second.success);
    assert!(second
        .message
        .as_deref()
        .unwrap_or_default()
        .contains("already in progress"));

    store.writes().open();
    let first = first.await.unwrap();
    assert!(first.success);

    let stats = coordinator.stats();
    assert_eq!(stats.upgrades_succeeded, 1);
    assert_eq!(stats.upgrades_rejected, 1);
    assert_eq!(store.inner().write_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upgrades_never_overlap() {
    let (coordinator, store) = setup(CoordinatorConfig::development());

    let mut handles = Vec::new();
    for i in 0..8 {
        handles.push(spawn_upgrade(
            &coordinator,
            UpgradeOperation::new("openai", format!("gpt-4.{}", i), "v1", "race"),
        ));
    }

    let mut succeeded = 0u64;
    for handle in handles {
        let result = handle.await.unwrap();
        if result.success {
            succeeded += 1;
        } else {
            assert_eq!(result.message.as_deref(), Some(UPGRADE_IN_PROGRESS_MESSAGE));
        }
    }

    assert!(succeeded >= 1);
    let stats = coordinator.stats();
    assert_eq!(stats.upgrades_succeeded, succeeded);
    assert_eq!(stats.upgrades_rejected, 8 - succeeded);
    // Seed row plus one row per accepted upgrade.
    assert_eq!(store.inner().write_count(), 1 + succeeded);
    assert!(!stats.upgrade_in_progress);
}

// ============================================================================
// QUEUEING
// ============================================================================

#[tokio::test]
async fn test_queued_requests_run_on_new_model() {
    let (coordinator, store) = setup(CoordinatorConfig::development());
    coordinator.researcher().sync_cache_with_db().await.unwrap();
    store.writes().close();

    let upgrade = spawn_upgrade(&coordinator, sonnet_upgrade());
    wait_for_phase(&coordinator, UpgradePhase::Swapping).await;

    let mut queued = Vec::new();
    for _ in 0..5 {
        let outcome = coordinator.handle_research_request(normal_request()).await;
        assert_eq!(outcome.status, RequestStatus::Queued);
        queued.push(outcome.request_id);
    }
    assert_eq!(coordinator.queued_request_count(), 5);

    store.writes().open();
    let result = upgrade.await.unwrap();
    assert!(result.success);
    assert_eq!(result.queued_requests_processed, 5);

    for request_id in queued {
        let record = coordinator.request_status(request_id).unwrap();
        assert_eq!(record.status, RequestStatus::Completed);
        assert!(record.was_queued);
        assert_eq!(
            record.served_by.map(|m| m.to_string()).as_deref(),
            Some("anthropic/claude-4-sonnet")
        );
    }

    let stats = coordinator.stats();
    assert_eq!(stats.phase, UpgradePhase::Idle);
    assert_eq!(stats.queued_requests, 0);
    assert_eq!(stats.active_requests, 0);
}

#[tokio::test]
async fn test_critical_request_bypasses_queue() {
    let (coordinator, store) = setup(CoordinatorConfig::development());
    coordinator.researcher().sync_cache_with_db().await.unwrap();
    store.writes().close();

    let upgrade = spawn_upgrade(&coordinator, sonnet_upgrade());
    wait_for_phase(&coordinator, UpgradePhase::Swapping).await;

    let critical = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.handle_research_request(critical_request()).await })
    };
    wait_until("critical admission", || coordinator.active_request_count() == 1).await;

    let normal = coordinator.handle_research_request(normal_request()).await;
    assert_eq!(normal.status, RequestStatus::Queued);

    store.writes().open();
    let result = upgrade.await.unwrap();
    assert!(result.success);
    assert_eq!(result.queued_requests_processed, 1);

    let critical = critical.await.unwrap();
    assert_eq!(critical.status, RequestStatus::Completed);
    let record = coordinator.request_status(critical.request_id).unwrap();
    assert!(!record.was_queued);
    let served_by = record.served_by.map(|m| m.to_string()).unwrap_or_default();
    assert!(served_by == "google/gemini-2.5-flash" || served_by == "anthropic/claude-4-sonnet");

    assert_eq!(coordinator.active_request_count(), 0);
}

#[tokio::test]
async fn test_critical_bypass_respects_slot_limit() {
    let config = CoordinatorConfig::development().with_max_active_requests(1);
    let (coordinator, store) = setup(config);
    coordinator.researcher().sync_cache_with_db().await.unwrap();
    store.writes().close();

    let upgrade = spawn_upgrade(&coordinator, sonnet_upgrade());
    wait_for_phase(&coordinator, UpgradePhase::Swapping).await;

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.handle_research_request(critical_request()).await })
    };
    wait_until("first critical admission", || coordinator.active_request_count() == 1).await;

    let second = coordinator.handle_research_request(critical_request()).await;
    assert_eq!(second.status, RequestStatus::Queued);

    store.writes().open();
    assert_eq!(upgrade.await.unwrap().queued_requests_processed, 1);
    assert_eq!(first.await.unwrap().status, RequestStatus::Completed);
    assert_eq!(
        coordinator.request_status(second.request_id).map(|r| r.status),
        Some(RequestStatus::Completed)
    );
}

#[tokio::test]
async fn test_dispatch_while_upgrading_queues() {
    let (coordinator, store) = setup(CoordinatorConfig::development());
    store.writes().close();

    let upgrade = spawn_upgrade(&coordinator, sonnet_upgrade());
    wait_for_phase(&coordinator, UpgradePhase::Swapping).await;

    let outcome = coordinator.dispatch_research_request(normal_request());
    assert_eq!(outcome.status, RequestStatus::Queued);

    store.writes().open();
    assert_eq!(upgrade.await.unwrap().queued_requests_processed, 1);
}

// ============================================================================
// FAILURE AND CANCELLATION
// ============================================================================

#[tokio::test]
async fn test_failed_upgrade_replays_queue_on_old_model() {
    let (coordinator, store) = setup(CoordinatorConfig::development());
    coordinator.researcher().sync_cache_with_db().await.unwrap();
    let before = coordinator.researcher().get_cache_stats().await.unwrap();

    store.inner().set_fail_writes(true);
    store.writes().close();
    let upgrade = spawn_upgrade(
        &coordinator,
        UpgradeOperation::new("invalid", "invalid-model", "v0", "should fail"),
    );
    wait_for_phase(&coordinator, UpgradePhase::Swapping).await;

    let mut queued = Vec::new();
    for _ in 0..3 {
        queued.push(coordinator.handle_research_request(normal_request()).await.request_id);
    }

    store.writes().open();
    let result = upgrade.await.unwrap();
    assert!(!result.success);
    assert_eq!(result.queued_requests_processed, 0);

    for request_id in queued {
        let record = coordinator.request_status(request_id).unwrap();
        assert_eq!(record.status, RequestStatus::Completed);
        assert_eq!(
            record.served_by.map(|m| m.to_string()).as_deref(),
            Some("google/gemini-2.5-flash")
        );
    }

    let after = coordinator.researcher().get_cache_stats().await.unwrap();
    assert_eq!(after.db_config_id, before.db_config_id);
    assert_eq!(after.model, before.model);

    let stats = coordinator.stats();
    assert_eq!(stats.upgrades_failed, 1);
    assert_eq!(stats.phase, UpgradePhase::Idle);
    assert!(!stats.upgrade_in_progress);
}

#[tokio::test]
async fn test_upgrade_during_replay_waits_for_replayed_requests() {
    let config = CoordinatorConfig::development().with_drain_timeout(Duration::from_secs(10));
    let (coordinator, store) = setup(config);

    store.inner().set_fail_writes(true);
    store.writes().close();
    let failing = spawn_upgrade(
        &coordinator,
        UpgradeOperation::new("invalid", "invalid-model", "v0", "should fail"),
    );
    wait_for_phase(&coordinator, UpgradePhase::Swapping).await;

    let mut queued = Vec::new();
    for _ in 0..2 {
        let outcome = coordinator.handle_research_request(normal_request()).await;
        assert_eq!(outcome.status, RequestStatus::Queued);
        queued.push(outcome.request_id);
    }

    // Hold the replay inside its first store read.
    store.reads().close();
    store.writes().open();
    wait_until("failed upgrade to release the flag", || {
        !coordinator.is_upgrade_in_progress()
    })
    .await;
    assert_eq!(coordinator.active_request_count(), 2);

    store.inner().set_fail_writes(false);
    let next = spawn_upgrade(&coordinator, sonnet_upgrade());
    wait_for_phase(&coordinator, UpgradePhase::Draining).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(coordinator.phase(), UpgradePhase::Draining);

    store.reads().open();
    let failed = failing.await.unwrap();
    assert!(!failed.success);
    let upgraded = next.await.unwrap();
    assert!(upgraded.success);
    assert!(!upgraded.drain_timed_out);

    for request_id in queued {
        let record = coordinator.request_status(request_id).unwrap();
        assert_eq!(record.status, RequestStatus::Completed);
        assert_eq!(
            record.served_by.map(|m| m.to_string()).as_deref(),
            Some("google/gemini-2.5-flash")
        );
    }
    assert_eq!(coordinator.active_request_count(), 0);
    assert_eq!(
        coordinator.researcher().current_model().await.map(|m| m.to_string()).as_deref(),
        Some("anthropic/claude-4-sonnet")
    );
}

#[tokio::test]
async fn test_cancelled_replay_fails_remaining_requests() {
    let (coordinator, store) = setup(CoordinatorConfig::development());

    store.inner().set_fail_writes(true);
    store.writes().close();
    let upgrade = spawn_upgrade(
        &coordinator,
        UpgradeOperation::new("invalid", "invalid-model", "v0", "should fail"),
    );
    wait_for_phase(&coordinator, UpgradePhase::Swapping).await;

    let first = coordinator.handle_research_request(normal_request()).await.request_id;
    let second = coordinator.handle_research_request(normal_request()).await.request_id;

    store.reads().close();
    store.writes().open();
    wait_until("replay to start", || !coordinator.is_upgrade_in_progress()).await;

    upgrade.abort();
    assert!(upgrade.await.is_err());

    for request_id in [first, second] {
        assert_eq!(
            coordinator.request_status(request_id).map(|r| r.status),
            Some(RequestStatus::Failed)
        );
    }
    let stats = coordinator.stats();
    assert_eq!(stats.active_requests, 0);
    assert_eq!(stats.failed_requests, 2);
    assert_eq!(stats.upgrades_failed, 1);
    store.reads().open();
}

#[tokio::test]
async fn test_cancelled_upgrade_resets_coordinator() {
    let (coordinator, store) = setup(CoordinatorConfig::development());
    coordinator.researcher().sync_cache_with_db().await.unwrap();
    store.writes().close();

    let upgrade = spawn_upgrade(&coordinator, sonnet_upgrade());
    wait_for_phase(&coordinator, UpgradePhase::Swapping).await;
    let stranded = coordinator.handle_research_request(normal_request()).await;
    assert_eq!(stranded.status, RequestStatus::Queued);

    upgrade.abort();
    assert!(upgrade.await.is_err());

    let stats = coordinator.stats();
    assert!(!stats.upgrade_in_progress);
    assert_eq!(stats.phase, UpgradePhase::Idle);
    assert_eq!(stats.queued_requests, 0);
    assert_eq!(
        coordinator.request_status(stranded.request_id).map(|r| r.status),
        Some(RequestStatus::Failed)
    );

    // The interrupted swap left the cache inactive; the next request repairs it.
    store.writes().open();
    let outcome = coordinator.handle_research_request(normal_request()).await;
    assert_eq!(outcome.status, RequestStatus::Completed);
    assert_eq!(
        outcome.usage.map(|u| u.model.to_string()).as_deref(),
        Some("google/gemini-2.5-flash")
    );
}

// ============================================================================
// DRAINING
// ============================================================================

#[tokio::test]
async fn test_upgrade_waits_for_in_flight_request() {
    let config = CoordinatorConfig::development().with_drain_timeout(Duration::from_secs(5));
    let (coordinator, store) = setup(config);
    coordinator.researcher().sync_cache_with_db().await.unwrap();
    store.reads().close();

    let in_flight = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.handle_research_request(normal_request()).await })
    };
    wait_until("request in flight", || coordinator.active_request_count() == 1).await;

    let upgrade = spawn_upgrade(&coordinator, sonnet_upgrade());
    wait_for_phase(&coordinator, UpgradePhase::Draining).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(coordinator.phase(), UpgradePhase::Draining);

    store.reads().open();
    let served = in_flight.await.unwrap();
    assert_eq!(
        served.usage.map(|u| u.model.to_string()).as_deref(),
        Some("google/gemini-2.5-flash")
    );

    let result = upgrade.await.unwrap();
    assert!(result.success);
    assert!(!result.drain_timed_out);
}

#[tokio::test]
async fn test_drain_timeout_proceeds_with_upgrade() {
    let config = CoordinatorConfig::development().with_drain_timeout(Duration::from_millis(100));
    let (coordinator, store) = setup(config);
    coordinator.researcher().sync_cache_with_db().await.unwrap();
    store.reads().close();

    let stuck = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.handle_research_request(normal_request()).await })
    };
    wait_until("request in flight", || coordinator.active_request_count() == 1).await;

    let upgrade = spawn_upgrade(&coordinator, sonnet_upgrade());
    wait_for_phase(&coordinator, UpgradePhase::Swapping).await;

    store.reads().open();
    let result = upgrade.await.unwrap();
    assert!(result.success);
    assert!(result.drain_timed_out);

    assert_eq!(stuck.await.unwrap().status, RequestStatus::Completed);
    assert_eq!(coordinator.active_request_count(), 0);
}

// ============================================================================
// CONCURRENT TRAFFIC
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_twenty_concurrent_requests_without_upgrade() {
    let (coordinator, _store) = setup(CoordinatorConfig::default());

    let mut handles = Vec::new();
    for i in 0..20 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                coordinator.handle_research_request(normal_request()).await
            } else {
                coordinator.dispatch_research_request(normal_request())
            }
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(matches!(
            outcome.status,
            RequestStatus::Processing | RequestStatus::Completed
        ));
    }

    wait_until("all requests released", || {
        let stats = coordinator.stats();
        stats.active_requests == 0 && stats.completed_requests == 20
    })
    .await;
}
