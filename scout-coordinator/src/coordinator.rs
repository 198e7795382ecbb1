//! Upgrade Coordinator
//!
//! Serializes configuration upgrades against consumer requests. While an
//! upgrade runs, in-flight requests are drained (bounded by a timeout), new
//! non-critical requests are queued, and the queue is served against the new
//! configuration once the swap commits.
//!
//! State transitions:
//!
//! ```text
//! Idle --upgrade--> Draining --drained/timeout--> Swapping
//! Swapping --ok--> DrainingQueue --queue empty--> Idle
//! Swapping --write failed--> Idle (queued requests replayed on the old config)
//! ```

use crate::phase::{CoordinatorStats, UpgradePhase};
use chrono::Utc;
use scout_core::{
    new_entity_id, CoordinatorConfig, ModelIdentity, RequestId, RequestOutcome, RequestRecord,
    RequestStatus, Timestamp, UpgradeOperation, UpgradeRequest, UpgradeResult,
};
use scout_research::Researcher;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Message returned to an `upgrade` call that lost the check-and-set.
pub const UPGRADE_IN_PROGRESS_MESSAGE: &str = "upgrade already in progress";

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug)]
struct PendingRequest {
    request_id: RequestId,
    request: UpgradeRequest,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    upgrade_in_progress: bool,
    phase: UpgradePhase,
    active_requests: usize,
    pending: VecDeque<PendingRequest>,
    history: VecDeque<RequestRecord>,
    completed_requests: u64,
    failed_requests: u64,
    upgrades_succeeded: u64,
    upgrades_failed: u64,
    upgrades_rejected: u64,
}

impl CoordinatorState {
    fn record(&mut self, record: RequestRecord, limit: usize) {
        if limit == 0 {
            return;
        }
        while self.history.len() >= limit {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    fn record_mut(&mut self, request_id: RequestId) -> Option<&mut RequestRecord> {
        self.history.iter_mut().rev().find(|r| r.request_id == request_id)
    }

    /// Reset to Idle and hand back whatever is still queued.
    fn finish_upgrade(&mut self) -> VecDeque<PendingRequest> {
        self.upgrade_in_progress = false;
        self.phase = UpgradePhase::Idle;
        std::mem::take(&mut self.pending)
    }

    /// Fail a queued request that will never be served.
    fn abandon(&mut self, request_id: RequestId, reason: &str) {
        self.failed_requests += 1;
        if let Some(record) = self.record_mut(request_id) {
            record.status = RequestStatus::Failed;
            record.completed_at = Some(Utc::now());
            record.error = Some(reason.to_string());
        }
    }
}

struct CoordinatorInner {
    researcher: Arc<Researcher>,
    config: CoordinatorConfig,
    state: Mutex<CoordinatorState>,
    /// Signalled when the active request count reaches zero.
    drained: Notify,
}

impl CoordinatorInner {
    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Coordinator state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Serve one request from the researcher and record its outcome.
    async fn process(&self, request_id: RequestId, request: &UpgradeRequest) -> RequestOutcome {
        match self.researcher.use_for_context(request).await {
            Ok(usage) => {
                self.complete(request_id, RequestStatus::Completed, Some(usage.model.clone()), None);
                RequestOutcome {
                    request_id,
                    status: RequestStatus::Completed,
                    usage: Some(usage),
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    language = %request.language,
                    error = %e,
                    "Research request failed"
                );
                let message = e.to_string();
                self.complete(request_id, RequestStatus::Failed, None, Some(message.clone()));
                RequestOutcome {
                    request_id,
                    status: RequestStatus::Failed,
                    usage: None,
                    error: Some(message),
                }
            }
        }
    }

    fn complete(
        &self,
        request_id: RequestId,
        status: RequestStatus,
        served_by: Option<ModelIdentity>,
        error: Option<String>,
    ) {
        let mut state = self.lock_state();
        match status {
            RequestStatus::Failed => state.failed_requests += 1,
            _ => state.completed_requests += 1,
        }
        if let Some(record) = state.record_mut(request_id) {
            record.status = status;
            record.completed_at = Some(Utc::now());
            record.served_by = served_by;
            record.error = error;
        }
    }
}

// ============================================================================
// GUARDS
// ============================================================================

/// One admitted request. Dropping it releases the request slot on every exit
/// path, including cancellation.
struct ActiveRequestGuard {
    inner: Arc<CoordinatorInner>,
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        let before = {
            let mut state = self.inner.lock_state();
            let before = state.active_requests;
            state.active_requests = before.saturating_sub(1);
            before
        };
        assert!(before > 0, "active request count decremented below zero");
        if before == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

const CANCELLED_BEFORE_RUN: &str = "upgrade cancelled before queued request ran";
const CANCELLED_WHILE_RUNNING: &str = "upgrade cancelled while queued request ran";

/// Resets the upgrade flag if an upgrade future is dropped mid-flight.
///
/// `in_flight` holds the queued request the DrainingQueue loop popped and is
/// serving, so a cancellation mid-request still settles its record.
struct UpgradeFlagGuard<'a> {
    inner: &'a CoordinatorInner,
    armed: bool,
    in_flight: Option<RequestId>,
}

impl<'a> UpgradeFlagGuard<'a> {
    fn new(inner: &'a CoordinatorInner) -> Self {
        Self {
            inner,
            armed: true,
            in_flight: None,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for UpgradeFlagGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.lock_state();
        let stranded = state.finish_upgrade();
        state.upgrades_failed += 1;
        if let Some(request_id) = self.in_flight.take() {
            state.abandon(request_id, CANCELLED_WHILE_RUNNING);
        }
        for pending in &stranded {
            state.abandon(pending.request_id, CANCELLED_BEFORE_RUN);
        }
        tracing::warn!(
            stranded_requests = stranded.len(),
            "Upgrade cancelled, coordinator reset to idle"
        );
    }
}

/// Queued requests replayed on the unchanged configuration after a failed
/// swap.
///
/// Every entry holds a request slot until it is served, so an upgrade that
/// starts during the replay drains them before swapping.
struct ReplayBatch {
    inner: Arc<CoordinatorInner>,
    remaining: VecDeque<(PendingRequest, ActiveRequestGuard)>,
    in_flight: Option<RequestId>,
}

impl ReplayBatch {
    /// Take slots for `pending`. Call with the state lock held, in the same
    /// critical section that cleared the upgrade flag.
    fn claim(
        inner: &Arc<CoordinatorInner>,
        state: &mut CoordinatorState,
        pending: VecDeque<PendingRequest>,
    ) -> Self {
        state.active_requests += pending.len();
        let remaining = pending
            .into_iter()
            .map(|p| {
                let slot = ActiveRequestGuard {
                    inner: Arc::clone(inner),
                };
                (p, slot)
            })
            .collect();
        Self {
            inner: Arc::clone(inner),
            remaining,
            in_flight: None,
        }
    }

    fn len(&self) -> usize {
        self.remaining.len()
    }

    async fn run(&mut self) {
        while let Some((pending, slot)) = self.remaining.pop_front() {
            self.in_flight = Some(pending.request_id);
            self.inner.process(pending.request_id, &pending.request).await;
            self.in_flight = None;
            drop(slot);
        }
    }
}

impl Drop for ReplayBatch {
    fn drop(&mut self) {
        if self.in_flight.is_none() && self.remaining.is_empty() {
            return;
        }
        let abandoned = {
            let mut state = self.inner.lock_state();
            let mut abandoned = 0;
            if let Some(request_id) = self.in_flight.take() {
                state.abandon(request_id, CANCELLED_WHILE_RUNNING);
                abandoned += 1;
            }
            for (pending, _) in &self.remaining {
                state.abandon(pending.request_id, CANCELLED_BEFORE_RUN);
                abandoned += 1;
            }
            abandoned
        };
        tracing::warn!(
            abandoned_requests = abandoned,
            "Replay cancelled after failed upgrade"
        );
    }
}

enum Admission {
    Admitted(ActiveRequestGuard),
    Queued,
}

// ============================================================================
// UPGRADE COORDINATOR
// ============================================================================

/// Coordinates upgrades with concurrent consumer requests.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct UpgradeCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl UpgradeCoordinator {
    pub fn new(researcher: Arc<Researcher>, config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                researcher,
                config,
                state: Mutex::new(CoordinatorState::default()),
                drained: Notify::new(),
            }),
        }
    }

    pub fn researcher(&self) -> &Arc<Researcher> {
        &self.inner.researcher
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    // ========================================================================
    // REQUESTS
    // ========================================================================

    /// Handle a consumer request.
    ///
    /// Returns `Completed` (or `Failed`) once served, or `Queued` immediately
    /// when an upgrade holds the request back. Always carries a request id.
    pub async fn handle_research_request(&self, request: UpgradeRequest) -> RequestOutcome {
        let request_id = new_entity_id();
        match self.admit(request_id, &request) {
            Admission::Queued => queued_outcome(request_id),
            Admission::Admitted(guard) => {
                let outcome = self.inner.process(request_id, &request).await;
                drop(guard);
                outcome
            }
        }
    }

    /// Admit a request and serve it on a spawned task.
    ///
    /// Returns `Processing` or `Queued` without waiting. Must be called from
    /// within a tokio runtime.
    pub fn dispatch_research_request(&self, request: UpgradeRequest) -> RequestOutcome {
        let request_id = new_entity_id();
        match self.admit(request_id, &request) {
            Admission::Queued => queued_outcome(request_id),
            Admission::Admitted(guard) => {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    let _guard = guard;
                    inner.process(request_id, &request).await;
                });
                RequestOutcome {
                    request_id,
                    status: RequestStatus::Processing,
                    usage: None,
                    error: None,
                }
            }
        }
    }

    /// Single admission check shared by every request path.
    fn admit(&self, request_id: RequestId, request: &UpgradeRequest) -> Admission {
        let limit = self.inner.config.request_history_limit;
        let mut state = self.inner.lock_state();

        // Critical requests skip the queue while an upgrade runs, as long as
        // request slots remain. This relaxes upgrade isolation: such a request
        // may be served by either the old or the new configuration.
        let admit = !state.upgrade_in_progress
            || (request.urgency.is_critical()
                && state.active_requests < self.inner.config.max_active_requests);

        let now = Utc::now();
        if admit {
            state.active_requests += 1;
            state.record(new_record(request_id, request, RequestStatus::Processing, now, false), limit);
            if state.upgrade_in_progress {
                tracing::debug!(
                    request_id = %request_id,
                    phase = %state.phase,
                    "Critical request bypassed the upgrade queue"
                );
            }
            return Admission::Admitted(ActiveRequestGuard {
                inner: Arc::clone(&self.inner),
            });
        }

        state.pending.push_back(PendingRequest {
            request_id,
            request: request.clone(),
        });
        state.record(new_record(request_id, request, RequestStatus::Queued, now, true), limit);
        tracing::debug!(
            request_id = %request_id,
            queue_depth = state.pending.len(),
            "Request queued behind upgrade"
        );
        Admission::Queued
    }

    // ========================================================================
    // UPGRADE
    // ========================================================================

    /// Run one upgrade: drain, swap, then serve the queue.
    ///
    /// A second call while an upgrade is running returns immediately with
    /// `success: false`. Never returns an error.
    pub async fn upgrade(&self, operation: UpgradeOperation) -> UpgradeResult {
        {
            let mut state = self.inner.lock_state();
            if state.upgrade_in_progress {
                state.upgrades_rejected += 1;
                tracing::warn!(
                    target_model = %operation.identity().versioned(),
                    phase = %state.phase,
                    "Upgrade rejected, another upgrade is in progress"
                );
                return UpgradeResult::failed(None, UPGRADE_IN_PROGRESS_MESSAGE, operation.started_at);
            }
            state.upgrade_in_progress = true;
            state.phase = UpgradePhase::Draining;
        }
        let mut flag = UpgradeFlagGuard::new(&self.inner);

        tracing::info!(
            target_model = %operation.identity().versioned(),
            reason = %operation.reason,
            "Upgrade started, draining active requests"
        );
        let drain_timed_out = self.wait_for_drain().await;

        self.set_phase(UpgradePhase::Swapping);
        let mut result = self.inner.researcher.upgrade(operation).await;
        result.drain_timed_out = drain_timed_out;

        if result.success {
            self.set_phase(UpgradePhase::DrainingQueue);
            let mut processed = 0;
            loop {
                // Requests queued while this loop runs are picked up too; the
                // flag drops in the same critical section that finds the
                // queue empty.
                let next = {
                    let mut state = self.inner.lock_state();
                    match state.pending.pop_front() {
                        Some(pending) => Some(pending),
                        None => {
                            state.finish_upgrade();
                            state.upgrades_succeeded += 1;
                            None
                        }
                    }
                };
                let Some(pending) = next else {
                    break;
                };
                flag.in_flight = Some(pending.request_id);
                self.inner.process(pending.request_id, &pending.request).await;
                flag.in_flight = None;
                processed += 1;
            }
            flag.disarm();
            result.queued_requests_processed = processed;

            tracing::info!(
                new_model = %result.new_model.as_ref().map(ModelIdentity::versioned).unwrap_or_default(),
                queued_requests_processed = processed,
                drain_timed_out,
                "Upgrade completed"
            );
        } else {
            let mut replay = {
                let mut state = self.inner.lock_state();
                state.upgrades_failed += 1;
                let pending = state.finish_upgrade();
                ReplayBatch::claim(&self.inner, &mut state, pending)
            };
            flag.disarm();

            tracing::warn!(
                message = %result.message.as_deref().unwrap_or_default(),
                replayed_requests = replay.len(),
                "Upgrade failed, replaying queued requests on the current configuration"
            );
            replay.run().await;
        }

        result
    }

    /// Wait until no request is active or the drain timeout passes.
    ///
    /// # Returns
    /// `true` if the timeout expired with requests still active.
    async fn wait_for_drain(&self) -> bool {
        let deadline = tokio::time::Instant::now() + self.inner.config.drain_timeout;
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and the
            // await still wakes us.
            notified.as_mut().enable();

            let active = self.inner.lock_state().active_requests;
            if active == 0 {
                return false;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                tracing::warn!(
                    active_requests = self.inner.lock_state().active_requests,
                    drain_timeout_ms = self.inner.config.drain_timeout.as_millis() as u64,
                    "Drain timeout expired, proceeding with upgrade"
                );
                return true;
            }
        }
    }

    fn set_phase(&self, phase: UpgradePhase) {
        self.inner.lock_state().phase = phase;
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    pub fn is_upgrade_in_progress(&self) -> bool {
        self.inner.lock_state().upgrade_in_progress
    }

    pub fn active_request_count(&self) -> usize {
        self.inner.lock_state().active_requests
    }

    pub fn queued_request_count(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    pub fn phase(&self) -> UpgradePhase {
        self.inner.lock_state().phase
    }

    /// Latest record for `request_id`, if still retained.
    pub fn request_status(&self, request_id: RequestId) -> Option<RequestRecord> {
        self.inner
            .lock_state()
            .history
            .iter()
            .rev()
            .find(|r| r.request_id == request_id)
            .cloned()
    }

    pub fn stats(&self) -> CoordinatorStats {
        let state = self.inner.lock_state();
        CoordinatorStats {
            active_requests: state.active_requests,
            queued_requests: state.pending.len(),
            upgrade_in_progress: state.upgrade_in_progress,
            phase: state.phase,
            completed_requests: state.completed_requests,
            failed_requests: state.failed_requests,
            upgrades_succeeded: state.upgrades_succeeded,
            upgrades_failed: state.upgrades_failed,
            upgrades_rejected: state.upgrades_rejected,
            retained_records: state.history.len(),
        }
    }
}

impl std::fmt::Debug for UpgradeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeCoordinator")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn new_record(
    request_id: RequestId,
    request: &UpgradeRequest,
    status: RequestStatus,
    submitted_at: Timestamp,
    was_queued: bool,
) -> RequestRecord {
    RequestRecord {
        request_id,
        status,
        urgency: request.urgency,
        submitted_at,
        completed_at: None,
        served_by: None,
        was_queued,
        error: None,
    }
}

fn queued_outcome(request_id: RequestId) -> RequestOutcome {
    RequestOutcome {
        request_id,
        status: RequestStatus::Queued,
        usage: None,
        error: None,
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
