//! Research Scheduler
//!
//! Runs research on a quarterly cadence and on demand. Two cron timers drive
//! the periodic work: the context timer sweeps model configurations, the meta
//! timer re-evaluates the active model an offset number of hours later.
//! Operators and consumers can also trigger jobs directly.
//!
//! Every unit of work is a [`ResearchJob`] tracked in a bounded table.
//! Failures are recorded on the job and logged; they never escape a timer.

use crate::cron::{offset_cron_hours, parse_timezone, CronSchedule};
use crate::jobs::{JobTable, NextRun, SchedulerStats};
use chrono::{DateTime, Utc};
use scout_coordinator::UpgradeCoordinator;
use scout_core::{
    JobContext, JobId, JobType, ManualResearchKind, MetaResearchReport, RequestStatus,
    ResearchContext, ResearchJob, SchedulerConfig, SchedulerError, ScoutError, ScoutResult,
    SizeCategory, UpgradeRequest, UpgradeResult, Urgency,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

// ============================================================================
// TIMERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Context,
    Meta,
}

impl Timer {
    fn job_type(&self) -> JobType {
        match self {
            Timer::Context => JobType::QuarterlyContext,
            Timer::Meta => JobType::QuarterlyMeta,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Timer::Context => "quarterly-context",
            Timer::Meta => "quarterly-meta",
        }
    }
}

#[derive(Debug, Default)]
struct TimerSet {
    shutdown: Option<watch::Sender<bool>>,
    handles: Vec<(Timer, JoinHandle<()>)>,
}

/// Work a job performs once it holds a permit.
#[derive(Debug)]
enum JobAction {
    Context(ResearchContext),
    Meta,
    Unscheduled(UpgradeRequest),
}

/// Result payload of a meta research job.
#[derive(Debug, Serialize)]
struct MetaJobResult {
    report: MetaResearchReport,
    upgrade: Option<UpgradeResult>,
}

// ============================================================================
// SCHEDULER
// ============================================================================

struct SchedulerInner {
    coordinator: UpgradeCoordinator,
    config: SchedulerConfig,
    context_schedule: CronSchedule,
    meta_schedule: CronSchedule,
    jobs: Mutex<JobTable>,
    permits: Semaphore,
    timers: tokio::sync::Mutex<TimerSet>,
    armed: AtomicBool,
    next_runs: Mutex<HashMap<JobType, DateTime<Utc>>>,
}

/// Quarterly and on-demand research scheduler.
///
/// Cheap to clone; clones share the job table and timers. Timer tasks hold a
/// reference to the scheduler, so call [`Scheduler::stop`] before dropping
/// the last handle.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler that submits work through `coordinator`.
    ///
    /// # Arguments
    /// * `coordinator` - Shared coordinator; its researcher runs research jobs
    /// * `config` - Cron cadence, timezone and job limits
    ///
    /// # Returns
    /// * `Ok(Scheduler)` - Timers not yet armed
    /// * `Err(ScoutError::Config)` - Invalid config, cron or timezone
    pub fn new(coordinator: UpgradeCoordinator, config: SchedulerConfig) -> ScoutResult<Self> {
        config.validate()?;
        let timezone = parse_timezone(&config.timezone)?;
        let meta_expression =
            offset_cron_hours(&config.quarterly_cron_expression, config.meta_offset_hours)?;
        let context_schedule = CronSchedule::new(&config.quarterly_cron_expression, timezone)?;
        let meta_schedule = CronSchedule::new(&meta_expression, timezone)?;

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                coordinator,
                jobs: Mutex::new(JobTable::new(config.job_history_limit)),
                permits: Semaphore::new(config.max_concurrent_jobs),
                config,
                context_schedule,
                meta_schedule,
                timers: tokio::sync::Mutex::new(TimerSet::default()),
                armed: AtomicBool::new(false),
                next_runs: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn coordinator(&self) -> &UpgradeCoordinator {
        &self.inner.coordinator
    }

    pub fn context_cron(&self) -> &str {
        self.inner.context_schedule.expression()
    }

    /// Context cron shifted by `meta_offset_hours`.
    pub fn meta_cron(&self) -> &str {
        self.inner.meta_schedule.expression()
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Arm the context and meta timers.
    ///
    /// Does nothing when the scheduler is disabled or already started.
    pub async fn start(&self) -> ScoutResult<()> {
        if !self.inner.config.enabled {
            tracing::info!("Scheduler disabled, no timers armed");
            return Ok(());
        }

        let mut timers = self.inner.timers.lock().await;
        if timers.shutdown.is_some() {
            tracing::debug!("Scheduler already started");
            return Ok(());
        }

        let now = Utc::now();
        for timer in [Timer::Context, Timer::Meta] {
            let next = self.inner.schedule(timer).next_after(now)?;
            self.inner.set_next_run(timer, next);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        for timer in [Timer::Context, Timer::Meta] {
            let inner = Arc::clone(&self.inner);
            let handle = tokio::spawn(run_timer(inner, timer, shutdown_rx.clone()));
            timers.handles.push((timer, handle));
        }
        timers.shutdown = Some(shutdown_tx);
        self.inner.armed.store(true, Ordering::SeqCst);

        tracing::info!(
            context_cron = self.context_cron(),
            meta_cron = self.meta_cron(),
            timezone = %self.inner.config.timezone,
            max_concurrent_jobs = self.inner.config.max_concurrent_jobs,
            "Scheduler started"
        );
        Ok(())
    }

    /// Disarm both timers and wait for their tasks to exit.
    ///
    /// No timer fires after this returns. Jobs already spawned keep running.
    pub async fn stop(&self) -> ScoutResult<()> {
        let mut timers = self.inner.timers.lock().await;
        let Some(shutdown_tx) = timers.shutdown.take() else {
            return Ok(());
        };
        let _ = shutdown_tx.send(true);

        let mut join_error = None;
        for (timer, handle) in std::mem::take(&mut timers.handles) {
            if let Err(e) = handle.await {
                tracing::error!(timer = timer.name(), error = %e, "Timer task did not exit cleanly");
                join_error.get_or_insert(SchedulerError::TimerJoinFailed {
                    timer: timer.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }

        self.inner.armed.store(false, Ordering::SeqCst);
        self.inner.lock_next_runs().clear();
        tracing::info!("Scheduler stopped");

        match join_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.armed.load(Ordering::SeqCst)
    }

    // ========================================================================
    // TRIGGERS
    // ========================================================================

    /// Research a context with no stored configuration.
    ///
    /// The job routes a request through the coordinator, so it queues behind
    /// a running upgrade like any consumer request. Returns immediately; must
    /// be called from within a tokio runtime.
    pub fn trigger_unscheduled_research(
        &self,
        language: &str,
        size_category: SizeCategory,
        role: &str,
        reason: Option<String>,
        urgency: Option<Urgency>,
    ) -> JobId {
        let urgency = urgency.unwrap_or_default();
        let request = UpgradeRequest::new(language, size_category, role).with_urgency(urgency);
        let context = JobContext {
            language: Some(language.to_string()),
            size_category: Some(size_category),
            role: Some(role.to_string()),
            urgency,
            reason,
        };
        self.inner.spawn_job(
            JobType::UnscheduledMissingConfig,
            context,
            JobAction::Unscheduled(request),
        )
    }

    /// Run context or meta research now, outside the quarterly cadence.
    ///
    /// Returns immediately; must be called from within a tokio runtime.
    pub fn trigger_manual_research(&self, kind: ManualResearchKind, reason: &str) -> JobId {
        let context = JobContext {
            reason: Some(reason.to_string()),
            ..JobContext::default()
        };
        let action = match kind {
            ManualResearchKind::Context => JobAction::Context(ResearchContext::sweep(reason)),
            ManualResearchKind::Meta => JobAction::Meta,
        };
        self.inner.spawn_job(JobType::ManualTrigger, context, action)
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    /// Job by id, if still retained.
    pub fn get_job_status(&self, job_id: JobId) -> Option<ResearchJob> {
        self.inner.lock_jobs().get(job_id).cloned()
    }

    /// Up to `limit` jobs, most recent first.
    pub fn get_recent_jobs(&self, limit: usize) -> Vec<ResearchJob> {
        self.inner.lock_jobs().recent(limit)
    }

    pub fn get_stats(&self) -> SchedulerStats {
        let armed = self.is_running();
        self.inner.lock_jobs().stats(armed)
    }

    /// Next fire time of each armed timer, earliest first.
    pub fn next_runs(&self) -> Vec<NextRun> {
        let mut runs: Vec<NextRun> = self
            .inner
            .lock_next_runs()
            .iter()
            .map(|(job_type, at)| NextRun {
                job_type: *job_type,
                at: *at,
            })
            .collect();
        runs.sort_by_key(|run| run.at);
        runs
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("context_cron", &self.context_cron())
            .field("meta_cron", &self.meta_cron())
            .field("timezone", &self.inner.config.timezone)
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================================================
// JOB EXECUTION
// ============================================================================

impl SchedulerInner {
    fn schedule(&self, timer: Timer) -> &CronSchedule {
        match timer {
            Timer::Context => &self.context_schedule,
            Timer::Meta => &self.meta_schedule,
        }
    }

    fn lock_jobs(&self) -> MutexGuard<'_, JobTable> {
        match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Job table lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lock_next_runs(&self) -> MutexGuard<'_, HashMap<JobType, DateTime<Utc>>> {
        match self.next_runs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Next-run lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn set_next_run(&self, timer: Timer, at: DateTime<Utc>) {
        self.lock_next_runs().insert(timer.job_type(), at);
    }

    /// Record a pending job and run it on a spawned task.
    fn spawn_job(self: &Arc<Self>, job_type: JobType, context: JobContext, action: JobAction) -> JobId {
        let job = ResearchJob::new(job_type, context);
        let job_id = job.id;
        self.lock_jobs().insert(job);
        tracing::info!(job_id = %job_id, job_type = %job_type, "Research job created");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_job(job_id, job_type, action).await;
        });
        job_id
    }

    async fn run_job(&self, job_id: JobId, job_type: JobType, action: JobAction) {
        // Jobs over the concurrency limit stay pending here.
        let permit = self.permits.acquire().await;
        self.lock_jobs().mark_running(job_id);

        let result = match permit {
            Ok(_permit) => self.execute(job_id, action).await,
            Err(e) => Err(SchedulerError::JobFailed {
                job_id,
                reason: e.to_string(),
            }
            .into()),
        };

        match result {
            Ok(value) => {
                self.lock_jobs().mark_completed(job_id, value);
                tracing::info!(job_id = %job_id, job_type = %job_type, "Research job completed");
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    job_type = %job_type,
                    error = %e,
                    "Research job failed"
                );
                self.lock_jobs().mark_failed(job_id, e.to_string());
            }
        }
    }

    async fn execute(&self, job_id: JobId, action: JobAction) -> ScoutResult<serde_json::Value> {
        match action {
            JobAction::Context(context) => {
                let outcome = self
                    .coordinator
                    .researcher()
                    .conduct_research_and_update(&context)
                    .await?;
                to_result_value(job_id, &outcome)
            }
            JobAction::Meta => {
                let result = self.meta_research().await?;
                to_result_value(job_id, &result)
            }
            JobAction::Unscheduled(request) => {
                let outcome = self.coordinator.handle_research_request(request).await;
                if outcome.status == RequestStatus::Failed {
                    return Err(SchedulerError::JobFailed {
                        job_id,
                        reason: outcome
                            .error
                            .unwrap_or_else(|| "request failed".to_string()),
                    }
                    .into());
                }
                to_result_value(job_id, &outcome)
            }
        }
    }

    /// Meta research, then an upgrade when the recommendation clears the bar.
    async fn meta_research(&self) -> ScoutResult<MetaJobResult> {
        let report = self.coordinator.researcher().conduct_meta_research().await?;

        let recommendation = match &report.upgrade_recommendation {
            Some(rec) if self.config.auto_upgrade => rec,
            _ => {
                return Ok(MetaJobResult {
                    report,
                    upgrade: None,
                })
            }
        };

        if report.confidence < self.config.min_upgrade_confidence {
            tracing::info!(
                recommended = %format!("{}/{}", recommendation.provider, recommendation.model),
                confidence = report.confidence,
                threshold = self.config.min_upgrade_confidence,
                "Recommendation below confidence threshold, not upgrading"
            );
            return Ok(MetaJobResult {
                report,
                upgrade: None,
            });
        }

        let operation = recommendation.to_operation();
        tracing::info!(
            to = %operation.identity(),
            confidence = report.confidence,
            "Applying meta research recommendation"
        );
        let result = self.coordinator.upgrade(operation).await;
        if !result.success {
            tracing::warn!(
                message = result.message.as_deref().unwrap_or(""),
                "Recommended upgrade was not applied"
            );
        }

        Ok(MetaJobResult {
            report,
            upgrade: Some(result),
        })
    }
}

fn to_result_value<T: Serialize>(job_id: JobId, value: &T) -> ScoutResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| {
        ScoutError::from(SchedulerError::JobFailed {
            job_id,
            reason: format!("result not serializable: {}", e),
        })
    })
}

/// Fire `timer` on its cron schedule until shutdown.
///
/// Each next occurrence is computed from the later of the wall clock and the
/// previous fire time, so a timer never fires twice for one occurrence.
async fn run_timer(inner: Arc<SchedulerInner>, timer: Timer, mut shutdown_rx: watch::Receiver<bool>) {
    tracing::debug!(timer = timer.name(), "Timer task started");
    let mut last_fire: Option<DateTime<Utc>> = None;

    loop {
        let now = Utc::now();
        let from = match last_fire {
            Some(fired) if fired > now => fired,
            _ => now,
        };
        let next = match inner.schedule(timer).next_after(from) {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(timer = timer.name(), error = %e, "No next occurrence, timer exiting");
                break;
            }
        };
        inner.set_next_run(timer, next);
        let wait = (next - from).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = tokio::time::sleep(wait) => {
                last_fire = Some(next);
                tracing::info!(timer = timer.name(), scheduled_for = %next, "Timer fired");
                let (context, action) = match timer {
                    Timer::Context => {
                        let reason = "quarterly context research";
                        (
                            JobContext {
                                reason: Some(reason.to_string()),
                                ..JobContext::default()
                            },
                            JobAction::Context(ResearchContext::sweep(reason)),
                        )
                    }
                    Timer::Meta => (
                        JobContext {
                            reason: Some("quarterly meta research".to_string()),
                            ..JobContext::default()
                        },
                        JobAction::Meta,
                    ),
                };
                inner.spawn_job(timer.job_type(), context, action);
            }
        }
    }

    tracing::debug!(timer = timer.name(), "Timer task exited");
}
