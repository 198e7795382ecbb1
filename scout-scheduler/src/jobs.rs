//! Bounded research job table.

use chrono::{DateTime, Utc};
use scout_core::{JobId, JobType, ResearchJob};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Lifetime job counters plus the current table size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Every job ever created, including ones evicted from the table
    pub total_jobs: u64,
    pub pending_jobs: u64,
    pub running_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    /// Jobs currently held in the table
    pub retained_jobs: usize,
    pub timers_armed: bool,
}

/// Next fire time of an armed timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextRun {
    pub job_type: JobType,
    pub at: DateTime<Utc>,
}

/// Most-recent-first ring of jobs. Counters survive eviction.
#[derive(Debug)]
pub(crate) struct JobTable {
    jobs: VecDeque<ResearchJob>,
    limit: usize,
    total: u64,
    started: u64,
    completed: u64,
    failed: u64,
}

impl JobTable {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            jobs: VecDeque::with_capacity(limit.min(1024)),
            limit: limit.max(1),
            total: 0,
            started: 0,
            completed: 0,
            failed: 0,
        }
    }

    pub(crate) fn insert(&mut self, job: ResearchJob) {
        self.total += 1;
        self.jobs.push_front(job);
        while self.jobs.len() > self.limit {
            if let Some(evicted) = self.jobs.pop_back() {
                tracing::debug!(job_id = %evicted.id, status = ?evicted.status, "Evicted job from table");
            }
        }
    }

    pub(crate) fn mark_running(&mut self, id: JobId) {
        self.started += 1;
        if let Some(job) = self.get_mut(id) {
            job.mark_running();
        }
    }

    pub(crate) fn mark_completed(&mut self, id: JobId, result: serde_json::Value) {
        self.completed += 1;
        if let Some(job) = self.get_mut(id) {
            job.mark_completed(result);
        }
    }

    pub(crate) fn mark_failed(&mut self, id: JobId, error: String) {
        self.failed += 1;
        if let Some(job) = self.get_mut(id) {
            job.mark_failed(error);
        }
    }

    pub(crate) fn get(&self, id: JobId) -> Option<&ResearchJob> {
        self.jobs.iter().find(|job| job.id == id)
    }

    fn get_mut(&mut self, id: JobId) -> Option<&mut ResearchJob> {
        self.jobs.iter_mut().find(|job| job.id == id)
    }

    pub(crate) fn recent(&self, limit: usize) -> Vec<ResearchJob> {
        self.jobs.iter().take(limit).cloned().collect()
    }

    pub(crate) fn stats(&self, timers_armed: bool) -> SchedulerStats {
        SchedulerStats {
            total_jobs: self.total,
            pending_jobs: self.total - self.started,
            running_jobs: self.started - self.completed - self.failed,
            completed_jobs: self.completed,
            failed_jobs: self.failed,
            retained_jobs: self.jobs.len(),
            timers_armed,
        }
    }

    #[cfg(test)]
    pub(crate) fn status_of(&self, id: JobId) -> Option<scout_core::JobStatus> {
        self.get(id).map(|job| job.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::{JobContext, JobStatus};

    fn job() -> ResearchJob {
        ResearchJob::new(JobType::ManualTrigger, JobContext::default())
    }

    #[test]
    fn test_lifecycle_counters() {
        let mut table = JobTable::new(10);
        let a = job();
        let b = job();
        let (a_id, b_id) = (a.id, b.id);
        table.insert(a);
        table.insert(b);

        let stats = table.stats(false);
        assert_eq!(stats.total_jobs, 2);
        assert_eq!(stats.pending_jobs, 2);

        table.mark_running(a_id);
        table.mark_running(b_id);
        table.mark_completed(a_id, serde_json::json!({"ok": true}));
        table.mark_failed(b_id, "provider down".to_string());

        let stats = table.stats(true);
        assert_eq!(stats.running_jobs, 0);
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.failed_jobs, 1);
        assert!(stats.timers_armed);
        assert_eq!(table.status_of(a_id), Some(JobStatus::Completed));
        assert_eq!(table.get(b_id).and_then(|j| j.error.clone()).as_deref(), Some("provider down"));
    }

    #[test]
    fn test_eviction_keeps_total() {
        let mut table = JobTable::new(3);
        let mut ids = Vec::new();
        for _ in 0..5 {
            let job = job();
            ids.push(job.id);
            table.insert(job);
        }
        let stats = table.stats(false);
        assert_eq!(stats.total_jobs, 5);
        assert_eq!(stats.retained_jobs, 3);
        assert!(table.get(ids[0]).is_none());
        assert!(table.get(ids[4]).is_some());
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut table = JobTable::new(10);
        let mut ids = Vec::new();
        for _ in 0..4 {
            let job = job();
            ids.push(job.id);
            table.insert(job);
        }
        let recent: Vec<JobId> = table.recent(2).into_iter().map(|j| j.id).collect();
        assert_eq!(recent, vec![ids[3], ids[2]]);
    }

    #[test]
    fn test_evicted_job_still_counts_completion() {
        let mut table = JobTable::new(1);
        let first = job();
        let first_id = first.id;
        table.insert(first);
        table.mark_running(first_id);
        table.insert(job());
        table.mark_completed(first_id, serde_json::Value::Null);

        let stats = table.stats(false);
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.pending_jobs, 1);
        assert_eq!(stats.running_jobs, 0);
    }
}
