//! Research job types

use crate::{JobId, SizeCategory, Timestamp, Urgency};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What triggered a research job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    QuarterlyContext,
    QuarterlyMeta,
    UnscheduledMissingConfig,
    ManualTrigger,
}

impl JobType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobType::QuarterlyContext => "QUARTERLY_CONTEXT",
            JobType::QuarterlyMeta => "QUARTERLY_META",
            JobType::UnscheduledMissingConfig => "UNSCHEDULED_MISSING_CONFIG",
            JobType::ManualTrigger => "MANUAL_TRIGGER",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Lifecycle: `Pending -> Running -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Kind of research an operator can trigger manually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualResearchKind {
    Context,
    Meta,
}

/// What a job was asked to look at.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobContext {
    pub language: Option<String>,
    pub size_category: Option<SizeCategory>,
    pub role: Option<String>,
    pub urgency: Urgency,
    pub reason: Option<String>,
}

/// A tracked unit of scheduled or triggered research work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchJob {
    pub id: JobId,
    pub job_type: JobType,
    pub context: JobContext,
    pub status: JobStatus,
    pub scheduled_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    /// Job-specific result payload.
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ResearchJob {
    /// Create a pending job scheduled now.
    pub fn new(job_type: JobType, context: JobContext) -> Self {
        Self {
            id: crate::new_entity_id(),
            job_type,
            context,
            status: JobStatus::Pending,
            scheduled_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: serde_json::Value) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}
