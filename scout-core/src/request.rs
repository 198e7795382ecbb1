//! Consumer request types

use crate::{ModelIdentity, RequestId, SessionId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Urgency of a consumer request.
///
/// Critical requests may bypass the pending queue while an upgrade is in
/// progress; normal requests never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Normal,
    Critical,
}

impl Urgency {
    pub fn is_critical(&self) -> bool {
        matches!(self, Urgency::Critical)
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Normal => write!(f, "normal"),
            Urgency::Critical => write!(f, "critical"),
        }
    }
}

/// Repository size category of the analysis a consumer needs a model for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    Small,
    #[default]
    Medium,
    Large,
    Enterprise,
}

impl SizeCategory {
    /// Multiplier applied to the template token estimate.
    pub fn token_multiplier(&self) -> f64 {
        match self {
            SizeCategory::Small => 1.0,
            SizeCategory::Medium => 1.5,
            SizeCategory::Large => 2.0,
            SizeCategory::Enterprise => 3.0,
        }
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SizeCategory::Small => "small",
            SizeCategory::Medium => "medium",
            SizeCategory::Large => "large",
            SizeCategory::Enterprise => "enterprise",
        };
        write!(f, "{}", s)
    }
}

/// A consumer asking for a model configuration for a given context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeRequest {
    pub language: String,
    pub size_category: SizeCategory,
    pub role: String,
    pub frameworks: Vec<String>,
    pub complexity_score: f64,
    pub urgency: Urgency,
}

impl UpgradeRequest {
    /// Build a normal-urgency request with no frameworks and neutral complexity.
    pub fn new(language: impl Into<String>, size_category: SizeCategory, role: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            size_category,
            role: role.into(),
            frameworks: Vec::new(),
            complexity_score: 5.0,
            urgency: Urgency::Normal,
        }
    }

    pub fn with_frameworks(mut self, frameworks: Vec<String>) -> Self {
        self.frameworks = frameworks;
        self
    }

    pub fn with_complexity(mut self, complexity_score: f64) -> Self {
        self.complexity_score = complexity_score;
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }
}

/// Token accounting returned by a cache read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextUsage {
    pub prompt_tokens_estimate: u64,
    pub tokens_used: u64,
    /// True when the same cache session already served a prior request.
    pub template_reused: bool,
    /// Configuration that served this request.
    pub model: ModelIdentity,
    pub session_id: SessionId,
}

/// Status reported to callers of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Processed to completion before the call returned.
    Completed,
    /// Admitted and running in the background.
    Processing,
    /// Deferred until the in-progress upgrade finishes.
    Queued,
    /// The underlying cache read failed.
    Failed,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Completed => "completed",
            RequestStatus::Processing => "processing",
            RequestStatus::Queued => "queued",
            RequestStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// What `handle_research_request` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub usage: Option<ContextUsage>,
    pub error: Option<String>,
}

/// Recorded outcome of a request, kept in the coordinator's bounded history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub urgency: Urgency,
    pub submitted_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub served_by: Option<ModelIdentity>,
    /// True when the request waited in the queue during an upgrade.
    pub was_queued: bool,
    pub error: Option<String>,
}
