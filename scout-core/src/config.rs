//! Configuration types

use crate::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// DEFAULTS
// ============================================================================

/// Default bound on waiting for active requests before swapping (30 seconds)
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

/// Default number of request slots critical requests may use during an upgrade
pub const DEFAULT_MAX_ACTIVE_REQUESTS: usize = 10;

/// Default number of request outcomes retained for inspection
pub const DEFAULT_REQUEST_HISTORY_LIMIT: usize = 1000;

/// Default quarterly cadence: 09:00 on the first day of every third month
pub const DEFAULT_QUARTERLY_CRON: &str = "0 9 1 */3 *";

/// Default timezone for cron evaluation
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Default limit on concurrently running research jobs
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;

/// Default offset between the context and meta research timers
pub const DEFAULT_META_OFFSET_HOURS: u32 = 1;

/// Default number of research jobs retained in the job table
pub const DEFAULT_JOB_HISTORY_LIMIT: usize = 500;

/// Default minimum confidence for acting on a meta research recommendation
pub const DEFAULT_MIN_UPGRADE_CONFIDENCE: f64 = 0.8;

/// Default number of meta research outcomes a researcher retains
pub const DEFAULT_META_HISTORY_LIMIT: usize = 100;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"))
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ScoutError {
    ScoutError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Configuration for the upgrade coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long an upgrade waits for in-flight requests before swapping anyway
    pub drain_timeout: Duration,
    /// Request slots; critical requests bypass the queue only below this count
    pub max_active_requests: usize,
    /// Number of request outcomes retained for `request_status`
    pub request_history_limit: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
            max_active_requests: DEFAULT_MAX_ACTIVE_REQUESTS,
            request_history_limit: DEFAULT_REQUEST_HISTORY_LIMIT,
        }
    }
}

impl CoordinatorConfig {
    /// Create CoordinatorConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `SCOUT_DRAIN_TIMEOUT_MS`: Drain wait bound in milliseconds (default: 30000)
    /// - `SCOUT_MAX_ACTIVE_REQUESTS`: Request slots for critical bypass (default: 10)
    /// - `SCOUT_REQUEST_HISTORY_LIMIT`: Retained request outcomes (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            drain_timeout: env_parse::<u64>("SCOUT_DRAIN_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.drain_timeout),
            max_active_requests: env_parse("SCOUT_MAX_ACTIVE_REQUESTS")
                .unwrap_or(defaults.max_active_requests),
            request_history_limit: env_parse("SCOUT_REQUEST_HISTORY_LIMIT")
                .unwrap_or(defaults.request_history_limit),
        }
    }

    /// Short timeouts for development and tests.
    pub fn development() -> Self {
        Self {
            drain_timeout: Duration::from_millis(500),
            max_active_requests: 4,
            request_history_limit: 100,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn with_max_active_requests(mut self, max: usize) -> Self {
        self.max_active_requests = max;
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - drain_timeout is positive
    /// - max_active_requests > 0
    /// - request_history_limit > 0
    pub fn validate(&self) -> ScoutResult<()> {
        if self.drain_timeout.is_zero() {
            return Err(invalid(
                "drain_timeout",
                format!("{:?}", self.drain_timeout),
                "drain_timeout must be positive",
            ));
        }
        if self.max_active_requests == 0 {
            return Err(invalid(
                "max_active_requests",
                self.max_active_requests,
                "max_active_requests must be greater than 0",
            ));
        }
        if self.request_history_limit == 0 {
            return Err(invalid(
                "request_history_limit",
                self.request_history_limit,
                "request_history_limit must be greater than 0",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Configuration for the research scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// When false, `start()` arms no timers
    pub enabled: bool,
    /// Five-field cron expression for the quarterly context cycle
    pub quarterly_cron_expression: String,
    /// Timezone the cron expression is evaluated in
    pub timezone: String,
    /// Upper bound on jobs in the running state at once
    pub max_concurrent_jobs: usize,
    /// Hours between the context timer and the meta research timer
    pub meta_offset_hours: u32,
    /// Capacity of the bounded job table
    pub job_history_limit: usize,
    /// Apply meta research recommendations through the coordinator
    pub auto_upgrade: bool,
    /// Minimum confidence before a recommendation is applied
    pub min_upgrade_confidence: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quarterly_cron_expression: DEFAULT_QUARTERLY_CRON.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            meta_offset_hours: DEFAULT_META_OFFSET_HOURS,
            job_history_limit: DEFAULT_JOB_HISTORY_LIMIT,
            auto_upgrade: false,
            min_upgrade_confidence: DEFAULT_MIN_UPGRADE_CONFIDENCE,
        }
    }
}

impl SchedulerConfig {
    /// Create SchedulerConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `SCOUT_SCHEDULER_ENABLED`: Arm timers on start (default: true)
    /// - `SCOUT_QUARTERLY_CRON`: Context cycle cron (default: "0 9 1 */3 *")
    /// - `SCOUT_TIMEZONE`: Cron timezone (default: "UTC")
    /// - `SCOUT_MAX_CONCURRENT_JOBS`: Running job limit (default: 3)
    /// - `SCOUT_META_OFFSET_HOURS`: Meta timer offset (default: 1)
    /// - `SCOUT_JOB_HISTORY_LIMIT`: Retained jobs (default: 500)
    /// - `SCOUT_AUTO_UPGRADE`: Apply recommendations (default: false)
    /// - `SCOUT_MIN_UPGRADE_CONFIDENCE`: Recommendation threshold (default: 0.8)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_flag("SCOUT_SCHEDULER_ENABLED").unwrap_or(defaults.enabled),
            quarterly_cron_expression: std::env::var("SCOUT_QUARTERLY_CRON")
                .unwrap_or(defaults.quarterly_cron_expression),
            timezone: std::env::var("SCOUT_TIMEZONE").unwrap_or(defaults.timezone),
            max_concurrent_jobs: env_parse("SCOUT_MAX_CONCURRENT_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs),
            meta_offset_hours: env_parse("SCOUT_META_OFFSET_HOURS")
                .unwrap_or(defaults.meta_offset_hours),
            job_history_limit: env_parse("SCOUT_JOB_HISTORY_LIMIT")
                .unwrap_or(defaults.job_history_limit),
            auto_upgrade: env_flag("SCOUT_AUTO_UPGRADE").unwrap_or(defaults.auto_upgrade),
            min_upgrade_confidence: env_parse("SCOUT_MIN_UPGRADE_CONFIDENCE")
                .unwrap_or(defaults.min_upgrade_confidence),
        }
    }

    /// Disabled timers and small limits for tests.
    pub fn development() -> Self {
        Self {
            enabled: false,
            max_concurrent_jobs: 2,
            job_history_limit: 50,
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - cron expression has five fields
    /// - timezone is non-empty
    /// - max_concurrent_jobs > 0 and job_history_limit > 0
    /// - meta_offset_hours in [0, 23]
    /// - min_upgrade_confidence in [0.0, 1.0]
    pub fn validate(&self) -> ScoutResult<()> {
        let fields = self.quarterly_cron_expression.split_whitespace().count();
        if fields != 5 {
            return Err(ScoutError::Config(ConfigError::InvalidCron {
                expression: self.quarterly_cron_expression.clone(),
                reason: format!("expected 5 fields, found {}", fields),
            }));
        }
        if self.timezone.trim().is_empty() {
            return Err(ScoutError::Config(ConfigError::MissingRequired {
                field: "timezone".to_string(),
            }));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(invalid(
                "max_concurrent_jobs",
                self.max_concurrent_jobs,
                "max_concurrent_jobs must be greater than 0",
            ));
        }
        if self.job_history_limit == 0 {
            return Err(invalid(
                "job_history_limit",
                self.job_history_limit,
                "job_history_limit must be greater than 0",
            ));
        }
        if self.meta_offset_hours > 23 {
            return Err(invalid(
                "meta_offset_hours",
                self.meta_offset_hours,
                "meta_offset_hours must be between 0 and 23",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_upgrade_confidence) {
            return Err(invalid(
                "min_upgrade_confidence",
                self.min_upgrade_confidence,
                "min_upgrade_confidence must be between 0.0 and 1.0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
