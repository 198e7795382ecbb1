//! Error types for SCOUT operations

use crate::{ConfigId, JobId};
use thiserror::Error;

/// Configuration store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Config row not found: {id}")]
    NotFound { id: ConfigId },

    #[error("Write failed for {provider}/{model}: {reason}")]
    WriteFailed {
        provider: String,
        model: String,
        reason: String,
    },

    #[error("Read failed: {reason}")]
    ReadFailed { reason: String },

    #[error("Snapshot persistence failed: {reason}")]
    SnapshotFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Research collaborator and researcher errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResearchError {
    #[error("No model configuration stored for role {role}")]
    MissingConfiguration { role: String },

    #[error("Research provider {provider} failed: {message}")]
    ProviderFailed { provider: String, message: String },

    #[error("Meta research failed: {reason}")]
    MetaResearchFailed { reason: String },

    #[error("Invalid recommendation: {reason}")]
    InvalidRecommendation { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Unknown timezone: {timezone}")]
    UnknownTimezone { timezone: String },
}

/// Scheduler errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: JobId },

    #[error("Job {job_id} failed: {reason}")]
    JobFailed { job_id: JobId, reason: String },

    #[error("Timer task for {timer} could not be joined: {reason}")]
    TimerJoinFailed { timer: String, reason: String },

    #[error("Tracing subscriber already initialized: {reason}")]
    TelemetryInit { reason: String },
}

/// Master error type for all SCOUT errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScoutError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Research error: {0}")]
    Research(#[from] ResearchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Result type alias for SCOUT operations.
pub type ScoutResult<T> = Result<T, ScoutError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_store_error_display_write_failed() {
        let err = StoreError::WriteFailed {
            provider: "invalid".to_string(),
            model: "invalid-model".to_string(),
            reason: "constraint violation".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Write failed"));
        assert!(msg.contains("invalid/invalid-model"));
        assert!(msg.contains("constraint violation"));
    }

    #[test]
    fn test_research_error_display_missing_configuration() {
        let err = ResearchError::MissingConfiguration {
            role: "security".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("No model configuration"));
        assert!(msg.contains("security"));
    }

    #[test]
    fn test_config_error_display_invalid_cron() {
        let err = ConfigError::InvalidCron {
            expression: "0 * 1 */3 *".to_string(),
            reason: "hour field is not a single value".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("0 * 1 */3 *"));
        assert!(msg.contains("hour field"));
    }

    #[test]
    fn test_scheduler_error_display_job_not_found() {
        let err = SchedulerError::JobNotFound { job_id: Uuid::nil() };
        let msg = format!("{}", err);
        assert!(msg.contains("Job not found"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_scout_error_from_variants() {
        let store = ScoutError::from(StoreError::LockPoisoned);
        assert!(matches!(store, ScoutError::Store(_)));

        let research = ScoutError::from(ResearchError::MetaResearchFailed {
            reason: "timeout".to_string(),
        });
        assert!(matches!(research, ScoutError::Research(_)));

        let config = ScoutError::from(ConfigError::MissingRequired {
            field: "timezone".to_string(),
        });
        assert!(matches!(config, ScoutError::Config(_)));

        let scheduler = ScoutError::from(SchedulerError::JobNotFound {
            job_id: Uuid::nil(),
        });
        assert!(matches!(scheduler, ScoutError::Scheduler(_)));
    }
}
