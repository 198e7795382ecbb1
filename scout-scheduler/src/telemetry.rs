//! Tracing Subscriber Initialization
//!
//! Installs a global `tracing` subscriber for processes embedding the
//! scheduler. Output is either human-readable or one JSON object per line.

use scout_core::{SchedulerError, ScoutResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive when neither `SCOUT_LOG` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" | "text" | "plain" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, e.g. `"scout_scheduler=debug,info"`
    pub filter: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            format: LogFormat::default(),
        }
    }
}

impl TelemetryConfig {
    /// Create TelemetryConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `SCOUT_LOG`: Filter directive (falls back to `RUST_LOG`, then "info")
    /// - `SCOUT_LOG_FORMAT`: "json" or "pretty" (default: pretty)
    pub fn from_env() -> Self {
        let filter = std::env::var("SCOUT_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
        let format = std::env::var("SCOUT_LOG_FORMAT")
            .ok()
            .and_then(|s| LogFormat::parse(&s))
            .unwrap_or_default();
        Self { filter, format }
    }

    /// Build the filter, falling back to the default on a bad directive.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|e| {
            eprintln!(
                "invalid log filter '{}': {}; using '{}'",
                self.filter, e, DEFAULT_LOG_FILTER
            );
            EnvFilter::new(DEFAULT_LOG_FILTER)
        })
    }
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup. A second call fails with
/// `SchedulerError::TelemetryInit` because a global subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> ScoutResult<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    let result = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.map_err(|e| SchedulerError::TelemetryInit {
        reason: e.to_string(),
    })?;

    tracing::info!(filter = %config.filter, format = ?config.format, "Telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::ScoutError;
    use std::sync::Mutex;

    // Tests in this module mutate process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_telemetry_config_defaults() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _log = EnvVarGuard::set("SCOUT_LOG", None);
        let _rust_log = EnvVarGuard::set("RUST_LOG", None);
        let _format = EnvVarGuard::set("SCOUT_LOG_FORMAT", None);

        let config = TelemetryConfig::from_env();
        assert_eq!(config, TelemetryConfig::default());
        assert_eq!(config.filter, "info");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_telemetry_config_from_env() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _log = EnvVarGuard::set("SCOUT_LOG", Some("scout_scheduler=debug"));
        let _format = EnvVarGuard::set("SCOUT_LOG_FORMAT", Some("JSON"));

        let config = TelemetryConfig::from_env();
        assert_eq!(config.filter, "scout_scheduler=debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_format_falls_back_to_pretty() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _format = EnvVarGuard::set("SCOUT_LOG_FORMAT", Some("xml"));
        assert_eq!(TelemetryConfig::from_env().format, LogFormat::Pretty);
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = TelemetryConfig {
            filter: "warn".to_string(),
            format: LogFormat::Json,
        };
        // The first call may race other tests; the second always fails.
        let _ = init_tracing(&config);
        let err = init_tracing(&config).unwrap_err();
        assert!(matches!(
            err,
            ScoutError::Scheduler(SchedulerError::TelemetryInit { .. })
        ));
    }
}
