//! SCOUT Scheduler - Research Scheduling
//!
//! Quarterly cron timers for context and meta research, operator and consumer
//! triggers, and a bounded table of research jobs. Also hosts the tracing
//! subscriber setup for processes that embed SCOUT.

pub mod cron;
pub mod jobs;
pub mod scheduler;
pub mod telemetry;

pub use cron::{offset_cron_hours, parse_cron, parse_timezone, CronSchedule};
pub use jobs::{NextRun, SchedulerStats};
pub use scheduler::Scheduler;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
