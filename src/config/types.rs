//! Configuration type definitions.
//!
//! The structures of a scan configuration file: global settings, named
//! listeners and the file scan jobs that notify them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// A complete scan configuration (`fscan.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// How often the scheduler checks for due jobs, in milliseconds.
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,
    /// How long shutdown waits for running invocations, in seconds.
    #[serde(default)]
    pub shutdown_timeout_secs: Option<u64>,
    /// Where job data is persisted. In memory when absent.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    /// Listeners by name.
    #[serde(default)]
    pub listeners: BTreeMap<String, ListenerConfig>,
    /// File scan jobs.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ListenerConfig {
    /// Log each update.
    Log,
    /// Run a command with the updated path appended.
    Command {
        /// The program to run.
        command: String,
        /// Arguments placed before the path.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables.
        #[serde(default)]
        env: HashMap<String, String>,
        /// Working directory.
        working_dir: Option<String>,
        /// Kill the command after this many seconds.
        timeout_secs: Option<u64>,
    },
}

impl ListenerConfig {
    /// Short name of the listener kind, as written in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ListenerConfig::Log => "log",
            ListenerConfig::Command { .. } => "command",
        }
    }
}

/// A single file scan job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job identifier.
    pub id: String,
    /// File or directory to watch.
    pub file: String,
    /// Name of the listener to notify.
    pub listener: String,
    /// Cron expression, shortcut or `@every <duration>`. Manual-only when absent.
    pub schedule: Option<String>,
    /// Defer notifications until the change is at least this old.
    pub minimum_update_age_ms: Option<u64>,
    /// Retry policy for failed scans.
    pub retry: Option<RetryConfig>,
    /// Whether the job is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_attempts: u32,
    /// Delay between attempts in seconds.
    #[serde(default)]
    pub delay_secs: u64,
    /// Which failures are retried.
    #[serde(default)]
    pub condition: RetryConditionConfig,
}

/// Retry condition configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryConditionConfig {
    /// Retry any refirable failure.
    #[default]
    Always,
    /// Retry only transient I/O failures.
    TransientOnly,
    /// Never retry.
    Never,
}
