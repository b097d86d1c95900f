//! YAML configuration parsing.
//!
//! Parses and validates a scan configuration file. Validation checks
//! everything that can be checked without touching the watched files, so a
//! configuration that passes here can always be built into jobs.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::core::schedule::Schedule;

use super::error::ConfigError;
use super::types::{JobConfig, ListenerConfig, RetryConfig, ScanConfig};

/// Loader for scan configuration files.
pub struct YamlLoader;

impl YamlLoader {
    /// Load and validate a configuration file.
    pub fn load_config(path: impl AsRef<Path>) -> Result<ScanConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ScanConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Parse and validate a configuration from a YAML string.
    pub fn parse_config(yaml: &str) -> Result<ScanConfig, ConfigError> {
        let config: ScanConfig = serde_yaml::from_str(yaml)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a parsed configuration.
    pub fn validate(config: &ScanConfig) -> Result<(), ConfigError> {
        if config.tick_interval_ms == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "tick_interval_ms cannot be zero".into(),
            ));
        }

        for (name, listener) in &config.listeners {
            Self::validate_listener(name, listener)?;
        }

        let mut job_ids = HashSet::new();
        for job in &config.jobs {
            Self::validate_job_config(config, job)?;
            if !job_ids.insert(job.id.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate job id: {}",
                    job.id
                )));
            }
        }

        Ok(())
    }

    fn validate_listener(name: &str, listener: &ListenerConfig) -> Result<(), ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "listener names cannot be empty".into(),
            ));
        }
        if let ListenerConfig::Command {
            command,
            timeout_secs,
            ..
        } = listener
        {
            if command.trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "listeners.{}.command",
                    name
                )));
            }
            if *timeout_secs == Some(0) {
                return Err(ConfigError::InvalidConfig(format!(
                    "listener '{}': timeout_secs cannot be zero",
                    name
                )));
            }
        }
        Ok(())
    }

    fn validate_job_config(config: &ScanConfig, job: &JobConfig) -> Result<(), ConfigError> {
        if job.id.trim().is_empty() {
            return Err(ConfigError::MissingField("id".into()));
        }
        if job.file.trim().is_empty() {
            return Err(ConfigError::MissingField(format!("jobs.{}.file", job.id)));
        }
        if job.listener.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "jobs.{}.listener",
                job.id
            )));
        }
        if !config.listeners.contains_key(&job.listener) {
            return Err(ConfigError::InvalidConfig(format!(
                "job '{}' refers to unknown listener '{}'",
                job.id, job.listener
            )));
        }
        if let Some(expression) = &job.schedule {
            Schedule::new(expression.as_str()).map_err(|e| {
                ConfigError::InvalidConfig(format!("job '{}': {}", job.id, e))
            })?;
        }
        if let Some(age) = job.minimum_update_age_ms {
            if i64::try_from(age).is_err() {
                return Err(ConfigError::InvalidConfig(format!(
                    "job '{}': minimum_update_age_ms is too large",
                    job.id
                )));
            }
        }
        Ok(())
    }

    /// Convert retry config delay to Duration.
    pub fn retry_delay(config: &RetryConfig) -> Duration {
        Duration::from_secs(config.delay_secs)
    }
}
