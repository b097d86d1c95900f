//! Runtime objects from a scan configuration.
//!
//! Converts a validated [`ScanConfig`] into scheduled jobs, the listener
//! registry they resolve against, and the job data store.

use std::sync::Arc;
use std::time::Duration;

use crate::core::context::SchedulerContext;
use crate::core::job::ScheduledJob;
use crate::core::listener::FileScanListener;
use crate::core::retry::{RetryCondition, RetryPolicy};
use crate::core::schedule::Schedule;
use crate::jobs::{CommandListener, FileScanTask, LogListener, MINIMUM_UPDATE_AGE};
use crate::storage::{InMemoryJobDataStore, JobDataStore, JsonFileJobDataStore};

use super::error::ConfigError;
use super::types::{JobConfig, ListenerConfig, RetryConditionConfig, RetryConfig, ScanConfig};
use super::yaml::YamlLoader;

/// Builder for runtime objects from configuration.
pub struct ConfigBuilder;

impl ConfigBuilder {
    /// Build every configured job.
    pub fn build_jobs(config: &ScanConfig) -> Result<Vec<ScheduledJob>, ConfigError> {
        config.jobs.iter().map(Self::build_job).collect()
    }

    /// Build a single file scan job.
    pub fn build_job(config: &JobConfig) -> Result<ScheduledJob, ConfigError> {
        let mut data = FileScanTask::job_data(&config.file, &config.listener);
        if let Some(age) = config.minimum_update_age_ms {
            data.set(MINIMUM_UPDATE_AGE, age)
                .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        }

        let mut job = ScheduledJob::new(config.id.as_str(), Arc::new(FileScanTask::new()))
            .with_data(data)
            .with_enabled(config.enabled);

        if let Some(expression) = &config.schedule {
            let schedule = Schedule::new(expression.as_str()).map_err(|e| {
                ConfigError::InvalidConfig(format!("job '{}': {}", config.id, e))
            })?;
            job = job.with_schedule(schedule);
        }

        if let Some(retry) = &config.retry {
            job = job.with_retry_policy(Self::build_retry_policy(retry));
        }

        Ok(job)
    }

    /// Build the listener registry.
    pub fn build_context(config: &ScanConfig) -> SchedulerContext {
        let mut context = SchedulerContext::new();
        for (name, listener) in &config.listeners {
            context.register_listener(name.as_str(), Self::build_listener(name, listener));
        }
        context
    }

    /// Open the configured job data store.
    ///
    /// Uses the JSON state file when one is configured, memory otherwise.
    pub async fn build_store(config: &ScanConfig) -> Result<Arc<dyn JobDataStore>, ConfigError> {
        match &config.state_file {
            Some(path) => Ok(Arc::new(JsonFileJobDataStore::open(path).await?)),
            None => Ok(Arc::new(InMemoryJobDataStore::new())),
        }
    }

    /// Validate and build jobs and registry in one step.
    pub fn build(
        config: &ScanConfig,
    ) -> Result<(Vec<ScheduledJob>, SchedulerContext), ConfigError> {
        YamlLoader::validate(config)?;
        Ok((Self::build_jobs(config)?, Self::build_context(config)))
    }

    fn build_listener(name: &str, config: &ListenerConfig) -> Arc<dyn FileScanListener> {
        match config {
            ListenerConfig::Log => Arc::new(LogListener::new(name)),
            ListenerConfig::Command {
                command,
                args,
                env,
                working_dir,
                timeout_secs,
            } => {
                let mut builder = CommandListener::builder(command.as_str()).args(args.iter());
                for (key, value) in env {
                    builder = builder.env(key.as_str(), value.as_str());
                }
                if let Some(dir) = working_dir {
                    builder = builder.working_dir(dir.as_str());
                }
                if let Some(secs) = timeout_secs {
                    builder = builder.timeout(Duration::from_secs(*secs));
                }
                Arc::new(builder.build())
            }
        }
    }

    fn build_retry_policy(config: &RetryConfig) -> RetryPolicy {
        let condition = match config.condition {
            RetryConditionConfig::Always => RetryCondition::Always,
            RetryConditionConfig::TransientOnly => RetryCondition::TransientOnly,
            RetryConditionConfig::Never => RetryCondition::Never,
        };
        RetryPolicy::fixed(config.max_attempts, YamlLoader::retry_delay(config))
            .with_condition(condition)
    }
}
