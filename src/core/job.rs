//! Scheduled job definition.
//!
//! A [`ScheduledJob`] binds a [`Task`] to a schedule and the initial
//! contents of its [`JobDataMap`].

use std::fmt;
use std::sync::Arc;

use super::context::JobDataMap;
use super::retry::RetryPolicy;
use super::schedule::Schedule;
use super::task::Task;
use super::types::JobId;

/// A task plus everything the scheduler needs to run it.
#[derive(Clone)]
pub struct ScheduledJob {
    id: JobId,
    task: Arc<dyn Task>,
    schedule: Option<Schedule>,
    data: JobDataMap,
    retry_policy: RetryPolicy,
    enabled: bool,
}

impl ScheduledJob {
    /// Create an enabled, manual-only job with empty data.
    ///
    /// The retry policy defaults to the task's own.
    pub fn new(id: impl Into<JobId>, task: Arc<dyn Task>) -> Self {
        let retry_policy = task.retry_policy();
        Self {
            id: id.into(),
            task,
            schedule: None,
            data: JobDataMap::new(),
            retry_policy,
            enabled: true,
        }
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Set the initial job data.
    pub fn with_data(mut self, data: JobDataMap) -> Self {
        self.data = data;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    pub fn data(&self) -> &JobDataMap {
        &self.data
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the scheduler fires this job on its own.
    pub fn is_scheduled(&self) -> bool {
        self.enabled && self.schedule.is_some()
    }
}

impl fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("id", &self.id)
            .field("task", &self.task.name())
            .field("schedule", &self.schedule.as_ref().map(Schedule::expression))
            .field("data", &self.data)
            .field("retry_policy", &self.retry_policy)
            .field("enabled", &self.enabled)
            .finish()
    }
}
