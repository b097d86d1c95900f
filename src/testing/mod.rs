//! Testing utilities for users of the filescan library.
//!
//! This module provides helpers for testing file scan jobs and custom tasks:
//!
//! - [`RecordingListener`]: A listener that records every path it is told about
//! - [`MockJobContext`]: Builds execution contexts without a running scheduler
//! - [`FailingTask`]: A task helper that fails N times then succeeds

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::core::context::{JobDataMap, JobExecutionContext, SchedulerContext};
use crate::core::listener::FileScanListener;
use crate::core::retry::RetryPolicy;
use crate::core::task::{Task, TaskError};
use crate::core::types::JobId;
use crate::jobs::{FILE_NAME, FILE_SCAN_LISTENER_NAME};

/// A listener that records the paths it receives.
///
/// # Example
///
/// ```
/// use filescan::FileScanListener;
/// use filescan::testing::RecordingListener;
///
/// let listener = RecordingListener::new();
/// listener.file_updated("/etc/hosts");
///
/// assert_eq!(listener.calls(), vec!["/etc/hosts".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct RecordingListener {
    calls: Mutex<Vec<String>>,
}

impl RecordingListener {
    /// Create a shared recording listener.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Paths received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Number of notifications received.
    pub fn count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    /// Forget all recorded calls.
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

impl FileScanListener for RecordingListener {
    fn file_updated(&self, path: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(path.to_string());
        }
    }
}

/// Builder for [`JobExecutionContext`]s in tests.
///
/// # Example
///
/// ```
/// use filescan::testing::{MockJobContext, RecordingListener};
///
/// let listener = RecordingListener::new();
/// let ctx = MockJobContext::new("hosts")
///     .watch("/etc/hosts", "recorder")
///     .listener("recorder", listener)
///     .build();
///
/// assert_eq!(ctx.job_id().as_str(), "hosts");
/// assert!(ctx.scheduler_context().unwrap().contains("recorder"));
/// ```
pub struct MockJobContext {
    job_id: JobId,
    data: JobDataMap,
    scheduler_context: Option<SchedulerContext>,
}

impl MockJobContext {
    /// Start with empty data and an empty registry.
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            data: JobDataMap::new(),
            scheduler_context: Some(SchedulerContext::new()),
        }
    }

    /// Set `FILE_NAME` and `FILE_SCAN_LISTENER_NAME`.
    pub fn watch(self, file: impl Into<String>, listener_name: impl Into<String>) -> Self {
        self.value(FILE_NAME, Value::String(file.into()))
            .value(FILE_SCAN_LISTENER_NAME, Value::String(listener_name.into()))
    }

    /// Set an arbitrary job data entry.
    pub fn value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert_value(key, value);
        self
    }

    /// Register a listener in the scheduler context.
    pub fn listener(
        mut self,
        name: impl Into<String>,
        listener: Arc<dyn FileScanListener>,
    ) -> Self {
        if let Some(context) = self.scheduler_context.as_mut() {
            context.register_listener(name, listener);
        }
        self
    }

    /// Register a plain value in the scheduler context.
    pub fn context_value(mut self, name: impl Into<String>, value: Value) -> Self {
        if let Some(context) = self.scheduler_context.as_mut() {
            context.insert_value(name, value);
        }
        self
    }

    /// Build a context whose scheduler context cannot be retrieved.
    pub fn without_scheduler_context(mut self) -> Self {
        self.scheduler_context = None;
        self
    }

    pub fn build(self) -> JobExecutionContext {
        match self.scheduler_context {
            Some(context) => JobExecutionContext::new(self.job_id, self.data, Arc::new(context)),
            None => JobExecutionContext::without_scheduler_context(self.job_id, self.data),
        }
    }
}

/// A task that fails a specified number of times before succeeding.
///
/// Useful for testing retry behavior. Each successful run increments the
/// `runs` entry of the job data.
///
/// # Example
///
/// ```
/// use filescan::testing::FailingTask;
///
/// // Fails 2 times, then succeeds on the 3rd attempt
/// let task = FailingTask::new("flaky_task", 2);
/// ```
pub struct FailingTask {
    name: String,
    state: Mutex<FailingTaskState>,
    error_message: String,
    retry_policy: RetryPolicy,
}

struct FailingTaskState {
    failures_remaining: u32,
    call_count: u32,
}

impl FailingTask {
    /// Create a task that fails `fail_count` times then succeeds.
    pub fn new(name: impl Into<String>, fail_count: u32) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(FailingTaskState {
                failures_remaining: fail_count,
                call_count: 0,
            }),
            error_message: "intentional test failure".to_string(),
            retry_policy: RetryPolicy::none(),
        }
    }

    /// Set a custom error message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// Set a retry policy for this task.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Get the number of times this task has been called.
    pub fn call_count(&self) -> u32 {
        self.state.lock().map(|s| s.call_count).unwrap_or(0)
    }
}

#[async_trait]
impl Task for FailingTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut JobExecutionContext) -> Result<(), TaskError> {
        let should_fail = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| TaskError::ExecutionFailed("state lock poisoned".into()))?;
            state.call_count += 1;
            if state.failures_remaining > 0 {
                state.failures_remaining -= 1;
                true
            } else {
                false
            }
        };

        if should_fail {
            return Err(TaskError::ExecutionFailed(self.error_message.clone()));
        }
        let runs: u64 = ctx.data.get_optional("runs").unwrap_or(0);
        ctx.data.set("runs", runs + 1)?;
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.clone()
    }

    fn restore_state(&self, stored: &JobDataMap, data: &mut JobDataMap) {
        if let Some(runs) = stored.get_raw("runs") {
            data.insert_value("runs", runs.clone());
        }
    }
}
