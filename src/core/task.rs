//! Task trait and error types.
//!
//! A [`Task`] is the unit of work a scheduled job runs on each trigger.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use super::context::{ContextError, JobDataMap, JobExecutionContext};
use super::retry::RetryPolicy;

/// A job is misconfigured. Never fixed by running it again.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A required job data key is absent (or not a string).
    #[error("required parameter '{0}' not found in job data")]
    MissingParameter(String),

    /// A job data key holds a value that cannot be used.
    #[error("invalid value for parameter '{key}': {reason}")]
    InvalidParameter { key: String, reason: String },

    /// No entry with this name in the scheduler context.
    #[error("listener '{0}' not found in scheduler context")]
    ListenerNotFound(String),

    /// The scheduler context entry exists but is not a listener.
    #[error("scheduler context entry '{0}' is not a file scan listener")]
    NotAListener(String),

    /// The host could not supply its scheduler context.
    #[error("error obtaining scheduler context: {0}")]
    SchedulerContextUnavailable(#[source] ContextError),
}

/// Errors that can occur during task execution.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The job is misconfigured.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Reading filesystem metadata failed for a reason other than absence.
    #[error("failed to read metadata for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error accessing the job data map.
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// Task execution failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl TaskError {
    /// Whether the host may run the job again for this failure.
    ///
    /// Configuration errors are never refired: the same data produces the
    /// same error.
    pub fn is_refirable(&self) -> bool {
        !matches!(self, TaskError::Configuration(_))
    }

    /// Check if this error is considered transient (should trigger retry).
    pub fn is_transient(&self) -> bool {
        match self {
            TaskError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// The core trait for scheduled work.
///
/// # Example
///
/// ```ignore
/// use filescan::{JobExecutionContext, Task, TaskError};
/// use async_trait::async_trait;
///
/// struct CountRuns;
///
/// #[async_trait]
/// impl Task for CountRuns {
///     fn name(&self) -> &str {
///         "count_runs"
///     }
///
///     async fn execute(&self, ctx: &mut JobExecutionContext) -> Result<(), TaskError> {
///         let runs: u64 = ctx.data.get_optional("runs").unwrap_or(0);
///         ctx.data.set("runs", runs + 1)?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync {
    /// Returns the name of this task type, used in logs.
    fn name(&self) -> &str;

    /// Run one invocation.
    ///
    /// Changes made to `ctx.data` are kept for the next invocation only if
    /// this returns `Ok(())`.
    async fn execute(&self, ctx: &mut JobExecutionContext) -> Result<(), TaskError>;

    /// Returns the retry policy for this task.
    ///
    /// Default implementation returns no retries.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// Copy state this task owns from previously stored job data into the
    /// freshly configured data.
    ///
    /// Called when a host loads persisted data for a job. Only what this
    /// method copies survives; everything else comes from the current
    /// configuration. The default keeps nothing.
    fn restore_state(&self, _stored: &JobDataMap, _data: &mut JobDataMap) {}
}
