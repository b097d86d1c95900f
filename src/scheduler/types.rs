//! Scheduler type definitions.
//!
//! Error types, state, invocation reports and the commands a
//! [`SchedulerHandle`](super::SchedulerHandle) sends to the scheduler loop.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::types::{JobId, RunId};
use crate::storage::StorageError;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// The previous invocation of the job has not finished yet.
    #[error("job is already running: {0}")]
    JobBusy(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Channel error.
    #[error("channel error: {0}")]
    ChannelError(String),
}

/// State of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Scheduler is stopped.
    Stopped,
    /// Scheduler is running.
    Running,
    /// Scheduler is paused. Manual triggers still run.
    Paused,
}

/// Result of one invocation, including any retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationReport {
    pub job_id: JobId,
    pub run_id: RunId,
    /// Attempts made, the initial one included.
    pub attempts: u32,
    /// The final error, if the invocation failed.
    pub error: Option<String>,
}

impl InvocationReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Commands that can be sent to the scheduler.
pub(crate) enum SchedulerCommand {
    /// Run a job now and report back once it finishes.
    Trigger {
        job_id: JobId,
        response: oneshot::Sender<Result<InvocationReport, SchedulerError>>,
    },
    /// Pause the scheduler.
    Pause { response: oneshot::Sender<()> },
    /// Resume the scheduler.
    Resume { response: oneshot::Sender<()> },
    /// Shutdown the scheduler.
    Shutdown { response: oneshot::Sender<()> },
}
