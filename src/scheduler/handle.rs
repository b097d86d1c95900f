//! Handle for controlling a running scheduler.

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};

use crate::core::types::JobId;

use super::types::{InvocationReport, SchedulerCommand, SchedulerError, SchedulerState};

/// Buffer size for the command channel between SchedulerHandle and Scheduler.
pub(crate) const COMMAND_CHANNEL_BUFFER: usize = 32;

/// Cloneable handle to a started [`Scheduler`](super::Scheduler).
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) command_tx: mpsc::Sender<SchedulerCommand>,
    pub(crate) state: Arc<RwLock<SchedulerState>>,
}

impl SchedulerHandle {
    async fn request<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<T, SchedulerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                SchedulerError::ChannelError(format!("failed to send {} command", operation))
            })?;

        response_rx.await.map_err(|_| {
            SchedulerError::ChannelError(format!("failed to receive {} response", operation))
        })
    }

    /// Run a job now and wait for the invocation to finish.
    ///
    /// Fails with [`SchedulerError::JobBusy`] if the previous invocation of
    /// the job is still running.
    pub async fn trigger(
        &self,
        job_id: impl Into<JobId>,
    ) -> Result<InvocationReport, SchedulerError> {
        let job_id = job_id.into();
        self.request(
            |response| SchedulerCommand::Trigger { job_id, response },
            "trigger",
        )
        .await?
    }

    /// Stop firing scheduled jobs. Manual triggers still work.
    pub async fn pause(&self) -> Result<(), SchedulerError> {
        self.request(|response| SchedulerCommand::Pause { response }, "pause")
            .await
    }

    /// Resume the scheduler after being paused.
    pub async fn resume(&self) -> Result<(), SchedulerError> {
        self.request(|response| SchedulerCommand::Resume { response }, "resume")
            .await
    }

    /// Stop the scheduler, waiting for in-flight invocations.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.request(|response| SchedulerCommand::Shutdown { response }, "shutdown")
            .await
    }

    /// Get the current scheduler state.
    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Check if the scheduler is running.
    pub async fn is_running(&self) -> bool {
        *self.state.read().await == SchedulerState::Running
    }

    /// Check if the scheduler is paused.
    pub async fn is_paused(&self) -> bool {
        *self.state.read().await == SchedulerState::Paused
    }
}
