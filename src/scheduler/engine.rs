//! Scheduler engine implementation.
//!
//! The scheduler is responsible for:
//! - Firing jobs when their schedule is due
//! - Manual triggers, pause and resume
//! - Keeping invocations of the same job from overlapping
//! - Committing and persisting job data after successful invocations
//! - Retrying failed invocations according to the job's retry policy

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::core::context::{JobDataMap, JobExecutionContext, SchedulerContext};
use crate::core::job::ScheduledJob;
use crate::core::types::JobId;
use crate::storage::JobDataStore;

use super::handle::{COMMAND_CHANNEL_BUFFER, SchedulerHandle};
use super::types::{InvocationReport, SchedulerCommand, SchedulerError, SchedulerState};

/// Runtime state of one registered job.
struct JobSlot {
    job: ScheduledJob,
    // Locked for the whole invocation; a failed try_lock means one is in flight.
    data: Arc<Mutex<JobDataMap>>,
    next_fire: Option<DateTime<Utc>>,
}

/// Main scheduler for job execution.
pub struct Scheduler<S: JobDataStore + ?Sized> {
    /// Registered jobs.
    jobs: HashMap<JobId, ScheduledJob>,
    /// Job data persistence.
    store: Arc<S>,
    /// Registry shared with every invocation.
    context: Arc<SchedulerContext>,
    /// Tick interval for checking schedules.
    tick_interval: Duration,
    /// How long shutdown waits for in-flight invocations.
    shutdown_timeout: Duration,
}

impl<S: JobDataStore + 'static> Scheduler<S> {
    /// Create a new scheduler with the given store.
    pub fn new(store: S) -> Self {
        Self::with_store(Arc::new(store))
    }
}

impl<S: JobDataStore + ?Sized + 'static> Scheduler<S> {
    /// Create a new scheduler with a shared store.
    pub fn with_store(store: Arc<S>) -> Self {
        Self {
            jobs: HashMap::new(),
            store,
            context: Arc::new(SchedulerContext::new()),
            tick_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    /// Set the scheduler context handed to every invocation.
    pub fn with_context(mut self, context: SchedulerContext) -> Self {
        self.context = Arc::new(context);
        self
    }

    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Register a job, replacing any job with the same id.
    pub fn register(&mut self, job: ScheduledJob) {
        self.jobs.insert(job.id().clone(), job);
    }

    /// Get a registered job by ID.
    pub fn get_job(&self, id: &JobId) -> Option<&ScheduledJob> {
        self.jobs.get(id)
    }

    /// List all registered jobs.
    pub fn jobs(&self) -> impl Iterator<Item = &ScheduledJob> {
        self.jobs.values()
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.context
    }

    /// Run one invocation of a job without starting the scheduler loop.
    pub async fn run_once(&self, id: &JobId) -> Result<InvocationReport, SchedulerError> {
        let job = self
            .jobs
            .get(id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.to_string()))?;
        let data = Arc::new(Mutex::new(self.initial_data(job).await?));
        let guard = data.lock_owned().await;
        Ok(invoke(
            job.clone(),
            guard,
            Arc::clone(&self.store),
            Arc::clone(&self.context),
        )
        .await)
    }

    /// Start the scheduler and return a handle for controlling it.
    pub async fn start(self) -> Result<(SchedulerHandle, JoinHandle<()>), SchedulerError> {
        let now = Utc::now();
        let mut slots = HashMap::with_capacity(self.jobs.len());
        for job in self.jobs.values() {
            let data = self.initial_data(job).await?;
            slots.insert(
                job.id().clone(),
                JobSlot {
                    job: job.clone(),
                    data: Arc::new(Mutex::new(data)),
                    next_fire: first_fire(job, now),
                },
            );
        }
        tracing::info!(jobs = slots.len(), "Scheduler starting");

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let state = Arc::new(RwLock::new(SchedulerState::Running));

        let handle = SchedulerHandle {
            command_tx,
            state: Arc::clone(&state),
        };

        let scheduler_task = tokio::spawn(async move {
            self.run(slots, command_rx, state).await;
        });

        Ok((handle, scheduler_task))
    }

    /// Wait for background work started by listeners, up to the shutdown
    /// timeout. Returns `false` if some of it was still running.
    pub async fn wait_for_listeners(&self) -> bool {
        let finished = self.context.wait_for_listeners(self.shutdown_timeout).await;
        if !finished {
            tracing::warn!(
                timeout = ?self.shutdown_timeout,
                "Shutdown timeout reached, listener work still running"
            );
        }
        finished
    }

    /// The configured data plus whatever state the task restores from the
    /// store. Keys removed from the configuration do not come back.
    async fn initial_data(&self, job: &ScheduledJob) -> Result<JobDataMap, SchedulerError> {
        let mut data = job.data().clone();
        if let Some(stored) = self.store.load(job.id()).await? {
            job.task().restore_state(&stored, &mut data);
        }
        Ok(data)
    }

    /// Main scheduler loop.
    async fn run(
        self,
        mut slots: HashMap<JobId, JobSlot>,
        mut command_rx: mpsc::Receiver<SchedulerCommand>,
        state: Arc<RwLock<SchedulerState>>,
    ) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if *state.read().await == SchedulerState::Running {
                        self.fire_due(&mut slots, Utc::now(), &mut in_flight);
                    }
                }

                Some(finished) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!(error = %e, "Invocation task panicked");
                    }
                }

                Some(command) = command_rx.recv() => {
                    match command {
                        SchedulerCommand::Trigger { job_id, response } => {
                            match slots.get(&job_id) {
                                None => {
                                    let _ = response.send(Err(SchedulerError::JobNotFound(job_id.to_string())));
                                }
                                Some(slot) => match Arc::clone(&slot.data).try_lock_owned() {
                                    Ok(guard) => {
                                        let invocation = invoke(
                                            slot.job.clone(),
                                            guard,
                                            Arc::clone(&self.store),
                                            Arc::clone(&self.context),
                                        );
                                        in_flight.spawn(async move {
                                            let _ = response.send(Ok(invocation.await));
                                        });
                                    }
                                    Err(_) => {
                                        let _ = response.send(Err(SchedulerError::JobBusy(job_id.to_string())));
                                    }
                                },
                            }
                        }
                        SchedulerCommand::Pause { response } => {
                            *state.write().await = SchedulerState::Paused;
                            tracing::info!("Scheduler paused");
                            let _ = response.send(());
                        }
                        SchedulerCommand::Resume { response } => {
                            *state.write().await = SchedulerState::Running;
                            // Skip occurrences that fell into the pause.
                            let now = Utc::now();
                            for slot in slots.values_mut() {
                                slot.next_fire = next_fire(&slot.job, now);
                            }
                            tracing::info!("Scheduler resumed");
                            let _ = response.send(());
                        }
                        SchedulerCommand::Shutdown { response } => {
                            *state.write().await = SchedulerState::Stopped;
                            self.drain(&mut in_flight).await;
                            let _ = response.send(());
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Fire every job whose next occurrence is at or before `now`.
    ///
    /// Missed occurrences are coalesced into a single invocation.
    fn fire_due(
        &self,
        slots: &mut HashMap<JobId, JobSlot>,
        now: DateTime<Utc>,
        in_flight: &mut JoinSet<()>,
    ) {
        for slot in slots.values_mut() {
            match slot.next_fire {
                Some(due) if due <= now => {}
                _ => continue,
            }
            slot.next_fire = next_fire(&slot.job, now);

            match Arc::clone(&slot.data).try_lock_owned() {
                Ok(guard) => {
                    tracing::debug!(job_id = %slot.job.id(), "Triggering scheduled job");
                    let invocation = invoke(
                        slot.job.clone(),
                        guard,
                        Arc::clone(&self.store),
                        Arc::clone(&self.context),
                    );
                    in_flight.spawn(async move {
                        invocation.await;
                    });
                }
                Err(_) => {
                    tracing::debug!(
                        job_id = %slot.job.id(),
                        "Previous invocation still running, skipping trigger"
                    );
                }
            }
        }
    }

    /// Wait for in-flight invocations, aborting them after the shutdown
    /// timeout, then for listener work they started.
    async fn drain(&self, in_flight: &mut JoinSet<()>) {
        let pending = in_flight.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for running invocations to finish");
            let wait_all = async { while in_flight.join_next().await.is_some() {} };
            if tokio::time::timeout(self.shutdown_timeout, wait_all)
                .await
                .is_err()
            {
                tracing::warn!(
                    timeout = ?self.shutdown_timeout,
                    "Shutdown timeout reached, aborting running invocations"
                );
                in_flight.abort_all();
            }
        }
        self.wait_for_listeners().await;
    }
}

/// Interval schedules fire on the first tick; cron schedules wait for their
/// first occurrence.
fn first_fire(job: &ScheduledJob, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match job.schedule() {
        Some(schedule) if job.is_scheduled() && schedule.interval().is_some() => Some(now),
        _ => next_fire(job, now),
    }
}

fn next_fire(job: &ScheduledJob, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !job.is_scheduled() {
        return None;
    }
    let schedule = job.schedule()?;
    match schedule.next_after(after) {
        Ok(next) => Some(next),
        Err(e) => {
            tracing::warn!(job_id = %job.id(), schedule = %schedule, error = %e, "No further occurrences, job will not fire again");
            None
        }
    }
}

/// Run one invocation, retrying per the job's policy.
///
/// The task works on a copy of the job data; the copy replaces the held data
/// only on success.
async fn invoke<S: JobDataStore + ?Sized>(
    job: ScheduledJob,
    mut data: OwnedMutexGuard<JobDataMap>,
    store: Arc<S>,
    context: Arc<SchedulerContext>,
) -> InvocationReport {
    let policy = job.retry_policy().clone();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let mut ctx =
            JobExecutionContext::new(job.id().clone(), (*data).clone(), Arc::clone(&context));
        let run_id = *ctx.run_id();

        match job.task().execute(&mut ctx).await {
            Ok(()) => {
                let updated = ctx.into_data();
                if updated != *data {
                    if let Err(e) = store.save(job.id(), &updated).await {
                        tracing::warn!(job_id = %job.id(), run_id = %run_id, error = %e, "Failed to persist job data");
                    }
                    *data = updated;
                }
                return InvocationReport {
                    job_id: job.id().clone(),
                    run_id,
                    attempts,
                    error: None,
                };
            }
            Err(e) if policy.should_retry(&e, attempts) => {
                tracing::warn!(
                    job_id = %job.id(),
                    run_id = %run_id,
                    attempt = attempts,
                    error = %e,
                    "Invocation failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                if e.is_refirable() {
                    tracing::warn!(job_id = %job.id(), run_id = %run_id, error = %e, "Invocation failed");
                } else {
                    tracing::error!(job_id = %job.id(), run_id = %run_id, error = %e, refirable = false, "Job is misconfigured");
                }
                return InvocationReport {
                    job_id: job.id().clone(),
                    run_id,
                    attempts,
                    error: Some(e.to_string()),
                };
            }
        }
    }
}
