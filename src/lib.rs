//! Periodic file change detection.
//!
//! A [`FileScanTask`] compares a path's modification time against the value
//! remembered in its [`JobDataMap`] and notifies a [`FileScanListener`],
//! looked up by name in the [`SchedulerContext`], when the two differ. The
//! [`Scheduler`] runs such tasks on cron or interval schedules, keeps
//! invocations of a job from overlapping and persists job data between runs.

pub mod config;
pub mod core;
pub mod jobs;
pub mod scheduler;
pub mod storage;
pub mod testing;

pub use config::{ConfigBuilder, ConfigError, JobConfig, ListenerConfig, ScanConfig, YamlLoader};
pub use core::context::{
    ContextEntry, ContextError, JobDataMap, JobExecutionContext, SchedulerContext,
};
pub use core::job::ScheduledJob;
pub use core::listener::{FileScanListener, FnListener};
pub use core::retry::{RetryCondition, RetryPolicy};
pub use core::schedule::{Schedule, ScheduleError};
pub use core::task::{ConfigurationError, Task, TaskError};
pub use core::types::{JobId, RunId};
pub use jobs::{
    CommandListener, FILE_NAME, FILE_SCAN_LISTENER_NAME, FileScanTask, LAST_MODIFIED_TIME,
    LogListener, MINIMUM_UPDATE_AGE, ScanOutcome,
};
pub use scheduler::{InvocationReport, Scheduler, SchedulerError, SchedulerHandle, SchedulerState};
pub use storage::{InMemoryJobDataStore, JobDataStore, JsonFileJobDataStore, StorageError};
