//! Scheduler engine for job execution.
//!
//! This module provides the loop that fires jobs at scheduled times, runs
//! manual triggers, and persists job data between invocations.

mod engine;
mod handle;
mod types;

pub use engine::Scheduler;
pub use handle::SchedulerHandle;
pub use types::{InvocationReport, SchedulerError, SchedulerState};
