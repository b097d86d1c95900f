//! Core types: identifiers, job data, listeners, tasks, schedules and retries.

pub mod context;
pub mod job;
pub mod listener;
pub mod retry;
pub mod schedule;
pub mod task;
pub mod types;
