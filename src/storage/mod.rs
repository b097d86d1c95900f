//! Persistence for job data maps.
//!
//! The scheduler saves a job's [`JobDataMap`] after every successful
//! invocation, so state such as the last observed modification time can
//! outlive the process when a persistent backend is used.

mod json_file;
mod memory;

pub use json_file::JsonFileJobDataStore;
pub use memory::InMemoryJobDataStore;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::context::JobDataMap;
use crate::core::types::JobId;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Storage lock was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Reading or writing the backing file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Storage for per-job data maps.
#[async_trait]
pub trait JobDataStore: Send + Sync {
    /// Load the stored data for a job, if any.
    async fn load(&self, job_id: &JobId) -> Result<Option<JobDataMap>, StorageError>;

    /// Store the data for a job, replacing what was there.
    async fn save(&self, job_id: &JobId, data: &JobDataMap) -> Result<(), StorageError>;

    /// Forget a job. Removing an unknown job is not an error.
    async fn remove(&self, job_id: &JobId) -> Result<(), StorageError>;
}
