//! In-memory job data store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{JobDataStore, StorageError};
use crate::core::context::JobDataMap;
use crate::core::types::JobId;

/// Thread-safe in-memory store. Data is not persisted across restarts.
#[derive(Debug, Default)]
pub struct InMemoryJobDataStore {
    data: RwLock<HashMap<JobId, JobDataMap>>,
}

impl InMemoryJobDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs with stored data.
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobDataStore for InMemoryJobDataStore {
    async fn load(&self, job_id: &JobId) -> Result<Option<JobDataMap>, StorageError> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data.get(job_id).cloned())
    }

    async fn save(&self, job_id: &JobId, data: &JobDataMap) -> Result<(), StorageError> {
        let mut stored = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        stored.insert(job_id.clone(), data.clone());
        Ok(())
    }

    async fn remove(&self, job_id: &JobId) -> Result<(), StorageError> {
        let mut stored = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        stored.remove(job_id);
        Ok(())
    }
}
