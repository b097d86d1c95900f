//! Job data store backed by a single JSON file.
//!
//! The file holds one object mapping job ids to their data maps. Every save
//! rewrites the whole document to a sibling temp file and renames it into
//! place, so a crash never leaves a half-written state file behind.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{JobDataStore, StorageError};
use crate::core::context::JobDataMap;
use crate::core::types::JobId;

/// Persistent store writing to a JSON file.
pub struct JsonFileJobDataStore {
    path: PathBuf,
    // Held across the write so concurrent saves cannot interleave renames.
    data: Mutex<BTreeMap<JobId, JobDataMap>>,
}

impl JsonFileJobDataStore {
    /// Open a store, reading existing state if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::SerializationError(format!("{}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, data: &BTreeMap<JobId, JobDataMap>) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(data)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| StorageError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| StorageError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[async_trait]
impl JobDataStore for JsonFileJobDataStore {
    async fn load(&self, job_id: &JobId) -> Result<Option<JobDataMap>, StorageError> {
        Ok(self.data.lock().await.get(job_id).cloned())
    }

    // Memory is only updated once the file holds the same state.
    async fn save(&self, job_id: &JobId, data: &JobDataMap) -> Result<(), StorageError> {
        let mut stored = self.data.lock().await;
        let mut updated = stored.clone();
        updated.insert(job_id.clone(), data.clone());
        self.flush(&updated).await?;
        *stored = updated;
        Ok(())
    }

    async fn remove(&self, job_id: &JobId) -> Result<(), StorageError> {
        let mut stored = self.data.lock().await;
        if !stored.contains_key(job_id) {
            return Ok(());
        }
        let mut updated = stored.clone();
        updated.remove(job_id);
        self.flush(&updated).await?;
        *stored = updated;
        Ok(())
    }
}
