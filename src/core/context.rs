//! Job data and execution context.
//!
//! A job invocation sees two key-value stores:
//!
//! - [`JobDataMap`]: the job's own parameters and state. It is owned by the
//!   host's job record and survives from one invocation to the next, so a
//!   task can remember what it observed last time.
//! - [`SchedulerContext`]: a registry shared by every job in the scheduler,
//!   holding named listeners and plain values.
//!
//! [`JobExecutionContext`] bundles both for one invocation.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::task::TaskTracker;

use super::listener::FileScanListener;
use super::types::{JobId, RunId};

/// Errors that can occur when working with the context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Key was not found in the context.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Failed to deserialize value from context.
    #[error("deserialization error for key '{key}': {message}")]
    DeserializationError { key: String, message: String },

    /// Failed to serialize value for context.
    #[error("serialization error for key '{key}': {message}")]
    SerializationError { key: String, message: String },

    /// The host did not provide a scheduler context for this invocation.
    #[error("scheduler context unavailable: {0}")]
    SchedulerContextUnavailable(String),
}

/// Per-job parameter and state bag.
///
/// Values are stored as JSON so the whole map can be persisted by a
/// [`JobDataStore`](crate::storage::JobDataStore) without knowing the types
/// individual tasks put in it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobDataMap {
    entries: HashMap<String, Value>,
}

impl JobDataMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        let value = self
            .entries
            .get(key)
            .ok_or_else(|| ContextError::KeyNotFound(key.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| ContextError::DeserializationError {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Get a value that may be absent.
    ///
    /// Unlike [`get_optional`](Self::get_optional), a present value of the
    /// wrong type is an error rather than `None`.
    pub fn get_if_present<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ContextError> {
        match self.entries.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                ContextError::DeserializationError {
                    key: key.to_string(),
                    message: e.to_string(),
                }
            }),
        }
    }

    /// Get an optional value by key. Returns None if the key doesn't exist
    /// or holds a value of another type.
    pub fn get_optional<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.entries.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Insert or replace a value.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), ContextError> {
        let json_value =
            serde_json::to_value(value).map_err(|e| ContextError::SerializationError {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        self.entries.insert(key.to_string(), json_value);
        Ok(())
    }

    /// Insert a raw JSON value.
    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Remove a key, returning its raw value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Get the raw JSON value for a key.
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Check if a key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy every entry of `other` into this map, overwriting existing keys.
    pub fn merge(&mut self, other: &JobDataMap) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }
}

impl From<HashMap<String, Value>> for JobDataMap {
    fn from(entries: HashMap<String, Value>) -> Self {
        Self { entries }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for JobDataMap {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// An entry in the [`SchedulerContext`].
#[derive(Clone)]
pub enum ContextEntry {
    /// A file change listener.
    Listener(Arc<dyn FileScanListener>),
    /// Any other shared value.
    Value(Value),
}

impl fmt::Debug for ContextEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextEntry::Listener(_) => f.write_str("Listener(..)"),
            ContextEntry::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

/// Registry shared by all jobs of a scheduler.
///
/// Built once by the host and handed to every invocation behind an `Arc`;
/// tasks only read from it.
#[derive(Debug, Clone, Default)]
pub struct SchedulerContext {
    entries: HashMap<String, ContextEntry>,
}

impl SchedulerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener under `name`, replacing any previous entry.
    pub fn register_listener(
        &mut self,
        name: impl Into<String>,
        listener: Arc<dyn FileScanListener>,
    ) {
        self.entries
            .insert(name.into(), ContextEntry::Listener(listener));
    }

    /// Builder form of [`register_listener`](Self::register_listener).
    pub fn with_listener(
        mut self,
        name: impl Into<String>,
        listener: Arc<dyn FileScanListener>,
    ) -> Self {
        self.register_listener(name, listener);
        self
    }

    /// Store a plain value under `name`, replacing any previous entry.
    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        self.entries.insert(name.into(), ContextEntry::Value(value));
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&ContextEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names of all entries, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Wait for background work started by registered listeners.
    ///
    /// Returns `false` if some of it was still running when `timeout`
    /// expired.
    pub async fn wait_for_listeners(&self, timeout: Duration) -> bool {
        let trackers: Vec<&TaskTracker> = self
            .entries
            .values()
            .filter_map(|entry| match entry {
                ContextEntry::Listener(listener) => listener.pending_work(),
                ContextEntry::Value(_) => None,
            })
            .collect();

        let wait_all = async {
            for tracker in &trackers {
                tracker.close();
                tracker.wait().await;
            }
        };
        let finished = tokio::time::timeout(timeout, wait_all).await.is_ok();
        for tracker in &trackers {
            tracker.reopen();
        }
        finished
    }
}

/// Everything one job invocation can see.
///
/// `data` is the job's working copy of its [`JobDataMap`]; the host decides
/// whether to commit it after the task returns.
pub struct JobExecutionContext {
    job_id: JobId,
    run_id: RunId,
    /// Job parameters and persisted state.
    pub data: JobDataMap,
    scheduler_context: Option<Arc<SchedulerContext>>,
}

impl JobExecutionContext {
    /// Create a context with access to the shared scheduler context.
    pub fn new(job_id: JobId, data: JobDataMap, scheduler_context: Arc<SchedulerContext>) -> Self {
        Self {
            job_id,
            run_id: RunId::new(),
            data,
            scheduler_context: Some(scheduler_context),
        }
    }

    /// Create a context for a host that has no scheduler context to offer.
    pub fn without_scheduler_context(job_id: JobId, data: JobDataMap) -> Self {
        Self {
            job_id,
            run_id: RunId::new(),
            data,
            scheduler_context: None,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// The shared scheduler context.
    pub fn scheduler_context(&self) -> Result<&SchedulerContext, ContextError> {
        self.scheduler_context.as_deref().ok_or_else(|| {
            ContextError::SchedulerContextUnavailable(format!(
                "no scheduler context attached to job '{}'",
                self.job_id
            ))
        })
    }

    /// Consume the context, returning the (possibly modified) job data.
    pub fn into_data(self) -> JobDataMap {
        self.data
    }
}
