//! File modification polling.
//!
//! [`FileScanTask`] checks one path per invocation. It remembers the last
//! modification time it saw in the job's data map and notifies a named
//! [`FileScanListener`] when the time differs on a later invocation.
//!
//! Job data keys:
//!
//! | Key | Type | Required |
//! |---|---|---|
//! | [`FILE_NAME`] | string | yes |
//! | [`FILE_SCAN_LISTENER_NAME`] | string | yes |
//! | [`MINIMUM_UPDATE_AGE`] | integer (ms) | no |
//! | [`LAST_MODIFIED_TIME`] | timestamp | written by the task |
//!
//! The read-modify-write of [`LAST_MODIFIED_TIME`] assumes invocations of the
//! same job never overlap. The bundled [`Scheduler`](crate::Scheduler)
//! guarantees that; other hosts must too.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::core::context::{ContextEntry, JobDataMap, JobExecutionContext};
use crate::core::listener::FileScanListener;
use crate::core::task::{ConfigurationError, Task, TaskError};

/// Path of the file or directory to watch.
pub const FILE_NAME: &str = "FILE_NAME";

/// Name of the listener in the scheduler context.
pub const FILE_SCAN_LISTENER_NAME: &str = "FILE_SCAN_LISTENER_NAME";

/// Modification time seen by the previous invocation.
pub const LAST_MODIFIED_TIME: &str = "LAST_MODIFIED_TIME";

/// Changes younger than this many milliseconds are not reported yet.
pub const MINIMUM_UPDATE_AGE: &str = "MINIMUM_UPDATE_AGE";

/// What a single scan observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The path is neither a file nor a directory. Nothing was stored.
    NotFound,
    /// First observation; stored as the baseline.
    Baseline(DateTime<Utc>),
    /// Same modification time as last time.
    Unchanged(DateTime<Utc>),
    /// The modification time changed and the listener was notified.
    Updated {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    /// Changed, but more recently than the minimum update age. Nothing was
    /// stored, so a later scan reports it.
    Settling {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

impl ScanOutcome {
    /// Whether the listener was called.
    pub fn notified(&self) -> bool {
        matches!(self, ScanOutcome::Updated { .. })
    }
}

/// Polls a path's modification time and notifies a listener on change.
#[derive(Debug, Clone)]
pub struct FileScanTask {
    name: String,
}

impl FileScanTask {
    pub fn new() -> Self {
        Self {
            name: "file_scan".to_string(),
        }
    }

    /// Job data with the two required parameters.
    pub fn job_data(file: impl Into<String>, listener: impl Into<String>) -> JobDataMap {
        let mut data = JobDataMap::new();
        data.insert_value(FILE_NAME, serde_json::Value::String(file.into()));
        data.insert_value(
            FILE_SCAN_LISTENER_NAME,
            serde_json::Value::String(listener.into()),
        );
        data
    }

    /// Run one scan and report what happened.
    pub async fn scan(&self, ctx: &mut JobExecutionContext) -> Result<ScanOutcome, TaskError> {
        let file_name = required_string(&ctx.data, FILE_NAME)?;
        let listener_name = required_string(&ctx.data, FILE_SCAN_LISTENER_NAME)?;
        let min_age = minimum_update_age(&ctx.data)?;

        let listener = resolve_listener(ctx, &listener_name)?;

        let previous: Option<DateTime<Utc>> = ctx.data.get_if_present(LAST_MODIFIED_TIME)?;

        let Some(current) = last_modified(Path::new(&file_name)).await? else {
            tracing::warn!(job_id = %ctx.job_id(), path = %file_name, "File not found");
            return Ok(ScanOutcome::NotFound);
        };

        let outcome = match previous {
            None => {
                tracing::debug!(
                    job_id = %ctx.job_id(),
                    path = %file_name,
                    modified = %current,
                    "Recorded initial modification time"
                );
                ScanOutcome::Baseline(current)
            }
            Some(previous) if previous == current => {
                tracing::debug!(job_id = %ctx.job_id(), path = %file_name, "File unchanged");
                ScanOutcome::Unchanged(current)
            }
            Some(previous) if is_settling(current, min_age) => {
                tracing::debug!(
                    job_id = %ctx.job_id(),
                    path = %file_name,
                    modified = %current,
                    minimum_age_ms = min_age,
                    "File changed too recently, deferring notification"
                );
                return Ok(ScanOutcome::Settling { previous, current });
            }
            Some(previous) => {
                tracing::info!(
                    job_id = %ctx.job_id(),
                    path = %file_name,
                    "File updated, notifying listener"
                );
                listener.file_updated(&file_name);
                ScanOutcome::Updated { previous, current }
            }
        };

        ctx.data.set(LAST_MODIFIED_TIME, current)?;
        Ok(outcome)
    }
}

impl Default for FileScanTask {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Task for FileScanTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut JobExecutionContext) -> Result<(), TaskError> {
        self.scan(ctx).await.map(|_| ())
    }

    /// Keeps the stored modification time, unless it was observed for a
    /// different path than the one configured now.
    fn restore_state(&self, stored: &JobDataMap, data: &mut JobDataMap) {
        let Some(last_modified) = stored.get_raw(LAST_MODIFIED_TIME) else {
            return;
        };
        if stored.get_raw(FILE_NAME) != data.get_raw(FILE_NAME) {
            tracing::info!(
                previous = ?stored.get_raw(FILE_NAME),
                current = ?data.get_raw(FILE_NAME),
                "Watched path changed, discarding stored modification time"
            );
            return;
        }
        data.insert_value(LAST_MODIFIED_TIME, last_modified.clone());
    }
}

fn required_string(data: &JobDataMap, key: &str) -> Result<String, ConfigurationError> {
    match data.get_raw(key) {
        None | Some(serde_json::Value::Null) => {
            Err(ConfigurationError::MissingParameter(key.to_string()))
        }
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ConfigurationError::InvalidParameter {
            key: key.to_string(),
            reason: format!("expected a string, got {}", other),
        }),
    }
}

fn minimum_update_age(data: &JobDataMap) -> Result<i64, ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidParameter {
        key: MINIMUM_UPDATE_AGE.to_string(),
        reason,
    };
    match data.get_if_present::<i64>(MINIMUM_UPDATE_AGE) {
        Ok(None) => Ok(0),
        Ok(Some(ms)) if ms >= 0 => Ok(ms),
        Ok(Some(ms)) => Err(invalid(format!("must not be negative, got {}", ms))),
        Err(e) => Err(invalid(e.to_string())),
    }
}

fn resolve_listener(
    ctx: &JobExecutionContext,
    name: &str,
) -> Result<Arc<dyn FileScanListener>, ConfigurationError> {
    let scheduler_context = ctx
        .scheduler_context()
        .map_err(ConfigurationError::SchedulerContextUnavailable)?;
    match scheduler_context.get(name) {
        Some(ContextEntry::Listener(listener)) => Ok(Arc::clone(listener)),
        Some(ContextEntry::Value(_)) => Err(ConfigurationError::NotAListener(name.to_string())),
        None => Err(ConfigurationError::ListenerNotFound(name.to_string())),
    }
}

fn is_settling(modified: DateTime<Utc>, min_age_ms: i64) -> bool {
    if min_age_ms <= 0 {
        return false;
    }
    match Utc::now().checked_sub_signed(chrono::Duration::milliseconds(min_age_ms)) {
        Some(settled_before) => modified > settled_before,
        None => true,
    }
}

/// Modification time of a file or directory, `None` if there is neither.
pub async fn last_modified(path: &Path) -> Result<Option<DateTime<Utc>>, TaskError> {
    let io_error = |source: io::Error| TaskError::Io {
        path: path.to_path_buf(),
        source,
    };
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(e)),
    };
    if !metadata.is_file() && !metadata.is_dir() {
        return Ok(None);
    }
    let modified = metadata.modified().map_err(io_error)?;
    Ok(Some(DateTime::<Utc>::from(modified)))
}
