//! File scan integration tests.
//!
//! Drives `FileScanTask` through the `Task` trait against real files and
//! directories, checking which invocations notify the listener and what is
//! left in the job data afterwards.

use chrono::{DateTime, Utc};
use filescan::testing::{MockJobContext, RecordingListener};
use filescan::{
    ConfigurationError, FILE_NAME, FILE_SCAN_LISTENER_NAME, FileScanTask, FnListener,
    JobExecutionContext, LAST_MODIFIED_TIME, ScanOutcome, Task, TaskError,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use crate::common::{at, capture_logs, set_mtime};

fn scan_context(path: &Path, listener: Arc<RecordingListener>) -> JobExecutionContext {
    MockJobContext::new("scan")
        .watch(path.to_string_lossy(), "recorder")
        .listener("recorder", listener)
        .build()
}

fn stored_time(ctx: &JobExecutionContext) -> Option<DateTime<Utc>> {
    ctx.data.get_if_present(LAST_MODIFIED_TIME).unwrap()
}

fn configuration_error(result: Result<(), TaskError>) -> ConfigurationError {
    match result {
        Err(TaskError::Configuration(e)) => e,
        other => panic!("Expected configuration error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_file_name_leaves_data_untouched() {
    let listener = RecordingListener::new();
    let mut ctx = MockJobContext::new("scan")
        .value(FILE_SCAN_LISTENER_NAME, json!("recorder"))
        .listener("recorder", listener.clone())
        .build();
    let before = ctx.data.clone();

    let err = configuration_error(FileScanTask::new().execute(&mut ctx).await);

    assert!(matches!(&err, ConfigurationError::MissingParameter(key) if key == FILE_NAME));
    assert!(err.to_string().contains(FILE_NAME));
    assert_eq!(ctx.data, before);
    assert_eq!(listener.count(), 0);
}

#[tokio::test]
async fn test_missing_listener_name_leaves_data_untouched() {
    let dir = TempDir::new().unwrap();
    let mut ctx = MockJobContext::new("scan")
        .value(FILE_NAME, json!(dir.path().to_string_lossy()))
        .build();
    let before = ctx.data.clone();

    let err = configuration_error(FileScanTask::new().execute(&mut ctx).await);

    assert!(
        matches!(&err, ConfigurationError::MissingParameter(key) if key == FILE_SCAN_LISTENER_NAME)
    );
    assert_eq!(ctx.data, before);
}

#[tokio::test]
async fn test_unregistered_listener_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let mut ctx = MockJobContext::new("scan")
        .watch(dir.path().to_string_lossy(), "nobody")
        .build();
    let before = ctx.data.clone();

    let result = FileScanTask::new().execute(&mut ctx).await;
    assert!(!result.as_ref().unwrap_err().is_refirable());

    let err = configuration_error(result);
    assert!(matches!(&err, ConfigurationError::ListenerNotFound(name) if name == "nobody"));
    assert_eq!(ctx.data, before);
}

#[tokio::test]
async fn test_wrong_typed_registry_entry_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let mut ctx = MockJobContext::new("scan")
        .watch(dir.path().to_string_lossy(), "recorder")
        .context_value("recorder", json!("not a listener"))
        .build();
    let before = ctx.data.clone();

    let err = configuration_error(FileScanTask::new().execute(&mut ctx).await);

    assert!(matches!(&err, ConfigurationError::NotAListener(name) if name == "recorder"));
    assert_eq!(ctx.data, before);
}

#[tokio::test]
async fn test_unavailable_registry_is_not_refirable() {
    let dir = TempDir::new().unwrap();
    let mut ctx = MockJobContext::new("scan")
        .watch(dir.path().to_string_lossy(), "recorder")
        .without_scheduler_context()
        .build();
    let before = ctx.data.clone();

    let result = FileScanTask::new().execute(&mut ctx).await;
    assert!(!result.as_ref().unwrap_err().is_refirable());

    let err = configuration_error(result);
    assert!(matches!(err, ConfigurationError::SchedulerContextUnavailable(_)));
    assert_eq!(ctx.data, before);
}

#[tokio::test]
async fn test_nonexistent_path_neither_notifies_nor_writes() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("not-there.conf");
    let listener = RecordingListener::new();
    let mut ctx = scan_context(&missing, listener.clone());

    let outcome = FileScanTask::new().scan(&mut ctx).await.unwrap();

    assert_eq!(outcome, ScanOutcome::NotFound);
    assert_eq!(listener.count(), 0);
    assert!(stored_time(&ctx).is_none());
}

#[tokio::test]
async fn test_nonexistent_path_logs_a_warning() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("not-there.conf");
    let mut ctx = scan_context(&missing, RecordingListener::new());
    let (logs, _guard) = capture_logs();

    FileScanTask::new().execute(&mut ctx).await.unwrap();

    let warnings = logs.matching("WARN", "File not found");
    assert_eq!(warnings.len(), 1, "log output: {:?}", logs.lines());
    assert!(warnings[0].contains(&*missing.to_string_lossy()));
}

#[tokio::test]
async fn test_existing_path_logs_no_warning() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    let mut ctx = scan_context(&file, RecordingListener::new());
    let (logs, _guard) = capture_logs();

    FileScanTask::new().execute(&mut ctx).await.unwrap();

    assert!(logs.matching("WARN", "").is_empty(), "log output: {:?}", logs.lines());
}

#[tokio::test]
async fn test_nonexistent_path_keeps_previous_timestamp() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(0));

    let listener = RecordingListener::new();
    let mut ctx = scan_context(&file, listener.clone());
    let task = FileScanTask::new();

    task.execute(&mut ctx).await.unwrap();
    std::fs::remove_file(&file).unwrap();
    task.execute(&mut ctx).await.unwrap();

    assert_eq!(stored_time(&ctx), Some(at(0).into()));
    assert_eq!(listener.count(), 0);
}

#[tokio::test]
async fn test_first_observation_is_a_baseline() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(0));

    let listener = RecordingListener::new();
    let mut ctx = scan_context(&file, listener.clone());

    FileScanTask::new().execute(&mut ctx).await.unwrap();

    assert_eq!(listener.count(), 0);
    assert_eq!(stored_time(&ctx), Some(at(0).into()));
}

#[tokio::test]
async fn test_changed_timestamp_notifies_once() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(60));

    let listener = RecordingListener::new();
    let mut ctx = scan_context(&file, listener.clone());
    let t1: DateTime<Utc> = at(0).into();
    ctx.data.set(LAST_MODIFIED_TIME, t1).unwrap();

    FileScanTask::new().execute(&mut ctx).await.unwrap();

    assert_eq!(listener.calls(), vec![file.to_string_lossy().to_string()]);
    assert_eq!(stored_time(&ctx), Some(at(60).into()));
}

#[tokio::test]
async fn test_older_timestamp_also_notifies() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "restored").unwrap();
    set_mtime(&file, at(0));

    let listener = RecordingListener::new();
    let mut ctx = scan_context(&file, listener.clone());
    let newer: DateTime<Utc> = at(3600).into();
    ctx.data.set(LAST_MODIFIED_TIME, newer).unwrap();

    let outcome = FileScanTask::new().scan(&mut ctx).await.unwrap();

    assert_eq!(
        outcome,
        ScanOutcome::Updated {
            previous: newer,
            current: at(0).into(),
        }
    );
    assert_eq!(listener.count(), 1);
}

#[tokio::test]
async fn test_same_timestamp_does_not_notify() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(0));

    let listener = RecordingListener::new();
    let mut ctx = scan_context(&file, listener.clone());
    let t1: DateTime<Utc> = at(0).into();
    ctx.data.set(LAST_MODIFIED_TIME, t1).unwrap();

    let outcome = FileScanTask::new().scan(&mut ctx).await.unwrap();

    assert_eq!(outcome, ScanOutcome::Unchanged(t1));
    assert_eq!(listener.count(), 0);
    assert_eq!(stored_time(&ctx), Some(t1));
}

#[cfg(unix)]
#[tokio::test]
async fn test_directories_behave_like_files() {
    let dir = TempDir::new().unwrap();
    let watched = dir.path().join("conf.d");
    std::fs::create_dir(&watched).unwrap();
    set_mtime(&watched, at(0));

    let listener = RecordingListener::new();
    let mut ctx = scan_context(&watched, listener.clone());
    let task = FileScanTask::new();

    task.execute(&mut ctx).await.unwrap();
    assert_eq!(stored_time(&ctx), Some(at(0).into()));

    set_mtime(&watched, at(30));
    task.execute(&mut ctx).await.unwrap();

    assert_eq!(listener.calls(), vec![watched.to_string_lossy().to_string()]);
    assert_eq!(stored_time(&ctx), Some(at(30).into()));
}

#[tokio::test]
async fn test_absent_t1_t1_t2_sequence_notifies_exactly_once() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    let listener = RecordingListener::new();
    let mut ctx = scan_context(&file, listener.clone());
    let task = FileScanTask::new();

    // absent
    task.execute(&mut ctx).await.unwrap();

    // T1
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(0));
    task.execute(&mut ctx).await.unwrap();

    // T1 again
    task.execute(&mut ctx).await.unwrap();

    // T2
    set_mtime(&file, at(10));
    task.execute(&mut ctx).await.unwrap();

    assert_eq!(listener.count(), 1);
    assert_eq!(stored_time(&ctx), Some(at(10).into()));
}

#[tokio::test]
async fn test_closure_listener_receives_path() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(0));

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let expected = file.to_string_lossy().to_string();
    let listener = FnListener::new(move |path: &str| {
        assert_eq!(path, expected);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut ctx = MockJobContext::new("scan")
        .watch(file.to_string_lossy(), "closure")
        .listener("closure", Arc::new(listener))
        .build();
    let task = FileScanTask::new();

    task.execute(&mut ctx).await.unwrap();
    set_mtime(&file, at(1));
    task.execute(&mut ctx).await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
