//! Scheduler integration tests.
//!
//! Runs file scan jobs built from YAML configuration through a real
//! scheduler, with job data persisted to a JSON state file.

use chrono::{DateTime, Utc};
use filescan::testing::RecordingListener;
use filescan::{
    CommandListener, ConfigBuilder, FileScanListener, FileScanTask, JobDataStore, JobId,
    JsonFileJobDataStore, LAST_MODIFIED_TIME, MINIMUM_UPDATE_AGE, RetryPolicy, ScanConfig,
    Schedule, ScheduledJob, Scheduler, SchedulerContext, YamlLoader,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use crate::common::{at, set_mtime, wait_until};

const TIMEOUT: Duration = Duration::from_secs(5);

fn config_for(dir: &Path, file: &Path) -> ScanConfig {
    let yaml = format!(
        r#"
tick_interval_ms: 10
shutdown_timeout_secs: 5
state_file: {state}
listeners:
  recorder:
    type: log
jobs:
  - id: app_conf
    file: {file}
    listener: recorder
    schedule: "@every 20ms"
"#,
        state = dir.join("state.json").display(),
        file = file.display(),
    );
    YamlLoader::parse_config(&yaml).unwrap()
}

/// Build a scheduler from configuration, swapping the configured listener
/// for the given one.
async fn scheduler_for(
    config: &ScanConfig,
    listener: Arc<dyn FileScanListener>,
) -> Scheduler<dyn JobDataStore> {
    let (jobs, mut context) = ConfigBuilder::build(config).unwrap();
    context.register_listener("recorder", listener);
    let store = ConfigBuilder::build_store(config).await.unwrap();

    let mut scheduler = Scheduler::with_store(store)
        .with_context(context)
        .with_tick_interval(Duration::from_millis(config.tick_interval_ms.unwrap()));
    for job in jobs {
        scheduler.register(job);
    }
    scheduler
}

async fn persisted_time(state_file: &Path, job_id: &str) -> Option<DateTime<Utc>> {
    let store = JsonFileJobDataStore::open(state_file).await.unwrap();
    store
        .load(&JobId::new(job_id))
        .await
        .unwrap()
        .and_then(|data| data.get_if_present(LAST_MODIFIED_TIME).unwrap())
}

/// A listener that creates `<path>.seen` shortly after being notified.
#[cfg(unix)]
fn touch_listener() -> Arc<dyn FileScanListener> {
    Arc::new(
        CommandListener::builder("sh")
            .args(["-c", "sleep 0.05; touch \"$0.seen\""])
            .build(),
    )
}

#[cfg(unix)]
fn marker_for(file: &Path) -> PathBuf {
    let mut marker = file.as_os_str().to_owned();
    marker.push(".seen");
    PathBuf::from(marker)
}

#[tokio::test]
async fn test_scheduled_scan_detects_change_and_persists_it() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(0));

    let config = config_for(dir.path(), &file);
    let listener = RecordingListener::new();
    let scheduler = scheduler_for(&config, listener.clone()).await;
    let (handle, _task) = scheduler.start().await.unwrap();

    let state_file = dir.path().join("state.json");
    wait_until(TIMEOUT, "baseline to be persisted", || state_file.exists()).await;
    assert_eq!(listener.count(), 0);

    set_mtime(&file, at(60));
    let probe = listener.clone();
    wait_until(TIMEOUT, "listener notification", move || probe.count() > 0).await;

    // several more scans of the unchanged file
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(listener.calls(), vec![file.to_string_lossy().to_string()]);
    assert_eq!(
        persisted_time(&state_file, "app_conf").await,
        Some(at(60).into())
    );
}

#[tokio::test]
async fn test_stored_timestamp_survives_restart() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(0));

    let config = config_for(dir.path(), &file);
    let job_id = JobId::new("app_conf");

    // First process: baseline only.
    let first = RecordingListener::new();
    let report = scheduler_for(&config, first.clone())
        .await
        .run_once(&job_id)
        .await
        .unwrap();
    assert!(report.succeeded());
    assert_eq!(first.count(), 0);

    // File edited while nothing was running.
    set_mtime(&file, at(120));

    // Second process picks up the stored baseline and reports the change.
    let second = RecordingListener::new();
    let scheduler = scheduler_for(&config, second.clone()).await;
    scheduler.run_once(&job_id).await.unwrap();
    scheduler.run_once(&job_id).await.unwrap();

    assert_eq!(second.count(), 1);
    assert_eq!(
        persisted_time(&dir.path().join("state.json"), "app_conf").await,
        Some(at(120).into())
    );
}

#[tokio::test]
async fn test_missing_file_persists_nothing() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("later.conf");

    let config = config_for(dir.path(), &file);
    let listener = RecordingListener::new();
    let scheduler = scheduler_for(&config, listener.clone()).await;

    let report = scheduler.run_once(&JobId::new("app_conf")).await.unwrap();

    assert!(report.succeeded());
    assert_eq!(listener.count(), 0);
    assert!(!dir.path().join("state.json").exists());
}

#[tokio::test]
async fn test_misconfigured_job_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();

    let job = ScheduledJob::new("orphan", Arc::new(FileScanTask::new()))
        .with_data(FileScanTask::job_data(file.to_string_lossy(), "nobody"))
        .with_retry_policy(RetryPolicy::fixed(3, Duration::ZERO));

    let store = Arc::new(JsonFileJobDataStore::open(dir.path().join("state.json")).await.unwrap());
    let mut scheduler = Scheduler::with_store(store).with_context(SchedulerContext::new());
    scheduler.register(job);

    let report = scheduler.run_once(&JobId::new("orphan")).await.unwrap();

    assert_eq!(report.attempts, 1);
    assert!(report.error.unwrap().contains("nobody"));
    assert!(!dir.path().join("state.json").exists());
}

#[tokio::test]
async fn test_manual_trigger_of_unscheduled_job() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(0));

    let listener = RecordingListener::new();
    let context = SchedulerContext::new().with_listener("recorder", listener.clone());
    let job = ScheduledJob::new("manual", Arc::new(FileScanTask::new()))
        .with_data(FileScanTask::job_data(file.to_string_lossy(), "recorder"));
    let store = Arc::new(JsonFileJobDataStore::open(dir.path().join("state.json")).await.unwrap());

    let mut scheduler = Scheduler::with_store(store)
        .with_context(context)
        .with_tick_interval(Duration::from_millis(10));
    scheduler.register(job);
    let (handle, _task) = scheduler.start().await.unwrap();

    // Never fires on its own.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!dir.path().join("state.json").exists());

    assert!(handle.trigger("manual").await.unwrap().succeeded());
    set_mtime(&file, at(5));
    assert!(handle.trigger("manual").await.unwrap().succeeded());
    handle.shutdown().await.unwrap();

    assert_eq!(listener.count(), 1);
}

#[tokio::test]
async fn test_paused_scheduler_does_not_scan() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(0));

    let listener = RecordingListener::new();
    let context = SchedulerContext::new().with_listener("recorder", listener.clone());
    let job = ScheduledJob::new("paused", Arc::new(FileScanTask::new()))
        .with_schedule(Schedule::every(Duration::from_millis(20)).unwrap())
        .with_data(FileScanTask::job_data(file.to_string_lossy(), "recorder"));
    let state_file = dir.path().join("state.json");
    let store = Arc::new(JsonFileJobDataStore::open(&state_file).await.unwrap());

    let mut scheduler = Scheduler::with_store(store)
        .with_context(context)
        .with_tick_interval(Duration::from_millis(10));
    scheduler.register(job);
    let (handle, _task) = scheduler.start().await.unwrap();

    wait_until(TIMEOUT, "baseline to be persisted", || state_file.exists()).await;
    handle.pause().await.unwrap();
    assert!(handle.is_paused().await);
    // let an invocation started before the pause finish
    tokio::time::sleep(Duration::from_millis(50)).await;

    set_mtime(&file, at(30));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(listener.count(), 0);

    handle.resume().await.unwrap();
    let probe = listener.clone();
    wait_until(TIMEOUT, "notification after resume", move || probe.count() > 0).await;
    handle.shutdown().await.unwrap();

    assert_eq!(listener.count(), 1);
}

#[tokio::test]
async fn test_removed_configuration_key_does_not_survive_restart() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(0));
    let job_id = JobId::new("app_conf");

    // First process waits an hour for changes to settle.
    let mut config = config_for(dir.path(), &file);
    config.jobs[0].minimum_update_age_ms = Some(3_600_000);
    scheduler_for(&config, RecordingListener::new())
        .await
        .run_once(&job_id)
        .await
        .unwrap();

    // Second process no longer configures a minimum age, so a change made
    // just now is reported straight away.
    set_mtime(&file, SystemTime::now());
    config.jobs[0].minimum_update_age_ms = None;
    let listener = RecordingListener::new();
    scheduler_for(&config, listener.clone())
        .await
        .run_once(&job_id)
        .await
        .unwrap();

    assert_eq!(listener.count(), 1);
    let store = JsonFileJobDataStore::open(dir.path().join("state.json")).await.unwrap();
    let saved = store.load(&job_id).await.unwrap().unwrap();
    assert!(!saved.contains(MINIMUM_UPDATE_AGE));
}

#[tokio::test]
async fn test_changed_path_starts_a_new_baseline() {
    let dir = TempDir::new().unwrap();
    let old_file = dir.path().join("old.conf");
    let new_file = dir.path().join("new.conf");
    std::fs::write(&old_file, "v1").unwrap();
    std::fs::write(&new_file, "v1").unwrap();
    set_mtime(&old_file, at(0));
    set_mtime(&new_file, at(500));
    let job_id = JobId::new("app_conf");

    let mut config = config_for(dir.path(), &old_file);
    scheduler_for(&config, RecordingListener::new())
        .await
        .run_once(&job_id)
        .await
        .unwrap();

    config.jobs[0].file = new_file.to_string_lossy().to_string();
    let listener = RecordingListener::new();
    let scheduler = scheduler_for(&config, listener.clone()).await;
    scheduler.run_once(&job_id).await.unwrap();

    assert_eq!(listener.count(), 0);
    assert_eq!(
        persisted_time(&dir.path().join("state.json"), "app_conf").await,
        Some(at(500).into())
    );
}

#[cfg(unix)]
#[test]
fn test_listener_command_finishes_before_check_returns() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(0));
    let config = config_for(dir.path(), &file);
    let job_id = JobId::new("app_conf");

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let scheduler = scheduler_for(&config, touch_listener()).await;
        scheduler.run_once(&job_id).await.unwrap();
        set_mtime(&file, at(60));
        assert!(scheduler.run_once(&job_id).await.unwrap().succeeded());
        assert!(scheduler.wait_for_listeners().await);
    });
    drop(runtime);

    assert!(marker_for(&file).exists());
}

#[cfg(unix)]
#[test]
fn test_shutdown_waits_for_listener_commands() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "v1").unwrap();
    set_mtime(&file, at(0));
    let config = config_for(dir.path(), &file);
    let state_file = dir.path().join("state.json");

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let scheduler = scheduler_for(&config, touch_listener()).await;
        let (handle, _task) = scheduler.start().await.unwrap();
        wait_until(TIMEOUT, "baseline to be persisted", || state_file.exists()).await;

        set_mtime(&file, at(60));
        let mut notified = false;
        let deadline = tokio::time::Instant::now() + TIMEOUT;
        while !notified && tokio::time::Instant::now() < deadline {
            notified = persisted_time(&state_file, "app_conf").await == Some(at(60).into());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(notified, "change was never picked up");

        handle.shutdown().await.unwrap();
    });
    drop(runtime);

    assert!(marker_for(&file).exists());
}
