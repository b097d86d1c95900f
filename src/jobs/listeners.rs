//! Built-in listeners that can be wired up from configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;

use crate::core::listener::FileScanListener;

/// Logs every update at info level.
#[derive(Debug, Clone)]
pub struct LogListener {
    name: String,
}

impl LogListener {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl FileScanListener for LogListener {
    fn file_updated(&self, path: &str) {
        tracing::info!(listener = %self.name, path = %path, "File updated");
    }
}

/// Errors from running a listener command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Runs an external program on every update, with the updated path appended
/// as the last argument.
///
/// The program is started on the current tokio runtime and never blocks the
/// invocation that reported the change; its exit status is logged. Running
/// commands are tracked and exposed through
/// [`pending_work`](FileScanListener::pending_work).
///
/// ```ignore
/// let listener = CommandListener::builder("systemctl")
///     .args(["reload", "nginx"])
///     .timeout(Duration::from_secs(30))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct CommandListener {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    // Shared by clones, so the spawned copy reports into the same tracker.
    tasks: TaskTracker,
}

impl CommandListener {
    pub fn builder(program: impl Into<String>) -> CommandListenerBuilder {
        CommandListenerBuilder {
            inner: CommandListener {
                program: program.into(),
                args: Vec::new(),
                env: HashMap::new(),
                working_dir: None,
                timeout: None,
                tasks: TaskTracker::new(),
            },
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run the command for `path` and wait for it to finish.
    pub async fn run(&self, path: &str) -> Result<Output, CommandError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(path)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let spawn_error = |source: std::io::Error| CommandError::Spawn {
            program: self.program.clone(),
            source,
        };
        match self.timeout {
            Some(limit) => timeout(limit, cmd.output())
                .await
                .map_err(|_| CommandError::Timeout {
                    program: self.program.clone(),
                    timeout: limit,
                })?
                .map_err(spawn_error),
            None => cmd.output().await.map_err(spawn_error),
        }
    }
}

impl FileScanListener for CommandListener {
    fn file_updated(&self, path: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(program = %self.program, path = %path, "No tokio runtime to run listener command");
            return;
        };
        let listener = self.clone();
        let path = path.to_string();
        let work = async move {
            match listener.run(&path).await {
                Ok(output) if output.status.success() => {
                    tracing::info!(program = %listener.program, path = %path, "Listener command finished");
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    tracing::warn!(
                        program = %listener.program,
                        path = %path,
                        exit_code = ?output.status.code(),
                        stderr = %stderr.trim(),
                        "Listener command failed"
                    );
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Listener command failed");
                }
            }
        };
        self.tasks.spawn_on(work, &runtime);
    }

    fn pending_work(&self) -> Option<&TaskTracker> {
        Some(&self.tasks)
    }
}

/// Builder for [`CommandListener`].
#[derive(Debug, Clone)]
pub struct CommandListenerBuilder {
    inner: CommandListener,
}

impl CommandListenerBuilder {
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.inner.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.inner.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> CommandListener {
        self.inner
    }
}
