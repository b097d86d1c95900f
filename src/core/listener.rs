//! Change listener capability.
//!
//! A [`FileScanListener`] is what a file scan job notifies when the watched
//! path's modification time changes. Listeners are registered by name in the
//! [`SchedulerContext`](super::context::SchedulerContext) and resolved on
//! every invocation.

use std::fmt;
use tokio_util::task::TaskTracker;

/// Receives notifications about updated files.
///
/// Called synchronously from the invocation that detected the change, so
/// implementations should return promptly and hand long work off elsewhere.
pub trait FileScanListener: Send + Sync {
    /// The file (or directory) at `path` has a new modification time.
    fn file_updated(&self, path: &str);

    /// Background work started by [`file_updated`](Self::file_updated)
    /// that may still be running.
    ///
    /// Hosts wait on it before shutting down so notifications are not lost
    /// when the runtime goes away.
    fn pending_work(&self) -> Option<&TaskTracker> {
        None
    }
}

/// Adapts a closure into a [`FileScanListener`].
///
/// ```
/// use filescan::{FileScanListener, FnListener};
///
/// let listener = FnListener::new(|path: &str| println!("changed: {path}"));
/// listener.file_updated("/etc/hosts");
/// ```
pub struct FnListener<F>
where
    F: Fn(&str) + Send + Sync,
{
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(&str) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> FileScanListener for FnListener<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn file_updated(&self, path: &str) {
        (self.f)(path)
    }
}

impl<F> fmt::Debug for FnListener<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnListener").finish_non_exhaustive()
    }
}
