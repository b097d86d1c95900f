//! Job implementations and the listeners they notify.

pub mod file_scan;
pub mod listeners;

pub use file_scan::{
    FILE_NAME, FILE_SCAN_LISTENER_NAME, FileScanTask, LAST_MODIFIED_TIME, MINIMUM_UPDATE_AGE,
    ScanOutcome,
};
pub use listeners::{CommandError, CommandListener, CommandListenerBuilder, LogListener};
