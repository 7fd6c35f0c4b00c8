use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the blocking bridge.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The task did not complete within the bound. It may still run later.
    #[error("task '{task}' timed out after {timeout:?}")]
    Timeout { task: String, timeout: Duration },

    /// The runner no longer accepts work.
    #[error("runner '{0}' is shut down")]
    Shutdown(String),

    /// The task was dropped without producing a value (it panicked, or the
    /// runner shut down while it was queued).
    #[error("task '{0}' was dropped before completing")]
    Dropped(String),

    #[error("failed to spawn runner thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
