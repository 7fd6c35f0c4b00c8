//! Serializing executor for controller state.
//!
//! All mutation of the mode controller happens on one logical thread. Other
//! threads hand it work with [`SerialRunner::post`] or wait for a result with
//! the bounded blocking bridge [`SerialRunner::call`].
//!
//! ```text
//! caller thread                      runner thread
//!     │  call(f, default) ──────────►  queue ─► f() ─► completion
//!     │◄──────── value or default (after call_timeout)
//! ```
//!
//! A caller already on the runner thread, or inside a task the runner
//! dispatched, runs the work inline instead of queueing it behind itself.

mod error;
mod queue;
mod runner;

pub use error::{Result, RunnerError};
pub use queue::TaskId;
pub use runner::{RunnerConfig, SerialRunner, DEFAULT_CALL_TIMEOUT};
