// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! Workers talk to a `ProcessLauncher` / `ProcessHandle` pair instead of
//! `tokio::process` directly. This makes it easy to swap in a scripted fake
//! process in tests while keeping the production implementation in
//! [`command`](super::command).
//!
//! - `ShellLauncher` is the default implementation used by `procvisor`.
//! - Tests can provide their own launcher that emits canned output and exits
//!   on demand.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::output::OutputLine;

/// Boxed future returned by `ProcessHandle` methods.
pub type HandleFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitResult {
    pub succeeded: bool,
    /// Exit code, or `-1` when the process was ended by a signal.
    pub code: i32,
}

impl ExitResult {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            code: 0,
        }
    }

    pub fn failure(code: i32) -> Self {
        Self {
            succeeded: false,
            code,
        }
    }
}

/// Starts processes for workers.
pub trait ProcessLauncher: Send + Sync + Debug {
    /// Launch `command` and return a handle on the running process.
    ///
    /// An `Err` here becomes the worker's `Pending -> Failed` transition.
    fn launch(&self, command: &str) -> Result<Box<dyn ProcessHandle>>;
}

/// A running process, owned exclusively by its worker's run loop.
pub trait ProcessHandle: Send {
    /// Platform process identifier.
    fn pid(&self) -> u32;

    /// Wait for the next unit of output.
    ///
    /// `None` means no further output will arrive; the caller then asks for
    /// [`exit_result`](Self::exit_result). The process may still be alive at
    /// that point. Must be cancel-safe: dropping the future loses no output.
    fn next_output(&mut self) -> HandleFuture<'_, Option<OutputLine>>;

    /// Wait for the process to exit and report how it ended. Must be
    /// cancel-safe: the worker races it against stop requests.
    fn exit_result(&mut self) -> HandleFuture<'_, Result<ExitResult>>;

    /// Ask the process to terminate. Best-effort and asynchronous: the
    /// process may still produce output before it exits.
    fn terminate(&mut self) -> Result<()>;
}
