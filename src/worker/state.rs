// src/worker/state.rs

//! Worker lifecycle states and the values reported to callers.

use std::fmt;

use crate::registry::WorkerId;

/// Lifecycle of a worker.
///
/// `Pending -> Running -> {Completed, Failed, Killed}`, plus the direct
/// `Pending -> Failed` edge for launch failures. Terminal states are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Killed,
}

impl WorkerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkerStatus::Completed | WorkerStatus::Failed | WorkerStatus::Killed
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: WorkerStatus) -> bool {
        use WorkerStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Failed) | (Running, Completed) | (Running, Failed) | (Running, Killed)
        )
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Pending => "Pending",
            WorkerStatus::Running => "Running",
            WorkerStatus::Completed => "Completed",
            WorkerStatus::Failed => "Failed",
            WorkerStatus::Killed => "Killed",
        };
        f.write_str(s)
    }
}

/// Result of asking a worker to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A terminate request was sent to the running process. The worker turns
    /// `Killed` once the process actually exits.
    Requested { pid: u32 },
    /// The worker had already finished; nothing was changed.
    AlreadyTerminal(WorkerStatus),
    /// The process has not been launched yet; there is nothing to kill.
    NotRunningYet,
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopOutcome::Requested { pid } => write!(f, "Killing process: {pid}"),
            StopOutcome::AlreadyTerminal(status) => write!(
                f,
                "Could not kill worker because it has a status of {status}"
            ),
            StopOutcome::NotRunningYet => {
                f.write_str("Could not kill worker because its process has not started yet")
            }
        }
    }
}

/// Point-in-time view of a worker; every field is read at the same instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub id: WorkerId,
    pub command: String,
    /// 0 until the process has been launched.
    pub pid: u32,
    pub status: WorkerStatus,
    pub history_length: usize,
    pub listener_count: usize,
    /// Exit code once the process has exited.
    pub exit_code: Option<i32>,
    /// Why the worker failed to launch, if it did.
    pub failure: Option<String>,
}

impl fmt::Display for WorkerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Worker {} has a PID of {}, the current process is {}, the history has a length of {}, and {} listeners",
            self.id, self.pid, self.status, self.history_length, self.listener_count
        )?;
        if let Some(code) = self.exit_code {
            write!(f, " (exit code {code})")?;
        }
        if let Some(ref failure) = self.failure {
            write!(f, " (launch failed: {failure})")?;
        }
        Ok(())
    }
}
