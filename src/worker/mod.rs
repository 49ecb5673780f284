// src/worker/mod.rs

//! A supervised unit of execution wrapping one external process.
//!
//! A [`Worker`] owns:
//! - its lifecycle state (status, pid, stop signal) behind one mutex
//! - its [`EventLog`]
//! - a `watch` channel mirroring the status, for callers that want to await
//!   completion
//!
//! The process itself is owned by the background run loop in [`run_loop`].
//! Whenever both locks are needed, the state lock is taken before the log
//! lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

use crate::exec::ProcessLauncher;
use crate::output::{EventLog, Listener, LogEntry};
use crate::registry::WorkerId;

pub mod run_loop;
pub mod state;

pub use state::{StopOutcome, WorkerSnapshot, WorkerStatus};

struct WorkerState {
    status: WorkerStatus,
    pid: u32,
    stop_tx: Option<oneshot::Sender<()>>,
    exit_code: Option<i32>,
    failure: Option<String>,
}

pub struct Worker {
    id: WorkerId,
    command: String,
    state: Mutex<WorkerState>,
    log: EventLog,
    status_tx: watch::Sender<WorkerStatus>,
    launched: AtomicBool,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Create a worker in `Pending` state. Nothing runs until
    /// [`launch`](Self::launch) is called.
    pub fn new(id: WorkerId, command: impl Into<String>, listener_buffer: usize) -> Self {
        let (status_tx, _) = watch::channel(WorkerStatus::Pending);
        Self {
            id,
            command: command.into(),
            state: Mutex::new(WorkerState {
                status: WorkerStatus::Pending,
                pid: 0,
                stop_tx: None,
                exit_code: None,
                failure: None,
            }),
            log: EventLog::new(listener_buffer),
            status_tx,
            launched: AtomicBool::new(false),
        }
    }

    /// Spawn the run loop on `runtime`.
    ///
    /// A worker runs at most once; later calls return `false` and spawn
    /// nothing.
    pub fn launch(self: &Arc<Self>, runtime: &Handle, launcher: Arc<dyn ProcessLauncher>) -> bool {
        if self.launched.swap(true, Ordering::AcqRel) {
            warn!(worker = %self.id, "worker already launched; ignoring");
            return false;
        }
        let worker = Arc::clone(self);
        runtime.spawn(async move {
            run_loop::run(worker, launcher).await;
        });
        true
    }

    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn status(&self) -> WorkerStatus {
        self.lock().status
    }

    pub fn pid(&self) -> u32 {
        self.lock().pid
    }

    /// Consistent view of status, pid, history length and listener count.
    pub fn snapshot(&self) -> WorkerSnapshot {
        let state = self.lock();
        let (history_length, listener_count) = self.log.counts();
        WorkerSnapshot {
            id: self.id.clone(),
            command: self.command.clone(),
            pid: state.pid,
            status: state.status,
            history_length,
            listener_count,
            exit_code: state.exit_code,
            failure: state.failure.clone(),
        }
    }

    /// Request termination of the running process.
    ///
    /// Only a `Running` worker is affected. Repeated calls while the process
    /// is shutting down report `Requested` again without re-signalling.
    ///
    /// The run loop keeps its end of the stop channel until the terminal
    /// transition, so while the status is `Running` the request reaches it.
    /// If the run loop has vanished anyway (its runtime shut down), the
    /// worker is failed here instead of reporting a request nobody will act
    /// on.
    pub fn stop(&self) -> StopOutcome {
        let mut state = self.lock();
        match state.status {
            WorkerStatus::Pending => StopOutcome::NotRunningYet,
            WorkerStatus::Running => {
                if let Some(tx) = state.stop_tx.take() {
                    info!(worker = %self.id, pid = state.pid, "stop requested");
                    if tx.send(()).is_err() {
                        warn!(worker = %self.id, "run loop is gone; failing worker");
                        self.finish_locked(
                            &mut state,
                            WorkerStatus::Failed,
                            None,
                            Some("run loop ended before the process exited".to_string()),
                        );
                        return StopOutcome::AlreadyTerminal(WorkerStatus::Failed);
                    }
                }
                StopOutcome::Requested { pid: state.pid }
            }
            terminal => StopOutcome::AlreadyTerminal(terminal),
        }
    }

    /// Replay the full history and subscribe to everything after it.
    pub fn listen(&self) -> (Vec<LogEntry>, Listener) {
        self.log.snapshot_and_subscribe()
    }

    /// Copy of the recorded history.
    pub fn history(&self) -> Vec<LogEntry> {
        self.log.history()
    }

    /// Wait until the worker reaches a terminal status.
    pub async fn wait(&self) -> WorkerStatus {
        let mut rx = self.status_tx.subscribe();
        match rx.wait_for(|status| status.is_terminal()).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        }
    }

    pub(crate) fn log(&self) -> &EventLog {
        &self.log
    }

    /// `Pending -> Running`. Returns `false` (and changes nothing) if the
    /// worker is no longer `Pending`.
    pub(crate) fn mark_running(&self, pid: u32, stop_tx: oneshot::Sender<()>) -> bool {
        let mut state = self.lock();
        if !state.status.can_transition_to(WorkerStatus::Running) {
            warn!(worker = %self.id, status = %state.status, "refusing transition to Running");
            return false;
        }
        state.status = WorkerStatus::Running;
        state.pid = pid;
        state.stop_tx = Some(stop_tx);
        self.status_tx.send_replace(WorkerStatus::Running);
        info!(worker = %self.id, pid, "worker running");
        true
    }

    /// Enter a terminal status and close the log, exactly once.
    pub(crate) fn finish(
        &self,
        status: WorkerStatus,
        exit_code: Option<i32>,
        failure: Option<String>,
    ) {
        let mut state = self.lock();
        self.finish_locked(&mut state, status, exit_code, failure);
    }

    fn finish_locked(
        &self,
        state: &mut WorkerState,
        status: WorkerStatus,
        exit_code: Option<i32>,
        failure: Option<String>,
    ) {
        if !state.status.can_transition_to(status) {
            warn!(
                worker = %self.id,
                from = %state.status,
                to = %status,
                "ignoring invalid terminal transition"
            );
            return;
        }
        state.status = status;
        state.exit_code = exit_code;
        state.failure = failure;
        state.stop_tx = None;
        self.log.close();
        self.status_tx.send_replace(status);
        info!(
            worker = %self.id,
            pid = state.pid,
            status = %status,
            exit_code,
            history = self.log.len(),
            "worker finished"
        );
    }
}
