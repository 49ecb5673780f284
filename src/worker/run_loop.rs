// src/worker/run_loop.rs

//! Background task driving one worker from launch to a terminal status.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::errors::Result;
use crate::exec::{ExitResult, ProcessHandle, ProcessLauncher};
use crate::worker::{Worker, WorkerStatus};

/// Stop requests as seen from the run loop.
struct StopSignal {
    rx: oneshot::Receiver<()>,
    armed: bool,
    sent: bool,
}

impl StopSignal {
    fn new(rx: oneshot::Receiver<()>) -> Self {
        Self {
            rx,
            armed: true,
            sent: false,
        }
    }

    /// Forward a received stop request to the process.
    fn forward(
        &mut self,
        worker: &Worker,
        handle: &mut dyn ProcessHandle,
        res: std::result::Result<(), oneshot::error::RecvError>,
    ) {
        self.armed = false;
        if res.is_ok() {
            self.sent = true;
            if let Err(err) = handle.terminate() {
                warn!(worker = %worker.id(), error = %err, "terminate request failed");
            }
        }
    }
}

/// Launch the worker's process, stream its output into the event log, and
/// record how it ended.
pub async fn run(worker: Arc<Worker>, launcher: Arc<dyn ProcessLauncher>) {
    let mut handle = match launcher.launch(worker.command()) {
        Ok(handle) => handle,
        Err(err) => {
            error!(worker = %worker.id(), error = %err, "failed to launch worker process");
            worker.finish(WorkerStatus::Failed, None, Some(err.to_string()));
            return;
        }
    };

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    if !worker.mark_running(handle.pid(), stop_tx) {
        error!(worker = %worker.id(), pid = handle.pid(), "worker not pending; discarding process");
        if let Err(err) = handle.terminate() {
            warn!(worker = %worker.id(), error = %err, "terminate of discarded process failed");
        }
        return;
    }

    // Owned until after `finish`, so a `Running` worker can always be stopped.
    let mut stop = StopSignal::new(stop_rx);

    pump_output(&worker, handle.as_mut(), &mut stop).await;

    let exit = match collect_exit(&worker, handle.as_mut(), &mut stop).await {
        Ok(exit) => Some(exit),
        Err(err) => {
            warn!(worker = %worker.id(), error = %err, "could not collect exit status");
            None
        }
    };

    let status = terminal_status(stop.sent, exit);
    worker.finish(status, exit.map(|e| e.code), None);
    drop(stop);
}

/// Append output until the process signals the end of its output, sending a
/// terminate request if a stop arrives in the meantime.
async fn pump_output(worker: &Worker, handle: &mut dyn ProcessHandle, stop: &mut StopSignal) {
    loop {
        tokio::select! {
            line = handle.next_output() => match line {
                Some(line) => {
                    if let Some(seq) = worker.log().append(line) {
                        debug!(worker = %worker.id(), seq, "output appended");
                    }
                }
                None => break,
            },
            res = &mut stop.rx, if stop.armed => stop.forward(worker, handle, res),
        }
    }
}

/// Wait for the exit status. The process may outlive its output streams, so
/// stop requests are still honoured here.
async fn collect_exit(
    worker: &Worker,
    handle: &mut dyn ProcessHandle,
    stop: &mut StopSignal,
) -> Result<ExitResult> {
    loop {
        tokio::select! {
            exit = handle.exit_result() => return exit,
            res = &mut stop.rx, if stop.armed => {
                debug!(worker = %worker.id(), "stop arrived after output ended");
                stop.forward(worker, handle, res);
            }
        }
    }
}

fn terminal_status(terminate_sent: bool, exit: Option<ExitResult>) -> WorkerStatus {
    match exit {
        _ if terminate_sent => WorkerStatus::Killed,
        Some(exit) if exit.succeeded => WorkerStatus::Completed,
        _ => WorkerStatus::Failed,
    }
}
