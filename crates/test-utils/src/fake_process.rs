use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::{mpsc, watch};

use procvisor::OutputLine;
use procvisor::errors::{ProcvisorError, Result};
use procvisor::exec::{ExitResult, HandleFuture, ProcessHandle, ProcessLauncher};

#[derive(Debug)]
enum FakeMsg {
    Line(OutputLine),
    CloseOutput,
    Exit(ExitResult),
}

/// A launcher that never spawns real processes.
///
/// - `scripted` processes emit a fixed list of lines, then exit.
/// - `manual` processes are driven from the test through the
///   [`FakeProcessControl`] handed out for each launch.
/// - `failing` launchers reject every launch.
#[derive(Debug)]
pub struct FakeLauncher {
    script: Option<(Vec<String>, ExitResult)>,
    fail_launch: Option<String>,
    exit_on_terminate: bool,
    next_pid: AtomicU32,
    launched: Mutex<Vec<String>>,
    controls: Option<mpsc::UnboundedSender<FakeProcessControl>>,
}

impl FakeLauncher {
    fn base() -> Self {
        Self {
            script: None,
            fail_launch: None,
            exit_on_terminate: true,
            next_pid: AtomicU32::new(1000),
            launched: Mutex::new(Vec::new()),
            controls: None,
        }
    }

    /// Every launched process prints `lines` and exits with `exit`.
    pub fn scripted(lines: &[&str], exit: ExitResult) -> Self {
        Self {
            script: Some((lines.iter().map(|s| s.to_string()).collect(), exit)),
            ..Self::base()
        }
    }

    /// Every launched process is controlled by the test. Terminate requests
    /// end the process with code `-1` when `exit_on_terminate` is set.
    pub fn manual(exit_on_terminate: bool) -> (Self, mpsc::UnboundedReceiver<FakeProcessControl>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let launcher = Self {
            exit_on_terminate,
            controls: Some(tx),
            ..Self::base()
        };
        (launcher, rx)
    }

    /// Every launch fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_launch: Some(message.to_string()),
            ..Self::base()
        }
    }

    /// Commands launched so far, in order.
    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, command: &str) -> Result<Box<dyn ProcessHandle>> {
        self.launched.lock().unwrap().push(command.to_string());

        if let Some(ref message) = self.fail_launch {
            return Err(ProcvisorError::LaunchFailure(message.clone()));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let (terminated_tx, terminated_rx) = watch::channel(false);

        if let Some((ref lines, exit)) = self.script {
            for line in lines {
                let _ = tx.send(FakeMsg::Line(OutputLine::stdout(line.clone())));
            }
            let _ = tx.send(FakeMsg::Exit(exit));
        }

        if let Some(ref controls) = self.controls {
            let _ = controls.send(FakeProcessControl {
                pid,
                command: command.to_string(),
                tx: tx.clone(),
                terminated: terminated_rx,
            });
        }

        Ok(Box::new(FakeProcess {
            pid,
            rx,
            tx,
            exit: None,
            output_closed: false,
            exit_on_terminate: self.exit_on_terminate,
            terminated: terminated_tx,
        }))
    }
}

/// Test-side handle on one fake process.
#[derive(Debug, Clone)]
pub struct FakeProcessControl {
    pub pid: u32,
    pub command: String,
    tx: mpsc::UnboundedSender<FakeMsg>,
    terminated: watch::Receiver<bool>,
}

impl FakeProcessControl {
    /// Make the process print one stdout line.
    pub fn emit(&self, text: &str) {
        let _ = self.tx.send(FakeMsg::Line(OutputLine::stdout(text)));
    }

    pub fn emit_line(&self, line: OutputLine) {
        let _ = self.tx.send(FakeMsg::Line(line));
    }

    /// End the process's output without exiting, like a daemon that has
    /// closed stdout and stderr.
    pub fn close_output(&self) {
        let _ = self.tx.send(FakeMsg::CloseOutput);
    }

    /// Make the process exit after everything emitted so far.
    pub fn exit(&self, exit: ExitResult) {
        let _ = self.tx.send(FakeMsg::Exit(exit));
    }

    pub fn is_terminated(&self) -> bool {
        *self.terminated.borrow()
    }

    /// Wait until the worker has asked the process to terminate.
    pub async fn terminated(&mut self) {
        let _ = self.terminated.wait_for(|t| *t).await;
    }
}

struct FakeProcess {
    pid: u32,
    rx: mpsc::UnboundedReceiver<FakeMsg>,
    tx: mpsc::UnboundedSender<FakeMsg>,
    exit: Option<ExitResult>,
    output_closed: bool,
    exit_on_terminate: bool,
    terminated: watch::Sender<bool>,
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn next_output(&mut self) -> HandleFuture<'_, Option<OutputLine>> {
        Box::pin(async move {
            if self.exit.is_some() || self.output_closed {
                return None;
            }
            match self.rx.recv().await {
                Some(FakeMsg::Line(line)) => Some(line),
                Some(FakeMsg::CloseOutput) => {
                    self.output_closed = true;
                    None
                }
                Some(FakeMsg::Exit(exit)) => {
                    self.exit = Some(exit);
                    None
                }
                None => {
                    self.exit = Some(ExitResult::failure(-1));
                    None
                }
            }
        })
    }

    fn exit_result(&mut self) -> HandleFuture<'_, Result<ExitResult>> {
        Box::pin(async move {
            while self.exit.is_none() {
                match self.rx.recv().await {
                    Some(FakeMsg::Exit(exit)) => self.exit = Some(exit),
                    Some(FakeMsg::Line(_)) | Some(FakeMsg::CloseOutput) => {}
                    None => self.exit = Some(ExitResult::failure(-1)),
                }
            }
            Ok(self.exit.unwrap_or(ExitResult::failure(-1)))
        })
    }

    fn terminate(&mut self) -> Result<()> {
        let already = self.terminated.send_replace(true);
        if !already && self.exit_on_terminate {
            let _ = self.tx.send(FakeMsg::Exit(ExitResult::failure(-1)));
        }
        Ok(())
    }
}
