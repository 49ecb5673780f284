// src/exec/command.rs

//! Real process backend on top of `tokio::process`.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, trace};

use crate::errors::{ProcvisorError, Result};
use crate::exec::backend::{ExitResult, HandleFuture, ProcessHandle, ProcessLauncher};
use crate::output::{OutputLine, Stream};

/// How long to keep draining buffered output after the process itself has
/// exited. Descendants that inherited the pipes can keep them open forever.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Launches command strings through a shell (`sh -c` / `cmd /C`).
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    shell: String,
    output_buffer: usize,
}

impl ShellLauncher {
    pub fn new(shell: impl Into<String>, output_buffer: usize) -> Self {
        Self {
            shell: shell.into(),
            output_buffer: output_buffer.max(1),
        }
    }

    fn shell_flag(&self) -> &'static str {
        let name = self.shell.rsplit(['/', '\\']).next().unwrap_or(self.shell.as_str());
        if name.eq_ignore_ascii_case("cmd") || name.eq_ignore_ascii_case("cmd.exe") {
            "/C"
        } else {
            "-c"
        }
    }
}

impl Default for ShellLauncher {
    fn default() -> Self {
        Self::new(default_shell(), 256)
    }
}

/// Platform default shell.
pub fn default_shell() -> &'static str {
    if cfg!(windows) { "cmd" } else { "sh" }
}

impl ProcessLauncher for ShellLauncher {
    fn launch(&self, command: &str) -> Result<Box<dyn ProcessHandle>> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(self.shell_flag())
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning '{}' via {}", command, self.shell))
            .map_err(|err| ProcvisorError::LaunchFailure(format!("{err:#}")))?;

        let pid = child.id().unwrap_or(0);
        info!(pid, cmd = %command, "process launched");

        let (tx, rx) = mpsc::channel::<OutputLine>(self.output_buffer);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, Stream::Stdout, pid, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, Stream::Stderr, pid, tx);
        }

        Ok(Box::new(ShellProcess {
            child,
            pid,
            rx,
            exited: None,
        }))
    }
}

/// Read `pipe` line by line into the shared output channel.
fn spawn_line_reader<R>(pipe: R, stream: Stream, pid: u32, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(text)) = lines.next_line().await {
            trace!(pid, %stream, "{}", text);
            if tx.send(OutputLine { stream, text }).await.is_err() {
                break;
            }
        }
        debug!(pid, %stream, "output pipe closed");
    });
}

struct ShellProcess {
    child: Child,
    pid: u32,
    rx: mpsc::Receiver<OutputLine>,
    exited: Option<ExitStatus>,
}

impl ProcessHandle for ShellProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn next_output(&mut self) -> HandleFuture<'_, Option<OutputLine>> {
        Box::pin(async move {
            if self.exited.is_none() {
                // Closed pipes alone do not end the output phase; the process
                // may keep running after redirecting its output elsewhere.
                tokio::select! {
                    biased;
                    Some(line) = self.rx.recv() => return Some(line),
                    status = self.child.wait() => match status {
                        Ok(status) => self.exited = Some(status),
                        Err(err) => {
                            debug!(pid = self.pid, error = %err, "waiting on process failed");
                            return None;
                        }
                    },
                }
            }

            // The process is gone; hand out what is still buffered.
            timeout(EXIT_DRAIN_GRACE, self.rx.recv()).await.ok().flatten()
        })
    }

    fn exit_result(&mut self) -> HandleFuture<'_, Result<ExitResult>> {
        Box::pin(async move {
            let status = match self.exited {
                Some(status) => status,
                None => {
                    let status = self
                        .child
                        .wait()
                        .await
                        .with_context(|| format!("waiting for process {}", self.pid))?;
                    self.exited = Some(status);
                    status
                }
            };

            Ok(ExitResult {
                succeeded: status.success(),
                code: status.code().unwrap_or(-1),
            })
        })
    }

    fn terminate(&mut self) -> Result<()> {
        if self.exited.is_some() {
            return Ok(());
        }
        debug!(pid = self.pid, "sending kill to process");
        self.child.start_kill()?;
        Ok(())
    }
}
