// src/supervisor.rs

//! Public operation surface: `start`, `stop`, `query`, `listen`.
//!
//! A [`Supervisor`] is an explicitly constructed value, cheap to clone, so
//! several independent supervisors can live in one process. Transport
//! layers (the bundled CLI, or anything else) adapt these calls.

use std::sync::Arc;

use tracing::debug;

use crate::config::ConfigFile;
use crate::errors::{ProcvisorError, Result};
use crate::exec::{ProcessLauncher, ShellLauncher};
use crate::output::{Listener, LogEntry};
use crate::registry::{IdGenerator, Registry, UuidGenerator, WorkerId};
use crate::worker::{StopOutcome, Worker, WorkerSnapshot, WorkerStatus};

/// Default number of undelivered entries a listener may buffer before it is
/// considered lagging.
pub const DEFAULT_LISTENER_BUFFER: usize = 1024;

/// Tunables for a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub listener_buffer: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            listener_buffer: DEFAULT_LISTENER_BUFFER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Supervisor {
    registry: Arc<Registry>,
}

impl Supervisor {
    /// Supervisor issuing random UUIDs as worker ids.
    pub fn new(launcher: Arc<dyn ProcessLauncher>, options: SupervisorOptions) -> Self {
        Self::with_ids(launcher, Arc::new(UuidGenerator), options)
    }

    /// Supervisor with a caller-supplied id generator.
    pub fn with_ids(
        launcher: Arc<dyn ProcessLauncher>,
        ids: Arc<dyn IdGenerator>,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            registry: Arc::new(Registry::new(launcher, ids, options.listener_buffer)),
        }
    }

    /// Supervisor running commands through the configured shell.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let launcher = ShellLauncher::new(cfg.config.shell.clone(), cfg.config.output_buffer);
        Self::new(Arc::new(launcher), cfg.supervisor_options())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn worker(&self, id: &str) -> Result<Arc<Worker>> {
        self.registry.lookup(id).ok_or_else(|| {
            debug!(worker = %id, "lookup of unknown worker");
            ProcvisorError::NotFound(id.to_string())
        })
    }

    /// Create and launch a worker for `command`. Callable from any thread;
    /// the worker runs on the runtime the supervisor was built in.
    pub fn start(&self, command: &str) -> Result<WorkerId> {
        self.registry.create(command)
    }

    /// Ask a worker to terminate. Stopping a worker that is not running is
    /// not an error; the outcome says why nothing happened.
    pub fn stop(&self, id: &str) -> Result<StopOutcome> {
        Ok(self.worker(id)?.stop())
    }

    pub fn query(&self, id: &str) -> Result<WorkerSnapshot> {
        Ok(self.worker(id)?.snapshot())
    }

    /// Full history so far plus a listener for everything that follows.
    pub fn listen(&self, id: &str) -> Result<(Vec<LogEntry>, Listener)> {
        Ok(self.worker(id)?.listen())
    }

    /// Wait for a worker to reach a terminal status.
    pub async fn wait(&self, id: &str) -> Result<WorkerStatus> {
        let worker = self.worker(id)?;
        Ok(worker.wait().await)
    }

    /// Snapshots of every worker, ordered by id.
    pub fn list(&self) -> Vec<WorkerSnapshot> {
        self.registry
            .workers()
            .iter()
            .map(|worker| worker.snapshot())
            .collect()
    }

    /// Send a stop request to every worker.
    pub fn stop_all(&self) -> Vec<(WorkerId, StopOutcome)> {
        self.registry
            .workers()
            .iter()
            .map(|worker| (worker.id().clone(), worker.stop()))
            .collect()
    }
}
