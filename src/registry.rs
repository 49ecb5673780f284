// src/registry.rs

//! Identifier → worker mapping, and creation of new workers.
//!
//! Entries are only ever inserted; a worker stays addressable for the life
//! of its registry. The lock guards the map alone and is never held while a
//! worker does anything.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

use anyhow::anyhow;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::errors::{ProcvisorError, Result};
use crate::exec::ProcessLauncher;
use crate::worker::Worker;

/// Fresh ids drawn per `create` before giving up on a generator that keeps
/// colliding.
const MAX_ID_ATTEMPTS: usize = 16;

/// Opaque worker identifier.
pub type WorkerId = String;

/// Source of fresh, never-reused worker identifiers.
pub trait IdGenerator: Send + Sync + Debug {
    fn next_id(&self) -> WorkerId;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> WorkerId {
        uuid::Uuid::new_v4().to_string()
    }
}

#[derive(Debug)]
pub struct Registry {
    workers: RwLock<HashMap<WorkerId, Arc<Worker>>>,
    ids: Arc<dyn IdGenerator>,
    launcher: Arc<dyn ProcessLauncher>,
    listener_buffer: usize,
    runtime: Option<Handle>,
}

impl Registry {
    /// Workers are run on the Tokio runtime current at construction, if
    /// any; otherwise on whichever runtime `create` is called from.
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        ids: Arc<dyn IdGenerator>,
        listener_buffer: usize,
    ) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            ids,
            launcher,
            listener_buffer,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Validate `command`, register a `Pending` worker for it and start its
    /// launch in the background.
    ///
    /// The worker is discoverable by the returned id before this returns; the
    /// process may not have been spawned yet. Safe to call from any thread.
    pub fn create(&self, command: &str) -> Result<WorkerId> {
        if command.trim().is_empty() {
            return Err(ProcvisorError::InvalidArgument(
                "invalid command, must contain non-whitespace characters".to_string(),
            ));
        }

        let runtime = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or_else(|| anyhow!("no Tokio runtime available to run worker '{command}'"))?;

        let worker = self.register(command)?;
        info!(worker = %worker.id(), cmd = %command, "worker created");
        worker.launch(&runtime, Arc::clone(&self.launcher));
        Ok(worker.id().clone())
    }

    /// Insert a new `Pending` worker under a fresh id.
    fn register(&self, command: &str) -> Result<Arc<Worker>> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = Arc::new(Worker::new(
                self.ids.next_id(),
                command,
                self.listener_buffer,
            ));
            if self.insert(Arc::clone(&candidate)) {
                return Ok(candidate);
            }
            debug!(worker = %candidate.id(), "id already in use; generating another");
        }

        warn!(attempts = MAX_ID_ATTEMPTS, "id generator kept returning taken ids");
        Err(anyhow!("no unused worker id after {MAX_ID_ATTEMPTS} attempts").into())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<WorkerId, Arc<Worker>>> {
        self.workers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<WorkerId, Arc<Worker>>> {
        self.workers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `worker` discoverable under its id.
    ///
    /// Returns `false` and leaves the existing entry untouched if the id is
    /// already taken.
    fn insert(&self, worker: Arc<Worker>) -> bool {
        let mut workers = self.write();
        if workers.contains_key(worker.id()) {
            return false;
        }
        debug!(worker = %worker.id(), "registered worker");
        workers.insert(worker.id().clone(), worker);
        true
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<Worker>> {
        self.read().get(id).cloned()
    }

    /// All registered ids, sorted.
    pub fn ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.read().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Every registered worker, ordered by id.
    pub fn workers(&self) -> Vec<Arc<Worker>> {
        let mut workers: Vec<Arc<Worker>> = self.read().values().cloned().collect();
        workers.sort_unstable_by(|a, b| a.id().cmp(b.id()));
        workers
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
