#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use procvisor::config::{ConfigFile, ConfigSection, RawConfigFile, WorkerConfig};
use procvisor::registry::{IdGenerator, WorkerId};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                worker: BTreeMap::new(),
            },
        }
    }

    pub fn with_worker(mut self, name: &str, cmd: &str) -> Self {
        self.config.worker.insert(
            name.to_string(),
            WorkerConfig {
                cmd: cmd.to_string(),
            },
        );
        self
    }

    pub fn listener_buffer(mut self, size: usize) -> Self {
        self.config.config.listener_buffer = size;
        self
    }

    pub fn output_buffer(mut self, size: usize) -> Self {
        self.config.config.output_buffer = size;
        self
    }

    pub fn shell(mut self, shell: &str) -> Self {
        self.config.config.shell = shell.to_string();
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic ids: `worker-1`, `worker-2`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> WorkerId {
        format!("worker-{}", self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Hands out the same id forever; for exercising collision handling.
#[derive(Debug)]
pub struct RepeatingIds {
    ids: std::sync::Mutex<Vec<WorkerId>>,
}

impl RepeatingIds {
    /// Yields `ids` in order, then repeats the last one.
    pub fn new(ids: &[&str]) -> Self {
        let mut ids: Vec<WorkerId> = ids.iter().map(|s| s.to_string()).collect();
        ids.reverse();
        Self {
            ids: std::sync::Mutex::new(ids),
        }
    }
}

impl IdGenerator for RepeatingIds {
    fn next_id(&self) -> WorkerId {
        let mut ids = self.ids.lock().unwrap();
        if ids.len() > 1 {
            ids.pop().unwrap()
        } else {
            ids.last().cloned().unwrap_or_default()
        }
    }
}
