// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::exec::default_shell;
use crate::supervisor::{DEFAULT_LISTENER_BUFFER, SupervisorOptions};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// listener_buffer = 1024
/// output_buffer = 256
/// shell = "sh"
///
/// [worker.web]
/// cmd = "python3 -m http.server"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Global settings from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Workers to start, from `[worker.<name>]`.
    ///
    /// Keys are display names only; workers still get generated ids.
    #[serde(default)]
    pub worker: BTreeMap<String, WorkerConfig>,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub worker: BTreeMap<String, WorkerConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        worker: BTreeMap<String, WorkerConfig>,
    ) -> Self {
        Self { config, worker }
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            listener_buffer: self.config.listener_buffer,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Undelivered entries a listener may hold before it is cut off as
    /// lagging.
    #[serde(default = "default_listener_buffer")]
    pub listener_buffer: usize,

    /// Capacity of the channel between a process's output readers and its
    /// worker's run loop.
    #[serde(default = "default_output_buffer")]
    pub output_buffer: usize,

    /// Shell used to run command strings (`sh -c` / `cmd /C`).
    #[serde(default = "default_shell_string")]
    pub shell: String,
}

fn default_listener_buffer() -> usize {
    DEFAULT_LISTENER_BUFFER
}

fn default_output_buffer() -> usize {
    256
}

fn default_shell_string() -> String {
    default_shell().to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            listener_buffer: default_listener_buffer(),
            output_buffer: default_output_buffer(),
            shell: default_shell_string(),
        }
    }
}

/// `[worker.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// The command to execute.
    pub cmd: String,
}
