// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ProcvisorError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ProcvisorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.worker))
    }
}

/// Check a raw config without consuming it.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_global_config(cfg)?;
    validate_workers(cfg)?;
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.listener_buffer == 0 {
        return Err(ProcvisorError::ConfigError(
            "[config].listener_buffer must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.output_buffer == 0 {
        return Err(ProcvisorError::ConfigError(
            "[config].output_buffer must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.shell.trim().is_empty() {
        return Err(ProcvisorError::ConfigError(
            "[config].shell must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_workers(cfg: &RawConfigFile) -> Result<()> {
    for (name, worker) in cfg.worker.iter() {
        if worker.cmd.trim().is_empty() {
            return Err(ProcvisorError::ConfigError(format!(
                "worker '{}' has an empty `cmd`",
                name
            )));
        }
    }
    Ok(())
}
