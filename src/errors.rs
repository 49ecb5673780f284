// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! The supervisor API returns input validation (`InvalidArgument`) and lookup
//! failures (`NotFound`) synchronously, plus `Other` when a worker cannot be
//! created at all (no runtime, no free id). Everything that happens
//! to a worker after it has been created (launch failures, crashes, kills) is
//! reported through its status and history instead.

use thiserror::Error;

use crate::registry::WorkerId;

#[derive(Error, Debug)]
pub enum ProcvisorError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Could not find worker with ID: {0}")]
    NotFound(WorkerId),

    #[error("Launch failure: {0}")]
    LaunchFailure(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProcvisorError>;
