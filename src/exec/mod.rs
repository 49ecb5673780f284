// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running worker commands, using
//! `tokio::process::Command`, and exposing them to workers through the
//! [`ProcessHandle`] abstraction.
//!
//! - [`backend`] provides the `ProcessLauncher` / `ProcessHandle` traits that
//!   workers are written against, and which tests replace with fakes.
//! - [`command`] provides `ShellLauncher`, the production implementation.

pub mod backend;
pub mod command;

pub use backend::{ExitResult, HandleFuture, ProcessHandle, ProcessLauncher};
pub use command::{ShellLauncher, default_shell};
