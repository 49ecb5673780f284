// src/lib.rs

//! Supervise long-running external processes for many observers.
//!
//! Each command runs as a [`Worker`](worker::Worker) whose output is recorded
//! in an append-only [`EventLog`](output::EventLog). Observers can attach at
//! any time with [`Supervisor::listen`] and receive the complete history
//! followed by a gap-free, duplicate-free live feed.

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod output;
pub mod registry;
pub mod supervisor;
pub mod worker;

pub use errors::{ProcvisorError, Result};
pub use output::{Delivery, Listener, LogEntry, OutputLine, Stream};
pub use registry::WorkerId;
pub use supervisor::{Supervisor, SupervisorOptions};
pub use worker::{StopOutcome, WorkerSnapshot, WorkerStatus};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, default_config_path, load_and_validate};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the supervisor and its shell launcher
/// - one output follower per worker
/// - Ctrl-C handling (stop every worker, keep streaming until they exit)
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let commands = collect_commands(&cfg, &args.commands);

    if args.dry_run {
        print_dry_run(&cfg, &commands);
        return Ok(());
    }

    if commands.is_empty() {
        anyhow::bail!("nothing to supervise: pass commands or add [worker.<name>] sections");
    }

    let supervisor = Supervisor::from_config(&cfg);

    let mut followers: Vec<(String, WorkerId, JoinHandle<()>)> = Vec::new();
    for (name, cmd) in commands {
        let id = supervisor.start(&cmd)?;
        info!(worker = %id, name = %name, "started");
        let follower = tokio::spawn(follow_worker(supervisor.clone(), id.clone(), name.clone()));
        followers.push((name, id, follower));
    }

    // Ctrl-C → stop every worker; followers keep draining until exit.
    {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            for (id, outcome) in supervisor.stop_all() {
                info!(worker = %id, %outcome, "stop on shutdown");
            }
        });
    }

    let mut unsuccessful = 0usize;
    for (name, id, follower) in followers {
        if let Err(e) = follower.await {
            warn!(worker = %id, error = %e, "output follower panicked");
        }
        let status = supervisor.wait(&id).await?;
        let report = supervisor.query(&id)?;
        println!("[{name}] {report}");
        if status != WorkerStatus::Completed {
            unsuccessful += 1;
        }
    }

    if unsuccessful > 0 {
        anyhow::bail!("{unsuccessful} worker(s) did not complete successfully");
    }
    Ok(())
}

/// Explicit `--config` must exist; the default path is optional.
fn load_config(path: Option<&str>) -> anyhow::Result<ConfigFile> {
    match path {
        Some(path) => Ok(load_and_validate(path)?),
        None => {
            let default = default_config_path();
            if default.is_file() {
                Ok(load_and_validate(&default)?)
            } else {
                debug!(path = ?default, "no config file; using defaults");
                Ok(ConfigFile::default())
            }
        }
    }
}

/// Configured workers first (by name), then positional commands.
fn collect_commands(cfg: &ConfigFile, extra: &[String]) -> Vec<(String, String)> {
    cfg.worker
        .iter()
        .map(|(name, w)| (name.clone(), w.cmd.clone()))
        .chain(
            extra
                .iter()
                .enumerate()
                .map(|(i, cmd)| (format!("cmd{}", i + 1), cmd.clone())),
        )
        .collect()
}

/// Print a worker's history and live output until it finishes.
///
/// A lagging listener re-attaches and skips what it already printed.
async fn follow_worker(supervisor: Supervisor, id: WorkerId, name: String) {
    let mut printed = 0u64;

    loop {
        let (history, mut listener) = match supervisor.listen(&id) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(worker = %id, error = %e, "cannot listen to worker");
                return;
            }
        };

        for entry in output::entries_after(&history, printed) {
            print_entry(&name, entry);
            printed = entry.seq;
        }

        loop {
            match listener.recv().await {
                Delivery::Entry(entry) => {
                    print_entry(&name, &entry);
                    printed = entry.seq;
                }
                Delivery::Completed => return,
                Delivery::Lagged { last_delivered } => {
                    warn!(worker = %id, last_delivered, "output follower lagged; re-attaching");
                    break;
                }
            }
        }
    }
}

fn print_entry(name: &str, entry: &LogEntry) {
    match entry.stream {
        Stream::Stdout => println!("[{name}] {}", entry.text),
        Stream::Stderr => eprintln!("[{name}] {}", entry.text),
    }
}

/// Simple dry-run output: print settings and the workers that would start.
fn print_dry_run(cfg: &ConfigFile, commands: &[(String, String)]) {
    println!("procvisor dry-run");
    println!("  config.listener_buffer = {}", cfg.config.listener_buffer);
    println!("  config.output_buffer = {}", cfg.config.output_buffer);
    println!("  config.shell = {}", cfg.config.shell);
    println!();

    println!("workers ({}):", commands.len());
    for (name, cmd) in commands {
        println!("  - {name}");
        println!("      cmd: {cmd}");
    }

    debug!("dry-run complete (nothing started)");
}
