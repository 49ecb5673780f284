// src/output/mod.rs

//! Worker output recording and fan-out.
//!
//! - [`event_log`] owns the append-only, sequence-numbered history of one
//!   worker and the set of live subscribers.
//! - [`listener`] is the caller-held side of a subscription.
//!
//! A process produces [`OutputLine`]s; once appended to an [`EventLog`] they
//! become [`LogEntry`]s carrying their 1-indexed sequence number.

use std::fmt;

pub mod event_log;
pub mod listener;

pub use event_log::EventLog;
pub use listener::{Delivery, Listener};

/// Which pipe of the process a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => f.write_str("stdout"),
            Stream::Stderr => f.write_str("stderr"),
        }
    }
}

/// One discrete unit of process output, before sequencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: Stream,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: Stream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: Stream::Stderr,
            text: text.into(),
        }
    }
}

/// A unit of output as recorded in a worker's history.
///
/// `seq` is 1-indexed: the Nth appended entry always has `seq == N`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub seq: u64,
    pub stream: Stream,
    pub text: String,
}

/// The tail of `history` after sequence number `seq`, for resuming a feed
/// from a fresh subscription.
pub fn entries_after(history: &[LogEntry], seq: u64) -> &[LogEntry] {
    let start = history.partition_point(|entry| entry.seq <= seq);
    &history[start..]
}
