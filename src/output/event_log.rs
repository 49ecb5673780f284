// src/output/event_log.rs

//! Append-only history with atomic replay + live subscription.
//!
//! Every mutation and every subscription happens under one mutex, so a new
//! listener either sees an entry in its replayed history or receives it live,
//! never both and never neither.
//!
//! Live delivery uses one bounded `mpsc` channel per listener and `try_send`,
//! so `append` never waits on a consumer. A listener whose buffer is full is
//! dropped from the subscriber set and flagged as lagging; it still drains
//! whatever was buffered before it observes [`Delivery::Lagged`].
//!
//! [`Delivery::Lagged`]: super::Delivery::Lagged

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

use super::listener::Listener;
use super::{LogEntry, OutputLine};

/// Live side of one subscription, held by the log.
struct Subscriber {
    tx: mpsc::Sender<LogEntry>,
    lagged: Arc<AtomicBool>,
}

struct LogState {
    entries: Vec<LogEntry>,
    subscribers: Vec<Subscriber>,
    closed: bool,
}

/// Ordered, append-only record of one worker's output.
pub struct EventLog {
    state: Mutex<LogState>,
    listener_buffer: usize,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("EventLog")
            .field("len", &state.entries.len())
            .field("subscribers", &state.subscribers.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl EventLog {
    /// Create an empty log whose listeners each buffer up to
    /// `listener_buffer` undelivered entries (clamped to at least 1).
    pub fn new(listener_buffer: usize) -> Self {
        Self {
            state: Mutex::new(LogState {
                entries: Vec::new(),
                subscribers: Vec::new(),
                closed: false,
            }),
            listener_buffer: listener_buffer.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one unit and fan it out to every current subscriber.
    ///
    /// Returns the assigned sequence number, or `None` if the log is closed
    /// (the unit is dropped).
    pub fn append(&self, line: OutputLine) -> Option<u64> {
        let mut state = self.lock();

        if state.closed {
            warn!(text = %line.text, "append on closed event log; dropping unit");
            return None;
        }

        let seq = state.entries.len() as u64 + 1;
        let entry = LogEntry {
            seq,
            stream: line.stream,
            text: line.text,
        };

        state.subscribers.retain(|sub| match sub.tx.try_send(entry.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(seq, "listener buffer full; marking listener as lagging");
                sub.lagged.store(true, Ordering::Release);
                false
            }
            Err(TrySendError::Closed(_)) => {
                trace!(seq, "listener disconnected; pruning");
                false
            }
        });

        state.entries.push(entry);
        Some(seq)
    }

    /// Copy the full history and register a live listener, atomically.
    ///
    /// The listener receives exactly the entries appended after the returned
    /// history. On a closed log the listener is already complete.
    pub fn snapshot_and_subscribe(&self) -> (Vec<LogEntry>, Listener) {
        let mut state = self.lock();
        let history = state.entries.clone();
        let replayed_up_to = history.len() as u64;

        let (tx, rx) = mpsc::channel(self.listener_buffer);
        let lagged = Arc::new(AtomicBool::new(false));

        if state.closed {
            drop(tx);
        } else {
            state.subscribers.push(Subscriber {
                tx,
                lagged: Arc::clone(&lagged),
            });
        }

        debug!(
            replayed = replayed_up_to,
            live = !state.closed,
            "listener subscribed"
        );

        (history, Listener::new(rx, lagged, replayed_up_to))
    }

    /// Mark the log closed and release every subscriber.
    ///
    /// Listeners drain what is already buffered and then observe completion.
    /// Returns `false` if the log was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        let released = state.subscribers.len();
        state.subscribers.clear();
        debug!(entries = state.entries.len(), released, "event log closed");
        true
    }

    /// Copy of the recorded history.
    pub fn history(&self) -> Vec<LogEntry> {
        self.lock().entries.clone()
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of live listeners, after pruning disconnected ones.
    pub fn listener_count(&self) -> usize {
        self.counts().1
    }

    /// `(history length, live listener count)` read under one lock.
    pub(crate) fn counts(&self) -> (usize, usize) {
        let mut state = self.lock();
        state.subscribers.retain(|sub| !sub.tx.is_closed());
        (state.entries.len(), state.subscribers.len())
    }
}
