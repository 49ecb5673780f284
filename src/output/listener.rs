// src/output/listener.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::{self, error::TryRecvError};

use super::LogEntry;

/// What a listener yields on each receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The next live entry.
    Entry(LogEntry),
    /// The worker finished; no more entries will follow.
    Completed,
    /// This listener fell behind and was disconnected from the live feed.
    ///
    /// `last_delivered` is the sequence number of the last entry this
    /// listener received (history included); the rest is still available
    /// by listening again.
    Lagged { last_delivered: u64 },
}

impl Delivery {
    /// `true` for `Completed` and `Lagged`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Delivery::Entry(_))
    }
}

/// Caller-held handle on a worker's live output.
///
/// Obtained together with the replayed history; the first entry it yields
/// has sequence number `replayed_up_to() + 1`. Once it reports a terminal
/// delivery it keeps reporting the same one. Dropping the listener
/// unsubscribes it.
#[derive(Debug)]
pub struct Listener {
    rx: mpsc::Receiver<LogEntry>,
    lagged: Arc<AtomicBool>,
    replayed_up_to: u64,
    last_delivered: u64,
    finished: bool,
}

impl Listener {
    pub(crate) fn new(
        rx: mpsc::Receiver<LogEntry>,
        lagged: Arc<AtomicBool>,
        replayed_up_to: u64,
    ) -> Self {
        Self {
            rx,
            lagged,
            replayed_up_to,
            last_delivered: replayed_up_to,
            finished: false,
        }
    }

    /// Sequence number of the last entry in the history this listener was
    /// handed at subscribe time (0 if the history was empty).
    pub fn replayed_up_to(&self) -> u64 {
        self.replayed_up_to
    }

    /// Wait for the next entry or the end of the feed.
    pub async fn recv(&mut self) -> Delivery {
        if self.finished {
            return self.terminal();
        }
        match self.rx.recv().await {
            Some(entry) => self.deliver(entry),
            None => self.finish(),
        }
    }

    /// Non-blocking receive; `None` means nothing is buffered right now.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        if self.finished {
            return Some(self.terminal());
        }
        match self.rx.try_recv() {
            Ok(entry) => Some(self.deliver(entry)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.finish()),
        }
    }

    /// Receive until the feed ends, returning the live entries and the
    /// terminal delivery.
    pub async fn drain(&mut self) -> (Vec<LogEntry>, Delivery) {
        let mut entries = Vec::new();
        loop {
            match self.recv().await {
                Delivery::Entry(entry) => entries.push(entry),
                terminal => return (entries, terminal),
            }
        }
    }

    fn deliver(&mut self, entry: LogEntry) -> Delivery {
        self.last_delivered = entry.seq;
        Delivery::Entry(entry)
    }

    fn finish(&mut self) -> Delivery {
        self.finished = true;
        self.rx.close();
        self.terminal()
    }

    fn terminal(&self) -> Delivery {
        // The log sets the flag before dropping the sender.
        if self.lagged.load(Ordering::Acquire) {
            Delivery::Lagged {
                last_delivered: self.last_delivered,
            }
        } else {
            Delivery::Completed
        }
    }
}
