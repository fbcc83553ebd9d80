//! Completion Bus
//!
//! One-shot completion signal per task id. The client-side facades block on
//! a [`Completion`] until the scheduler fulfils the outcome.
//!
//! # Contract
//!
//! - At most one outstanding subscription and at most one fulfil per id.
//! - Fulfil with no subscriber stores the outcome; a later subscribe returns
//!   an already-ready completion carrying it.
//! - Subscribe and fulfil serialize on the bus lock, so a woken subscriber
//!   deterministically sees the fulfiller's outcome.
//! - A subscription that outlives the bus (scheduler teardown before the
//!   task ran) resolves to `false`.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use ahash::AHashMap;

use crate::task::TaskId;

#[derive(Debug)]
enum BusEntry {
    /// A subscriber is waiting on the paired receiver.
    Waiting(SyncSender<bool>),
    /// Fulfilled before anyone subscribed; outcome stored.
    Done(bool),
}

/// One-shot completion keyed by task id.
#[derive(Debug, Default)]
pub struct CompletionBus {
    entries: Mutex<AHashMap<TaskId, BusEntry>>,
}

impl CompletionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in a task's outcome.
    ///
    /// Subscribing again for the same id supersedes the earlier
    /// subscription (which then resolves to `false`).
    pub fn subscribe(&self, id: TaskId) -> Completion {
        let mut entries = self.lock();
        if let Some(BusEntry::Done(ok)) = entries.get(&id) {
            let ok = *ok;
            entries.remove(&id);
            return Completion(Inner::Ready(ok));
        }
        let (tx, rx) = mpsc::sync_channel(1);
        entries.insert(id, BusEntry::Waiting(tx));
        Completion(Inner::Pending(rx))
    }

    /// Publish a task's outcome, waking the subscriber if one is waiting.
    pub fn fulfill(&self, id: TaskId, ok: bool) {
        let mut entries = self.lock();
        match entries.remove(&id) {
            Some(BusEntry::Waiting(tx)) => {
                // Subscriber may have given up; a dead receiver is fine.
                let _ = tx.send(ok);
            }
            Some(BusEntry::Done(first)) => {
                // One fulfil per id; keep the first outcome.
                entries.insert(id, BusEntry::Done(first));
            }
            None => {
                entries.insert(id, BusEntry::Done(ok));
            }
        }
    }

    /// Outstanding (unconsumed) entries; diagnostic only.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, AHashMap<TaskId, BusEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[derive(Debug)]
enum Inner {
    Ready(bool),
    Pending(Receiver<bool>),
}

/// Awaitable outcome of one task.
#[derive(Debug)]
#[must_use = "a completion that is never waited on leaks the subscription"]
pub struct Completion(Inner);

impl Completion {
    /// Block until the outcome is published.
    ///
    /// Resolves to `false` when the bus is torn down before fulfilment.
    pub fn wait(self) -> bool {
        match self.0 {
            Inner::Ready(ok) => ok,
            Inner::Pending(rx) => rx.recv().unwrap_or(false),
        }
    }

    /// Block with a timeout; `None` on timeout.
    pub fn wait_timeout(self, dur: Duration) -> Option<bool> {
        match self.0 {
            Inner::Ready(ok) => Some(ok),
            Inner::Pending(rx) => match rx.recv_timeout(dur) {
                Ok(ok) => Some(ok),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(false),
            },
        }
    }
}
