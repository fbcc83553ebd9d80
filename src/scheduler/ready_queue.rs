//! Ready Queue
//!
//! Thread-safe priority queue with a shutdown signal. Workers block on
//! `pop_blocking`; `stop` wakes every waiter and makes them return `None`.
//!
//! Uses Mutex + Condvar (not a lock-free structure) deliberately: pops are
//! task-grained, the critical section is a heap operation, and the condvar
//! gives shutdown semantics for free.
//!
//! # Ordering
//!
//! Max-heap by priority; ties broken by earlier release time, then by lower
//! id (FIFO among equals).

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};

use crate::task::Task;

struct ReadyEntry(Arc<Task>);

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for ReadyEntry {}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyEntry {
    // Greater = popped first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.release_time.cmp(&self.0.release_time))
            .then_with(|| other.0.id.cmp(&self.0.id))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<ReadyEntry>,
    stopped: bool,
}

/// Priority queue the workers drain.
#[derive(Default)]
pub struct ReadyQueue {
    state: Mutex<QueueState>,
    cv: Condvar,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a task; dropped silently after `stop` (shutdown races are
    /// resolved in favor of shutdown).
    pub fn push(&self, task: Arc<Task>) {
        {
            let mut state = self.lock();
            if state.stopped {
                return;
            }
            state.heap.push(ReadyEntry(task));
        }
        self.cv.notify_one();
    }

    /// Block until a task is available or the queue is stopped.
    ///
    /// Returns `None` on stop; remaining entries are not drained.
    pub fn pop_blocking(&self) -> Option<Arc<Task>> {
        let mut state = self.lock();
        loop {
            if state.stopped {
                return None;
            }
            if let Some(ReadyEntry(task)) = state.heap.pop() {
                return Some(task);
            }
            state = match self.cv.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Wake all waiters; they return `None`.
    pub fn stop(&self) {
        self.lock().stopped = true;
        self.cv.notify_all();
    }

    /// Re-arm after a stop (for a scheduler restart). Entries that were
    /// queued but never popped survive and run after the restart.
    pub fn reset(&self) {
        self.lock().stopped = false;
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
