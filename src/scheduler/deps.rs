//! Dependency Manager
//!
//! Tracks which task ids have reported, split into completed (`ok = true`)
//! and failed (`ok = false`). The readiness predicate drives admission and
//! promotion; a failed dependency makes dependents fail fast instead of
//! waiting forever (the cascade policy this crate pins in its test suite).
//!
//! The internal lock is the happens-before edge between a task's completion
//! and any dependent's admission to the ready queue.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use crate::task::{Task, TaskId};

/// Readiness of a task's dependency set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepStatus {
    /// Every dependency reported ok.
    Satisfied,
    /// At least one dependency has not reported yet (and none failed).
    Pending,
    /// This dependency reported `ok = false`; the task should fail fast.
    Failed(TaskId),
}

#[derive(Debug, Default)]
struct DepState {
    completed: BTreeSet<TaskId>,
    failed: BTreeSet<TaskId>,
}

/// Completed/failed id sets with the `ready(task)` predicate.
#[derive(Debug, Default)]
pub struct DependencyManager {
    state: Mutex<DepState>,
}

impl DependencyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_complete(&self, id: TaskId) {
        self.lock().completed.insert(id);
    }

    pub fn mark_failed(&self, id: TaskId) {
        self.lock().failed.insert(id);
    }

    /// Dependency readiness; a failed dependency wins over a pending one so
    /// cascades trigger as early as possible.
    pub fn status(&self, task: &Task) -> DepStatus {
        let state = self.lock();
        let mut pending = false;
        for dep in &task.depends_on {
            if state.failed.contains(dep) {
                return DepStatus::Failed(*dep);
            }
            if !state.completed.contains(dep) {
                pending = true;
            }
        }
        if pending {
            DepStatus::Pending
        } else {
            DepStatus::Satisfied
        }
    }

    pub fn is_complete(&self, id: TaskId) -> bool {
        self.lock().completed.contains(&id)
    }

    fn lock(&self) -> MutexGuard<'_, DepState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
