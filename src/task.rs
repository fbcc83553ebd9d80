//! Task and Result Model
//!
//! # Purpose
//!
//! Units of work flowing through the scheduler: identity, priority,
//! dependencies, an operation payload, and the single completion outcome.
//!
//! # Lifecycle
//!
//! A task is in exactly one of {Waiting, Ready, Running, Completed} and only
//! moves forward. The scheduler is the single producer of the `ready` flag;
//! workers are the only readers that act on it. The task itself is shared
//! (`Arc<Task>`) between the scheduler's queues and the worker that pops it;
//! the last clone drops after the result is reported.
//!
//! # Payload
//!
//! Operation data rides in [`TaskPayload`], a tagged variant instead of an
//! encoded pointer in `params`. Contexts are `Arc`-shared with the submitting
//! client, so the payload always outlives the task. `params` remains for
//! extensible string-keyed knobs that engines may inspect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::ops::{FftContext, ZipContext};

/// Monotonically unique 64-bit task identifier (unique per scheduler instance).
pub type TaskId = u64;

// ============================================================================
// ResourceKind
// ============================================================================

/// Resource kind tag: which engine family a task (or provider) targets.
///
/// The ordering is total and stable; provider ordering relies on it.
/// `#[non_exhaustive]` so new hardware kinds can be added without breaking
/// callers; match with a fallback arm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ResourceKind {
    /// Software worker; every scheduler has at least the fallback path here.
    Cpu,
    /// Compression/decompression overlay.
    Zip,
    /// Fourier transform overlay.
    Fft,
    /// Finite impulse response overlay.
    Fir,
}

impl ResourceKind {
    /// Short lowercase label used in reports and bundle files.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Zip => "zip",
            ResourceKind::Fft => "fft",
            ResourceKind::Fir => "fir",
        }
    }
}

// ============================================================================
// TaskPayload
// ============================================================================

/// Operation-specific payload carried by a task.
///
/// Contexts are shared with the submitting client; engines write the outcome
/// through the context's interior lock. Exactly one engine `run` writes a
/// given context (the per-engine run lock plus exactly-once dispatch enforce
/// this).
#[derive(Clone, Debug, Default)]
pub enum TaskPayload {
    /// No operation data; engines sleep for `est_runtime` (test workloads).
    #[default]
    None,
    /// Compress/decompress request.
    Zip(Arc<ZipContext>),
    /// Forward/inverse transform request.
    Fft(Arc<FftContext>),
}

impl TaskPayload {
    /// True when no operation context is attached.
    pub fn is_none(&self) -> bool {
        matches!(self, TaskPayload::None)
    }
}

// ============================================================================
// Task
// ============================================================================

/// A schedulable unit of work.
///
/// Construct with [`Task::new`] and the `with_*` builders; immutable once
/// submitted except for the scheduler-owned `ready` flag.
#[derive(Debug)]
pub struct Task {
    /// Unique id within a scheduler instance.
    pub id: TaskId,
    /// Operation name; key into the application registry.
    pub app: String,
    /// Engine family this task wants; `Cpu` never waits on an overlay.
    pub required: ResourceKind,
    /// Higher runs sooner.
    pub priority: i32,
    /// Instant before which the task is not admissible to the ready queue.
    pub release_time: Instant,
    /// Advisory deadline; reporting only.
    pub deadline: Option<Instant>,
    /// Ids that must report ok before this task becomes admissible.
    pub depends_on: Vec<TaskId>,
    /// Extensible string-keyed parameters.
    pub params: HashMap<String, String>,
    /// Operation context, if any.
    pub payload: TaskPayload,
    /// Advisory runtime hint; also the sleep duration for payload-less tasks.
    pub est_runtime: Duration,
    ready: AtomicBool,
}

impl Task {
    /// New task released immediately, priority 0, no dependencies.
    pub fn new(id: TaskId, app: impl Into<String>) -> Self {
        Self {
            id,
            app: app.into(),
            required: ResourceKind::Cpu,
            priority: 0,
            release_time: Instant::now(),
            deadline: None,
            depends_on: Vec::new(),
            params: HashMap::new(),
            payload: TaskPayload::None,
            est_runtime: Duration::ZERO,
            ready: AtomicBool::new(false),
        }
    }

    pub fn with_required(mut self, kind: ResourceKind) -> Self {
        self.required = kind;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_release_time(mut self, at: Instant) -> Self {
        self.release_time = at;
        self
    }

    pub fn with_deadline(mut self, at: Instant) -> Self {
        self.deadline = Some(at);
        self
    }

    pub fn with_depends_on(mut self, deps: Vec<TaskId>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_payload(mut self, payload: TaskPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_est_runtime(mut self, d: Duration) -> Self {
        self.est_runtime = d;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// True once the scheduler has admitted the task to the ready queue.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Scheduler-only: flip on admission. `ready` implies deps satisfied.
    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }
}

// ============================================================================
// ExecutionResult
// ============================================================================

/// The single outcome of running (or failing to run) a task.
///
/// Emitted exactly once per task between `submit` and `stop`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub id: TaskId,
    pub ok: bool,
    /// Human-readable status; not stable for machine parsing.
    pub message: String,
    /// Measured wall-clock runtime of the engine body.
    pub runtime: Duration,
    /// Name of the engine that produced the result (empty when none ran).
    pub engine: String,
}

impl ExecutionResult {
    /// Result for a task that never reached an engine.
    pub fn failure(id: TaskId, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            message: message.into(),
            runtime: Duration::ZERO,
            engine: String::new(),
        }
    }
}
