//! Scheduler Core
//!
//! # Responsibilities
//!
//! - **Admission**: `submit` routes a task to the ready queue when its
//!   dependencies are satisfied and its release time has passed, to the
//!   waiting list otherwise, and fails it fast when a dependency already
//!   failed.
//! - **Promotion**: one watcher thread rescans the waiting list every
//!   millisecond; O(|waiting|) per pass.
//! - **Dispatch**: N worker threads pop the priority queue, select an
//!   engine, run the task, and report the single result.
//! - **Preloading**: per-app ready counts feed a dedicated preloader thread
//!   that warms a slot when demand for an app crosses the threshold, so
//!   submission never blocks on a reconfiguration.
//!
//! # Locking
//!
//! Engine list, waiting list, ready counts, completed/failed sets, and the
//! preload queue each have their own lock; none is held across an engine's
//! `run`. Result emission serializes on the sink's lock; completion
//! fulfilment happens after the dependency sets are updated, so a dependent
//! admitted because of this task observes its completion.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use crossbeam_utils::CachePadded;

use crate::dash::completion::CompletionBus;
use crate::engine::Engine;
use crate::registry::{AppDescriptor, ApplicationRegistry};
use crate::task::{ExecutionResult, ResourceKind, Task};

use super::deps::{DepStatus, DependencyManager};
use super::ready_queue::ReadyQueue;
use super::report::{ResultSink, TextSink};

/// Watcher cadence between waiting-list scans.
const WATCHER_PERIOD: Duration = Duration::from_millis(1);

/// Worker count fallback when host concurrency cannot be determined.
const DEFAULT_CPU_WORKERS: usize = 4;

// ============================================================================
// Configuration
// ============================================================================

/// Which engine families dispatch may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendMode {
    /// Use hardware when any reconfigurable engine reports available.
    Auto,
    /// Hardware slots preferred unconditionally.
    Fpga,
    /// CPU engines only; slots are never selected.
    Cpu,
}

impl BackendMode {
    /// Parse a CLI value; `None` for unknown strings.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(BackendMode::Auto),
            "fpga" => Some(BackendMode::Fpga),
            "cpu" => Some(BackendMode::Cpu),
            _ => None,
        }
    }
}

/// Scheduler construction knobs.
#[derive(Clone)]
pub struct SchedulerConfig {
    pub mode: BackendMode,
    /// Worker thread count; 0 means host concurrency (or 4).
    pub cpu_workers: usize,
    /// Ready+waiting demand for one app that triggers an overlay preload;
    /// 0 disables preloading.
    pub preload_threshold: u32,
    /// Result destination.
    pub sink: Arc<dyn ResultSink>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::Auto,
            cpu_workers: 0,
            preload_threshold: 3,
            sink: Arc::new(TextSink::stdout()),
        }
    }
}

impl SchedulerConfig {
    pub fn with_mode(mut self, mode: BackendMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cpu_workers(mut self, workers: usize) -> Self {
        self.cpu_workers = workers;
        self
    }

    pub fn with_preload_threshold(mut self, threshold: u32) -> Self {
        self.preload_threshold = threshold;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }
}

// ============================================================================
// Worker stats
// ============================================================================

/// Per-worker dispatch counters, cache-line isolated.
#[derive(Debug, Default)]
struct WorkerStats {
    tasks_run: AtomicU64,
    failures: AtomicU64,
}

/// Snapshot of one worker's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub tasks_run: u64,
    pub failures: u64,
}

// ============================================================================
// Preload queue
// ============================================================================

/// Deduplicating request queue feeding the preloader thread.
#[derive(Default)]
struct PreloadQueue {
    state: Mutex<PreloadState>,
    cv: Condvar,
}

#[derive(Default)]
struct PreloadState {
    queue: VecDeque<String>,
    stopped: bool,
}

impl PreloadQueue {
    fn request(&self, app: &str) {
        {
            let mut state = self.lock();
            if state.stopped || state.queue.iter().any(|a| a == app) {
                return;
            }
            state.queue.push_back(app.to_string());
        }
        self.cv.notify_one();
    }

    fn pop_blocking(&self) -> Option<String> {
        let mut state = self.lock();
        loop {
            if state.stopped {
                return None;
            }
            if let Some(app) = state.queue.pop_front() {
                return Some(app);
            }
            state = match self.cv.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    fn stop(&self) {
        self.lock().stopped = true;
        self.cv.notify_all();
    }

    fn reset(&self) {
        let mut state = self.lock();
        state.stopped = false;
        state.queue.clear();
    }

    fn lock(&self) -> MutexGuard<'_, PreloadState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Default)]
struct RunThreads {
    workers: Vec<JoinHandle<()>>,
    watcher: Option<JoinHandle<()>>,
    preloader: Option<JoinHandle<()>>,
}

struct Inner {
    registry: Arc<ApplicationRegistry>,
    mode: BackendMode,
    cpu_workers: usize,
    preload_threshold: u32,
    sink: Arc<dyn ResultSink>,
    bus: Arc<CompletionBus>,

    running: AtomicBool,
    /// Resolved at `start()`; immutable until the next `start()`.
    use_cpu_only: AtomicBool,

    engines: Mutex<Vec<Arc<dyn Engine>>>,
    waiting: Mutex<Vec<Arc<Task>>>,
    ready: ReadyQueue,
    deps: DependencyManager,
    ready_counts: Mutex<AHashMap<String, i64>>,
    preload: PreloadQueue,

    threads: Mutex<RunThreads>,
    stats: Vec<CachePadded<WorkerStats>>,
}

/// Cheap-to-clone handle to one scheduler instance.
///
/// `start`/`stop` are idempotent. Callers must `stop()` before dropping the
/// last handle if they want the worker threads joined.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(registry: Arc<ApplicationRegistry>, config: SchedulerConfig) -> Self {
        let cpu_workers = if config.cpu_workers > 0 {
            config.cpu_workers
        } else {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(DEFAULT_CPU_WORKERS)
        };
        let stats = (0..cpu_workers)
            .map(|_| CachePadded::new(WorkerStats::default()))
            .collect();
        Self {
            inner: Arc::new(Inner {
                registry,
                mode: config.mode,
                cpu_workers,
                preload_threshold: config.preload_threshold,
                sink: config.sink,
                bus: Arc::new(CompletionBus::new()),
                running: AtomicBool::new(false),
                use_cpu_only: AtomicBool::new(true),
                engines: Mutex::new(Vec::new()),
                waiting: Mutex::new(Vec::new()),
                ready: ReadyQueue::new(),
                deps: DependencyManager::new(),
                ready_counts: Mutex::new(AHashMap::new()),
                preload: PreloadQueue::default(),
                threads: Mutex::new(RunThreads::default()),
                stats,
            }),
        }
    }

    /// Bus the facades subscribe on; fulfilled once per reported task.
    pub fn completion_bus(&self) -> Arc<CompletionBus> {
        Arc::clone(&self.inner.bus)
    }

    /// Register an engine. Engines added after `start` participate in
    /// selection immediately; backend-mode resolution only looks at engines
    /// present when `start` ran.
    pub fn add_engine(&self, engine: Arc<dyn Engine>) {
        lock_recover(&self.inner.engines).push(engine);
    }

    /// Submit a task; non-blocking.
    pub fn submit(&self, task: Task) {
        self.submit_arc(Arc::new(task));
    }

    /// Submit a shared task (lets callers keep a handle for inspection).
    pub fn submit_arc(&self, task: Arc<Task>) {
        match self.inner.deps.status(&task) {
            DepStatus::Failed(dep) => self.inner.fail_dependent(&task, dep),
            DepStatus::Satisfied if task.release_time <= Instant::now() => {
                self.inner.record_ready(&task.app, 1);
                self.inner.admit(task);
            }
            _ => {
                // Waiting tasks count toward per-app demand too; a burst of
                // blocked same-app work is exactly what preloading is for.
                self.inner.record_ready(&task.app, 1);
                lock_recover(&self.inner.waiting).push(task);
            }
        }
    }

    /// Resolve the backend, prepare static shells, and launch the worker,
    /// watcher, and preloader threads. Idempotent.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.ready.reset();
        self.inner.preload.reset();

        let engines = self.inner.engines_snapshot();
        if self.inner.mode != BackendMode::Cpu {
            for engine in engines.iter().filter(|e| e.is_reconfigurable()) {
                if let Err(err) = engine.prepare_static() {
                    eprintln!(
                        "[sched] static shell load failed on {}: {}",
                        engine.name(),
                        err
                    );
                }
            }
        }
        let fpga_ok = engines
            .iter()
            .any(|e| e.is_reconfigurable() && e.is_available());
        let use_cpu_only = match self.inner.mode {
            BackendMode::Cpu => true,
            BackendMode::Fpga => false,
            BackendMode::Auto => !fpga_ok,
        };
        self.inner
            .use_cpu_only
            .store(use_cpu_only, Ordering::SeqCst);

        let mut threads = lock_recover(&self.inner.threads);

        let watcher_inner = Arc::clone(&self.inner);
        threads.watcher = Some(
            thread::Builder::new()
                .name("sched-watcher".to_string())
                .spawn(move || watcher_inner.watcher_loop())
                .expect("failed to spawn watcher thread"),
        );

        let preload_inner = Arc::clone(&self.inner);
        threads.preloader = Some(
            thread::Builder::new()
                .name("sched-preloader".to_string())
                .spawn(move || preload_inner.preloader_loop())
                .expect("failed to spawn preloader thread"),
        );

        for worker_id in 0..self.inner.cpu_workers {
            let worker_inner = Arc::clone(&self.inner);
            threads.workers.push(
                thread::Builder::new()
                    .name(format!("sched-worker-{}", worker_id))
                    .spawn(move || worker_inner.worker_loop(worker_id))
                    .expect("failed to spawn worker thread"),
            );
        }
    }

    /// Stop dispatch and join every scheduler thread. Tasks mid-`run`
    /// complete normally; queued tasks survive for a later `start`.
    /// Idempotent.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.ready.stop();
        self.inner.preload.stop();

        let taken = {
            let mut threads = lock_recover(&self.inner.threads);
            std::mem::take(&mut *threads)
        };
        if let Some(watcher) = taken.watcher {
            let _ = watcher.join();
        }
        if let Some(preloader) = taken.preloader {
            let _ = preloader.join();
        }
        for worker in taken.workers {
            let _ = worker.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Resolved backend restriction; meaningful after `start`.
    pub fn use_cpu_only(&self) -> bool {
        self.inner.use_cpu_only.load(Ordering::SeqCst)
    }

    pub fn cpu_workers(&self) -> usize {
        self.inner.cpu_workers
    }

    /// Per-worker dispatch counters.
    pub fn worker_stats(&self) -> Vec<WorkerStatsSnapshot> {
        self.inner
            .stats
            .iter()
            .map(|s| WorkerStatsSnapshot {
                tasks_run: s.tasks_run.load(Ordering::Relaxed),
                failures: s.failures.load(Ordering::Relaxed),
            })
            .collect()
    }
}

impl Inner {
    fn engines_snapshot(&self) -> Vec<Arc<dyn Engine>> {
        lock_recover(&self.engines).clone()
    }

    /// Move a task into the ready queue. The demand count was already
    /// raised at submit time (ready and waiting tasks both count).
    fn admit(&self, task: Arc<Task>) {
        task.mark_ready();
        self.ready.push(task);
    }

    /// Fail-fast cascade: report and fulfil without running.
    fn fail_dependent(&self, task: &Task, failed_dep: u64) {
        self.report(
            Some(task),
            ExecutionResult::failure(task.id, format!("dependency {} failed", failed_dep)),
        );
    }

    /// Single result path: emit, update dependency sets, then fulfil the
    /// bus so a woken subscriber observes the published dependency state.
    fn report(&self, task: Option<&Task>, result: ExecutionResult) {
        let deadline_missed = task
            .and_then(|t| t.deadline)
            .map_or(false, |d| Instant::now() > d);
        self.sink.record(&result, deadline_missed);
        if result.ok {
            self.deps.mark_complete(result.id);
        } else {
            self.deps.mark_failed(result.id);
        }
        self.bus.fulfill(result.id, result.ok);
    }

    /// Per-app ready+waiting demand accounting; crossing the threshold on
    /// an increment queues one preload request.
    fn record_ready(&self, app: &str, delta: i64) {
        let mut crossed = false;
        {
            let mut counts = lock_recover(&self.ready_counts);
            let count = counts.get(app).copied().unwrap_or(0).saturating_add(delta);
            let count = count.max(0);
            if count == 0 {
                counts.remove(app);
            } else {
                counts.insert(app.to_string(), count);
                if delta > 0
                    && self.preload_threshold > 0
                    && count == self.preload_threshold as i64
                {
                    crossed = true;
                }
            }
        }
        if crossed
            && self.running.load(Ordering::SeqCst)
            && !self.use_cpu_only.load(Ordering::SeqCst)
        {
            self.preload.request(app);
        }
    }

    // ------------------------------------------------------------------
    // Threads
    // ------------------------------------------------------------------

    /// Promote waiting tasks whose dependencies cleared and whose release
    /// time passed; cascade-fail dependents of failed tasks.
    fn watcher_loop(&self) {
        while self.running.load(Ordering::SeqCst) {
            let mut promoted: Vec<Arc<Task>> = Vec::new();
            let mut cascaded: Vec<(Arc<Task>, u64)> = Vec::new();
            {
                let now = Instant::now();
                let mut waiting = lock_recover(&self.waiting);
                waiting.retain(|task| match self.deps.status(task) {
                    DepStatus::Failed(dep) => {
                        cascaded.push((Arc::clone(task), dep));
                        false
                    }
                    DepStatus::Satisfied if task.release_time <= now => {
                        promoted.push(Arc::clone(task));
                        false
                    }
                    _ => true,
                });
            }
            for task in promoted {
                self.admit(task);
            }
            for (task, dep) in cascaded {
                // Left the waiting list without ever being dispatched.
                self.record_ready(&task.app, -1);
                self.fail_dependent(&task, dep);
            }
            thread::sleep(WATCHER_PERIOD);
        }
    }

    fn worker_loop(&self, worker_id: usize) {
        while self.running.load(Ordering::SeqCst) {
            let Some(task) = self.ready.pop_blocking() else {
                break;
            };
            self.record_ready(&task.app, -1);
            self.stats[worker_id].tasks_run.fetch_add(1, Ordering::Relaxed);

            let Some(desc) = self.registry.lookup(&task.app) else {
                self.stats[worker_id].failures.fetch_add(1, Ordering::Relaxed);
                self.report(
                    Some(&task),
                    ExecutionResult::failure(task.id, format!("unknown app: {}", task.app)),
                );
                continue;
            };

            let Some(engine) = self.select_engine(&task, &desc) else {
                self.stats[worker_id].failures.fetch_add(1, Ordering::Relaxed);
                self.report(
                    Some(&task),
                    ExecutionResult::failure(task.id, "no engine available"),
                );
                continue;
            };

            // A panicking engine is a failed operation, not a dead worker.
            let run = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                engine.run(&task, &desc)
            }));
            let mut result = run.unwrap_or_else(|_| ExecutionResult {
                id: task.id,
                ok: false,
                message: format!("operation error: panic in {}", engine.name()),
                runtime: Duration::ZERO,
                engine: engine.name().to_string(),
            });
            if task.required != ResourceKind::Cpu
                && !engine.is_reconfigurable()
                && !result.message.ends_with("(cpu fallback)")
            {
                result.message.push_str(" (cpu fallback)");
            }
            if !result.ok {
                self.stats[worker_id].failures.fetch_add(1, Ordering::Relaxed);
            }
            self.report(Some(&task), result);
        }
    }

    fn preloader_loop(&self) {
        while let Some(app) = self.preload.pop_blocking() {
            self.do_preload(&app);
        }
    }

    // ------------------------------------------------------------------
    // Engine selection & preloading
    // ------------------------------------------------------------------

    /// Deterministic selection given a fixed engine order:
    /// 1. hardware-kind task, hardware allowed: first slot already holding
    ///    the app, else first slot that loads it;
    /// 2. first CPU engine;
    /// 3. last resort: first slot even without the app loaded;
    /// 4. none.
    fn select_engine(&self, task: &Task, desc: &AppDescriptor) -> Option<Arc<dyn Engine>> {
        let mut cpu: Vec<Arc<dyn Engine>> = Vec::new();
        let mut reconfigurable: Vec<Arc<dyn Engine>> = Vec::new();
        for engine in self.engines_snapshot() {
            if !engine.is_available() {
                continue;
            }
            if engine.is_reconfigurable() {
                reconfigurable.push(engine);
            } else {
                cpu.push(engine);
            }
        }

        let use_cpu_only = self.use_cpu_only.load(Ordering::SeqCst);
        if !use_cpu_only && task.required != ResourceKind::Cpu {
            for engine in &reconfigurable {
                if engine.current_app().as_deref() == Some(task.app.as_str()) {
                    return Some(Arc::clone(engine));
                }
            }
            for engine in &reconfigurable {
                if engine.ensure_app_loaded(desc).is_ok() {
                    return Some(Arc::clone(engine));
                }
            }
        }
        if let Some(engine) = cpu.into_iter().next() {
            return Some(engine);
        }
        if !use_cpu_only {
            return reconfigurable.into_iter().next();
        }
        None
    }

    /// Best-effort overlay warm-up; failures are logged, never propagated.
    fn do_preload(&self, app: &str) {
        if self.use_cpu_only.load(Ordering::SeqCst) || self.preload_threshold == 0 {
            return;
        }
        let Some(desc) = self.registry.lookup(app) else {
            return;
        };
        let slots: Vec<Arc<dyn Engine>> = self
            .engines_snapshot()
            .into_iter()
            .filter(|e| e.is_reconfigurable() && e.is_available())
            .collect();
        for slot in &slots {
            if slot.current_app().as_deref() == Some(app) {
                return;
            }
        }
        let mut last_err = None;
        for slot in &slots {
            match slot.ensure_app_loaded(&desc) {
                Ok(()) => return,
                Err(err) => last_err = Some((slot.name().to_string(), err)),
            }
        }
        if let Some((slot, err)) = last_err {
            eprintln!("[sched] preload of {} failed (last slot {}): {}", app, slot, err);
        }
    }
}

fn lock_recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}
