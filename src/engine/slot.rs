//! Reconfigurable Hardware Slot
//!
//! # Lifecycle
//!
//! ```text
//! Fresh ──prepare_static()──► StaticLoaded ──ensure_app_loaded(a)──► Overlay(a)
//!                                                 │
//!                                                 └─ensure_app_loaded(b)──► Overlay(b)
//! ```
//!
//! The shell-specific reconfiguration request lives behind the [`Shell`]
//! trait: [`FsShell`] writes the overlay reference into a firmware control
//! file (optionally wrapping the write in a decouple assert/release on a
//! control line), [`MockShell`] records loads and can be armed to fail.
//!
//! # Locking
//!
//! Two locks per slot:
//! - the **config lock** guards slot state and is held across a
//!   reconfiguration request;
//! - the **run lock** serializes task execution on the slot.
//!
//! They are separate so a preload can swap overlays between tasks. An
//! external `ensure_app_loaded` only proceeds when it can take the run lock
//! without waiting; while a task is mid-run the swap is refused with
//! [`OverlayError::SlotBusy`], so `current_app` never changes under a
//! running task.
//!
//! # Execution
//!
//! `run` re-ensures the overlay (no-op when it matches), then executes: a
//! dedicated [`HwKernel`] path when one serves the app, otherwise the CPU
//! operation body with the message tagged `" (cpu fallback)"`.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use crate::ops::OpError;
use crate::registry::AppDescriptor;
use crate::task::{ExecutionResult, ResourceKind, Task};

use super::cpu::run_operation_body;
use super::{Engine, OverlayError};

/// Sleep used for payload-less tasks with no runtime estimate.
const DEFAULT_SLOT_SLEEP: Duration = Duration::from_millis(15);

fn lock_recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ============================================================================
// Shell
// ============================================================================

/// Shell-specific reconfiguration request.
///
/// `load` returns only after the request completed; an `Ok` means the slot
/// now hosts the referenced image.
pub trait Shell: Send + Sync {
    fn load(&self, reference: &str) -> Result<(), OverlayError>;

    /// Whether the shell's control surface is reachable.
    fn is_available(&self) -> bool {
        true
    }
}

/// Decouple control line toggled around a reconfiguration request.
///
/// The line isolates the slot's outputs while the fabric is being rewritten;
/// `settle` is the post-toggle delay the board needs.
#[derive(Clone, Debug)]
pub struct DecoupleLine {
    pub value_path: PathBuf,
    pub active_low: bool,
    pub settle: Duration,
}

impl DecoupleLine {
    fn write(&self, asserted: bool) -> io::Result<()> {
        let mut level = if asserted { 1 } else { 0 };
        if self.active_low {
            level ^= 1;
        }
        fs::write(&self.value_path, format!("{}\n", level))?;
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        Ok(())
    }
}

/// RAII assert/release around a shell request; releases on drop even when
/// the request fails.
struct DecoupleGuard<'a> {
    line: &'a DecoupleLine,
}

impl<'a> DecoupleGuard<'a> {
    fn assert(line: &'a DecoupleLine) -> Result<Self, OverlayError> {
        line.write(true).map_err(OverlayError::ControlLine)?;
        Ok(Self { line })
    }
}

impl Drop for DecoupleGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.line.write(false) {
            eprintln!("[decouple] release failed: {}", e);
        }
    }
}

/// Firmware-file shell: writes the image reference into the manager's
/// control file, the way partial reconfiguration is requested on mainline
/// Linux FPGA managers.
#[derive(Debug)]
pub struct FsShell {
    manager_path: PathBuf,
    decouple: Option<DecoupleLine>,
}

impl FsShell {
    pub fn new(manager_path: impl Into<PathBuf>) -> Self {
        Self {
            manager_path: manager_path.into(),
            decouple: None,
        }
    }

    pub fn with_decouple(mut self, line: DecoupleLine) -> Self {
        self.decouple = Some(line);
        self
    }
}

impl Shell for FsShell {
    fn load(&self, reference: &str) -> Result<(), OverlayError> {
        let _guard = match &self.decouple {
            Some(line) => Some(DecoupleGuard::assert(line)?),
            None => None,
        };
        fs::write(&self.manager_path, format!("{}\n", reference)).map_err(|source| {
            OverlayError::Manager {
                path: self.manager_path.clone(),
                source,
            }
        })
    }

    fn is_available(&self) -> bool {
        self.manager_path.exists()
    }
}

/// Records loads instead of touching hardware; armable to fail.
///
/// The observation point for slot lifecycle and preload tests.
#[derive(Debug, Default)]
pub struct MockShell {
    loads: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl MockShell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Arm or disarm load failure.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Release);
    }

    /// Every reference loaded so far, in order.
    pub fn loads(&self) -> Vec<String> {
        lock_recover(&self.loads).clone()
    }

    pub fn load_count(&self) -> usize {
        lock_recover(&self.loads).len()
    }
}

impl Shell for MockShell {
    fn load(&self, reference: &str) -> Result<(), OverlayError> {
        if self.fail.load(Ordering::Acquire) {
            return Err(OverlayError::Rejected {
                reason: "mock failure armed".to_string(),
            });
        }
        lock_recover(&self.loads).push(reference.to_string());
        Ok(())
    }
}

// ============================================================================
// HwKernel
// ============================================================================

/// Dedicated hardware execution path for a loaded overlay.
///
/// Returns `None` when the kernel has no path for this task's app; the slot
/// then falls back to the CPU operation body. An `Err` is a non-fatal
/// hardware failure and triggers the same fallback.
pub trait HwKernel: Send + Sync {
    fn execute(&self, task: &Task) -> Option<Result<String, OpError>>;
}

// ============================================================================
// ReconfigSlot
// ============================================================================

#[derive(Debug)]
struct SlotState {
    current_app: Option<String>,
    current_kind: ResourceKind,
    static_loaded: bool,
}

/// A partial-reconfiguration slot behind the [`Engine`] contract.
pub struct ReconfigSlot {
    slot_id: u32,
    name: String,
    static_shell: String,
    debug_logging: bool,
    shell: Arc<dyn Shell>,
    hw: Option<Arc<dyn HwKernel>>,
    state: Mutex<SlotState>,
    run_mu: Mutex<()>,
}

impl ReconfigSlot {
    pub fn new(slot_id: u32, shell: Arc<dyn Shell>) -> Self {
        Self {
            slot_id,
            name: format!("fpga-slot-{}", slot_id),
            static_shell: String::new(),
            debug_logging: false,
            shell,
            hw: None,
            state: Mutex::new(SlotState {
                current_app: None,
                current_kind: ResourceKind::Cpu,
                static_loaded: false,
            }),
            run_mu: Mutex::new(()),
        }
    }

    /// Static shell image loaded once by `prepare_static`.
    pub fn with_static_shell(mut self, reference: impl Into<String>) -> Self {
        self.static_shell = reference.into();
        self
    }

    pub fn with_debug_logging(mut self, on: bool) -> Self {
        self.debug_logging = on;
        self
    }

    /// Attach a dedicated hardware path.
    pub fn with_hw_kernel(mut self, hw: Arc<dyn HwKernel>) -> Self {
        self.hw = Some(hw);
        self
    }

    pub fn slot_id(&self) -> u32 {
        self.slot_id
    }

    /// Kind of the currently loaded overlay (`Cpu` when none).
    pub fn current_kind(&self) -> ResourceKind {
        lock_recover(&self.state).current_kind
    }

    /// Reconfigure if needed; caller must already hold (or be under) the run
    /// lock. Holds the config lock across the shell request.
    fn ensure_loaded_locked(&self, desc: &AppDescriptor) -> Result<(), OverlayError> {
        let mut state = lock_recover(&self.state);
        if state.current_app.as_deref() == Some(desc.name.as_str()) {
            return Ok(());
        }
        self.log_debug(&format!(
            "ensure_app_loaded app={} kind={} overlay={}",
            desc.name,
            desc.kind.label(),
            desc.overlay
        ));
        if !desc.overlay.is_empty() {
            if let Err(err) = self.shell.load(&desc.overlay) {
                self.log(&format!("failed to load {}: {}", desc.name, err));
                return Err(err);
            }
        }
        state.current_app = Some(desc.name.clone());
        state.current_kind = desc.kind;
        self.log(&format!("loaded {} (kind={})", desc.name, desc.kind.label()));
        Ok(())
    }

    fn log(&self, msg: &str) {
        eprintln!("[{}] {}", self.name, msg);
    }

    fn log_debug(&self, msg: &str) {
        if self.debug_logging {
            eprintln!("[{}] [debug] {}", self.name, msg);
        }
    }
}

impl Engine for ReconfigSlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.shell.is_available() || lock_recover(&self.state).current_app.is_some()
    }

    fn is_reconfigurable(&self) -> bool {
        true
    }

    fn prepare_static(&self) -> Result<(), OverlayError> {
        let mut state = lock_recover(&self.state);
        if state.static_loaded || self.static_shell.is_empty() {
            return Ok(());
        }
        self.log_debug(&format!("prepare_static shell={}", self.static_shell));
        if let Err(err) = self.shell.load(&self.static_shell) {
            self.log(&format!(
                "failed to load static shell {}: {}",
                self.static_shell, err
            ));
            return Err(err);
        }
        state.static_loaded = true;
        self.log(&format!("static shell loaded: {}", self.static_shell));
        Ok(())
    }

    /// Overlay swap from outside dispatch (selection probe, preload).
    ///
    /// Refused with `SlotBusy` while a task runs on this slot.
    fn ensure_app_loaded(&self, desc: &AppDescriptor) -> Result<(), OverlayError> {
        let _run = match self.run_mu.try_lock() {
            Ok(g) => g,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(OverlayError::SlotBusy),
        };
        self.ensure_loaded_locked(desc)
    }

    fn run(&self, task: &Task, desc: &AppDescriptor) -> ExecutionResult {
        let _run = lock_recover(&self.run_mu);
        self.log_debug(&format!("run task id={} app={}", task.id, task.app));

        if let Err(err) = self.ensure_loaded_locked(desc) {
            return ExecutionResult {
                id: task.id,
                ok: false,
                message: format!("failed to ensure {} on {}: {}", desc.name, self.name, err),
                runtime: Duration::ZERO,
                engine: self.name.clone(),
            };
        }

        let started = Instant::now();
        let (ok, message) = if task.payload.is_none() {
            let dur = if task.est_runtime > Duration::ZERO {
                task.est_runtime
            } else {
                DEFAULT_SLOT_SLEEP
            };
            thread::sleep(dur);
            (true, format!("executed {} on {}", desc.name, self.name))
        } else {
            match self.hw.as_ref().and_then(|hw| hw.execute(task)) {
                Some(Ok(message)) => (true, message),
                Some(Err(err)) => {
                    self.log_debug(&format!(
                        "hw path failed for task {} ({}), falling back to cpu body",
                        task.id, err
                    ));
                    let (ok, message) = run_operation_body(task, desc, &self.name);
                    (ok, format!("{} (cpu fallback)", message))
                }
                None => {
                    let (ok, message) = run_operation_body(task, desc, &self.name);
                    (ok, format!("{} (cpu fallback)", message))
                }
            }
        };

        ExecutionResult {
            id: task.id,
            ok,
            message,
            runtime: started.elapsed(),
            engine: self.name.clone(),
        }
    }

    fn current_app(&self) -> Option<String> {
        lock_recover(&self.state).current_app.clone()
    }
}
