//! Engine Abstraction
//!
//! # Purpose
//!
//! One contract over every execution engine the scheduler can dispatch to:
//! software CPU workers and reconfigurable hardware slots. The scheduler
//! owns engines as `Arc<dyn Engine>` and never reaches past this trait;
//! board-bringup collaborators live behind [`slot::Shell`] and
//! [`slot::HwKernel`].
//!
//! # Thread Safety Model
//!
//! Engines are shared across worker threads. At most one `run()` is in
//! progress on a given engine at any moment; each implementation enforces
//! this with an internal run lock. `ensure_app_loaded` on a slot refuses to
//! swap the overlay while a run is in progress ([`OverlayError::SlotBusy`]),
//! so a slot that is mid-run never changes its current app.

pub mod cpu;
pub mod slot;

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::registry::AppDescriptor;
use crate::task::{ExecutionResult, Task};

// ============================================================================
// OverlayError
// ============================================================================

/// Failures while preparing a slot for an app (static shell or overlay).
#[derive(Debug)]
#[non_exhaustive]
pub enum OverlayError {
    /// The slot is executing a task; the overlay cannot change mid-run.
    SlotBusy,
    /// Writing the decouple control line failed.
    ControlLine(io::Error),
    /// The reconfiguration request to the shell manager failed.
    Manager { path: PathBuf, source: io::Error },
    /// The shell refused the load (mock failure injection, bad reference).
    Rejected { reason: String },
}

impl fmt::Display for OverlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayError::SlotBusy => write!(f, "slot busy"),
            OverlayError::ControlLine(e) => write!(f, "decouple control line: {}", e),
            OverlayError::Manager { path, source } => {
                write!(f, "manager {}: {}", path.display(), source)
            }
            OverlayError::Rejected { reason } => write!(f, "load rejected: {}", reason),
        }
    }
}

impl std::error::Error for OverlayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OverlayError::ControlLine(e) => Some(e),
            OverlayError::Manager { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ============================================================================
// Engine trait
// ============================================================================

/// Uniform contract over CPU workers and reconfigurable hardware slots.
///
/// Object-safe; the scheduler stores `Arc<dyn Engine>` and selects using
/// `is_reconfigurable` / `current_app` / `is_available` only.
pub trait Engine: Send + Sync {
    /// Stable engine name; CPU engines start with `"cpu-"`.
    fn name(&self) -> &str;

    /// Whether the engine can accept work right now.
    fn is_available(&self) -> bool;

    /// Whether the engine hosts loadable overlays.
    fn is_reconfigurable(&self) -> bool {
        false
    }

    /// One-time static shell load; no-op unless reconfigurable. Idempotent.
    fn prepare_static(&self) -> Result<(), OverlayError> {
        Ok(())
    }

    /// Make the engine able to execute `desc`'s app, reconfiguring if the
    /// current overlay differs. No-op on CPU engines and on a slot already
    /// holding the app.
    fn ensure_app_loaded(&self, desc: &AppDescriptor) -> Result<(), OverlayError>;

    /// Execute the task. Synchronous; blocks for the operation's natural
    /// duration. Operation failures come back as `ok = false`, never as a
    /// panic.
    fn run(&self, task: &Task, desc: &AppDescriptor) -> ExecutionResult;

    /// App currently loaded, for selection and preloading. `None` on CPU
    /// engines and on slots with no overlay yet.
    fn current_app(&self) -> Option<String> {
        None
    }
}
