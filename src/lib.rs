//! Heterogeneous task scheduler with a discovery facade.
//!
//! Dispatches application operations onto a pool of execution engines: CPU
//! workers and reconfigurable hardware slots whose active app is switched by
//! loading a partial overlay image. Clients go through DASH, which decouples
//! the operation name ("zip", "fft") from the engine that runs it.
//!
//! High-level flow (one operation):
//! 1) A facade resolves the operation's preferred provider kind.
//! 2) A task carrying the typed operation context is submitted.
//! 3) The scheduler admits it (ready or waiting on dependencies/release).
//! 4) A worker pops the highest-priority ready task and selects an engine:
//!    a slot already holding the app, a slot that can load it, or a CPU
//!    engine as fallback.
//! 5) The engine runs the operation body and the scheduler reports the
//!    single result, unblocking the facade through the completion bus.
//!
//! Board-bringup utilities and concrete application plugins stay outside;
//! the crate reaches them only through the [`engine::Engine`] contract and
//! its [`engine::slot::Shell`] / [`engine::slot::HwKernel`] seams.

pub mod dash;
pub mod engine;
pub mod ops;
pub mod registry;
pub mod scheduler;
pub mod task;

pub use dash::{DashClient, Provider, ProviderRegistry};
pub use engine::Engine;
pub use registry::{AppDescriptor, ApplicationRegistry};
pub use scheduler::{BackendMode, Scheduler, SchedulerConfig};
pub use task::{ExecutionResult, ResourceKind, Task, TaskId, TaskPayload};
