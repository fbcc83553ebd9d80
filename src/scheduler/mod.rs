//! Scheduler Runtime
//!
//! # Overview
//!
//! Dependency-aware admission into a priority ready queue, multi-worker
//! dispatch across heterogeneous engines, reconfigurable-slot selection with
//! CPU fallback, demand-driven overlay preloading, and serialized result
//! reporting.
//!
//! # Architecture
//!
//! ```text
//!                       ┌───────────────────────────────────────────────┐
//!                       │                  Scheduler                    │
//!  submit(task) ────────┤                                               │
//!                       │  deps unsatisfied         deps satisfied      │
//!                       │  or release pending       and released        │
//!                       │        │                       │              │
//!                       │        ▼                       ▼              │
//!                       │   Waiting list ──watcher──► ReadyQueue        │
//!                       │   (1 ms scan)               (priority heap)   │
//!                       │                                │              │
//!                       │                 ┌──────────────┼─────────┐    │
//!                       │                 ▼              ▼         ▼    │
//!                       │             Worker 0       Worker 1 … Worker N│
//!                       │                 │ select engine (slots, CPU)  │
//!                       │                 ▼                             │
//!                       │          Engine::run ──► report ──► bus      │
//!                       │                                               │
//!                       │   per-app ready counts ──► preloader thread   │
//!                       └───────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ready_queue`] | Condvar-protected priority heap with shutdown signal |
//! | [`deps`] | Completed/failed id sets and the readiness predicate |
//! | [`report`] | Serialized result emission (human or CSV) |
//! | [`core`] | Admission, promotion, dispatch, selection, preloading |

pub mod core;
pub mod deps;
pub mod ready_queue;
pub mod report;

pub use core::{BackendMode, Scheduler, SchedulerConfig};
pub use deps::{DepStatus, DependencyManager};
pub use ready_queue::ReadyQueue;
pub use report::{CollectingSink, ResultSink, TextSink};
