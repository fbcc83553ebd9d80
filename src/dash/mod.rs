//! DASH: Discovery Facade
//!
//! The client-facing side of the runtime: operation facades decouple an
//! operation name ("zip", "fft") from the engine that serves it. A
//! [`provider::ProviderRegistry`] declares which engine kinds can serve an
//! operation and in what preference order; [`client::DashClient`] builds the
//! task, submits it, and blocks on the [`completion::CompletionBus`] until
//! the scheduler fulfils the outcome.
//!
//! Everything here is an explicit handle; there is no process-global
//! scheduler state.

pub mod client;
pub mod completion;
pub mod provider;

pub use client::DashClient;
pub use completion::{Completion, CompletionBus};
pub use provider::{Provider, ProviderRegistry};
