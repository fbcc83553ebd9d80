//! Operation Facades
//!
//! Synchronous client entry points: each facade resolves the operation's
//! preferred provider, builds a task carrying the typed context, submits it,
//! and blocks on the completion bus. The boolean return mirrors the task's
//! reported outcome; operation output lands in the caller's buffers.
//!
//! Ids issued here start at [`DASH_ID_BASE`] so they never collide with
//! hand-numbered tasks submitted directly to the scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::ops::{FftContext, FftPlan, ZipContext, ZipParams};
use crate::scheduler::Scheduler;
use crate::task::{Task, TaskId, TaskPayload};

use super::completion::CompletionBus;
use super::provider::ProviderRegistry;

/// First task id issued by a client; direct submitters stay below this.
pub const DASH_ID_BASE: TaskId = 1 << 32;

/// Advisory runtime hints passed with facade-built tasks.
const ZIP_EST_RUNTIME: Duration = Duration::from_millis(12);
const FFT_EST_RUNTIME: Duration = Duration::from_millis(15);

/// Client handle bundling the scheduler, the provider table, and the
/// completion bus. Cheap to clone; one per client is typical.
#[derive(Clone)]
pub struct DashClient {
    scheduler: Scheduler,
    providers: Arc<ProviderRegistry>,
    bus: Arc<CompletionBus>,
    next_id: Arc<AtomicU64>,
}

impl DashClient {
    pub fn new(scheduler: Scheduler, providers: Arc<ProviderRegistry>) -> Self {
        let bus = scheduler.completion_bus();
        Self {
            scheduler,
            providers,
            bus,
            next_id: Arc::new(AtomicU64::new(DASH_ID_BASE)),
        }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    fn allocate_id(&self) -> TaskId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Compress or decompress `input` into `out`.
    ///
    /// Returns `false` without submitting when no provider serves "zip".
    /// On success `out_actual` is the produced byte count and
    /// `out[..out_actual]` holds the data.
    pub fn zip_execute(
        &self,
        params: &ZipParams,
        input: &[u8],
        out: &mut [u8],
        out_actual: &mut usize,
    ) -> bool {
        let Some(kind) = self.providers.preferred_kind("zip") else {
            return false;
        };

        let ctx = Arc::new(ZipContext::new(*params, input, out.len()));
        let id = self.allocate_id();
        let task = Task::new(id, "zip")
            .with_required(kind)
            .with_est_runtime(ZIP_EST_RUNTIME)
            .with_payload(TaskPayload::Zip(Arc::clone(&ctx)));

        let completion = self.bus.subscribe(id);
        self.scheduler.submit(task);
        let ok = completion.wait();

        let outcome = ctx.outcome();
        if outcome.ok {
            let n = outcome.out_actual.min(out.len());
            out[..n].copy_from_slice(&outcome.output[..n]);
            *out_actual = outcome.out_actual;
        } else {
            *out_actual = 0;
        }
        ok && outcome.ok
    }

    /// Run a forward or inverse transform over interleaved complex samples.
    ///
    /// Returns `false` without submitting when no provider serves "fft".
    pub fn fft_execute(&self, plan: &FftPlan, input: &[f32], out: &mut [f32]) -> bool {
        let Some(kind) = self.providers.preferred_kind("fft") else {
            return false;
        };

        let ctx = Arc::new(FftContext::new(*plan, input, out.len()));
        let id = self.allocate_id();
        let task = Task::new(id, "fft")
            .with_required(kind)
            .with_est_runtime(FFT_EST_RUNTIME)
            .with_payload(TaskPayload::Fft(Arc::clone(&ctx)));

        let completion = self.bus.subscribe(id);
        self.scheduler.submit(task);
        let ok = completion.wait();

        let outcome = ctx.outcome();
        if outcome.ok {
            let n = outcome.output.len().min(out.len());
            out[..n].copy_from_slice(&outcome.output[..n]);
        }
        ok && outcome.ok
    }
}
