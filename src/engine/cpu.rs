//! CPU Worker Engine
//!
//! Always available, never reconfigurable. The operation body is selected by
//! the task's payload variant: zip and fft contexts run their reference
//! bodies in-thread; payload-less tasks sleep for `est_runtime` (the fallback
//! workloads the scheduler tests lean on).

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::ops;
use crate::registry::AppDescriptor;
use crate::task::{ExecutionResult, Task, TaskPayload};

use super::{Engine, OverlayError};

/// Sleep used for payload-less tasks with no runtime estimate.
const DEFAULT_BODY_SLEEP: Duration = Duration::from_millis(10);

/// Software execution engine; instantiate several to widen CPU parallelism.
#[derive(Debug)]
pub struct CpuEngine {
    name: String,
    // At most one run() in progress per engine instance.
    run_mu: Mutex<()>,
}

impl CpuEngine {
    pub fn new(id: u32) -> Self {
        Self {
            name: format!("cpu-{}", id),
            run_mu: Mutex::new(()),
        }
    }
}

impl Engine for CpuEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        true
    }

    fn ensure_app_loaded(&self, _desc: &AppDescriptor) -> Result<(), OverlayError> {
        Ok(())
    }

    fn run(&self, task: &Task, desc: &AppDescriptor) -> ExecutionResult {
        let _run = match self.run_mu.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let started = Instant::now();
        let (ok, message) = run_operation_body(task, desc, &self.name);
        ExecutionResult {
            id: task.id,
            ok,
            message,
            runtime: started.elapsed(),
            engine: self.name.clone(),
        }
    }
}

/// Dispatch the task's payload to its operation body.
///
/// Shared with the slot engine, which uses it as the documented CPU fallback
/// path when no dedicated hardware path serves the app.
pub(crate) fn run_operation_body(task: &Task, desc: &AppDescriptor, engine: &str) -> (bool, String) {
    match &task.payload {
        TaskPayload::Zip(ctx) => match ops::zip::execute(ctx) {
            Ok(message) => (true, message),
            Err(_) => (false, ctx.outcome().message),
        },
        TaskPayload::Fft(ctx) => match ops::fft::execute(ctx) {
            Ok(message) => (true, message),
            Err(_) => (false, ctx.outcome().message),
        },
        TaskPayload::None => {
            let dur = if task.est_runtime > Duration::ZERO {
                task.est_runtime
            } else {
                DEFAULT_BODY_SLEEP
            };
            thread::sleep(dur);
            (true, format!("executed {} on {}", desc.name, engine))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{FftContext, FftPlan, ZipContext, ZipMode, ZipParams};
    use std::sync::Arc;

    fn echo_desc() -> AppDescriptor {
        AppDescriptor::cpu("echo")
    }

    #[test]
    fn payloadless_task_sleeps_and_succeeds() {
        let engine = CpuEngine::new(0);
        let task = Task::new(1, "echo").with_est_runtime(Duration::from_millis(2));
        let r = engine.run(&task, &echo_desc());
        assert!(r.ok);
        assert_eq!(r.id, 1);
        assert!(r.engine.starts_with("cpu-"));
        assert!(r.runtime >= Duration::from_millis(2));
        assert_eq!(r.message, "executed echo on cpu-0");
    }

    #[test]
    fn zip_payload_runs_codec() {
        let engine = CpuEngine::new(3);
        let ctx = Arc::new(ZipContext::new(
            ZipParams::default(),
            b"abcabcabcabcabcabc",
            128,
        ));
        let task = Task::new(2, "zip").with_payload(TaskPayload::Zip(Arc::clone(&ctx)));
        let r = engine.run(&task, &echo_desc());
        assert!(r.ok);
        assert!(r.message.starts_with("zip: compressed"));
        assert!(ctx.outcome().ok);
    }

    #[test]
    fn fft_payload_runs_dft() {
        let engine = CpuEngine::new(4);
        let input = vec![1.0f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let ctx = Arc::new(FftContext::new(FftPlan::default(), &input, input.len()));
        let task = Task::new(3, "fft").with_payload(TaskPayload::Fft(Arc::clone(&ctx)));
        let r = engine.run(&task, &echo_desc());
        assert!(r.ok);
        assert_eq!(r.message, "fft: computed n=4");
    }

    #[test]
    fn bad_payload_fails_without_panicking() {
        let engine = CpuEngine::new(5);
        let ctx = Arc::new(ZipContext::new(ZipParams::default(), b"", 64));
        let task = Task::new(4, "zip").with_payload(TaskPayload::Zip(ctx));
        let r = engine.run(&task, &echo_desc());
        assert!(!r.ok);
        assert!(r.message.contains("buffers missing"), "{}", r.message);
    }

    #[test]
    fn ensure_app_loaded_is_noop() {
        let engine = CpuEngine::new(6);
        assert!(engine.ensure_app_loaded(&echo_desc()).is_ok());
        assert!(engine.is_available());
        assert!(!engine.is_reconfigurable());
        assert_eq!(engine.current_app(), None);
    }
}
