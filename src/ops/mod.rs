//! Operation Contexts
//!
//! # Purpose
//!
//! Typed request/outcome objects attached to tasks as payloads. A context
//! owns its input bytes and declares the output capacity the caller can
//! accept; the engine that runs the task writes the outcome exactly once
//! through the interior lock. The submitting client keeps an `Arc` clone, so
//! the context outlives the task unconditionally.
//!
//! # Contract
//!
//! - One engine `run` writes a given context (dispatch is exactly-once and
//!   serialized per engine).
//! - Output never exceeds the declared capacity; overflow surfaces as the
//!   codec's buffer error, never as a larger allocation.
//! - `outcome()` is meaningful only after the task's completion is observed
//!   (via the completion bus or the result sink).

pub mod fft;
pub mod zip;

use std::fmt;
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// OpError
// ============================================================================

/// Failures of an operation body's preconditions or codec.
///
/// Bodies prefix the operation name when turning these into messages
/// (`"zip: …"`, `"fft: …"`), so `Display` stays op-neutral.
#[derive(Debug)]
#[non_exhaustive]
pub enum OpError {
    /// Input empty or output capacity zero.
    MissingBuffers,
    /// Buffers too small for the requested sample count.
    BufferSizes { need_floats: usize, have_floats: usize },
    /// Derived or requested sample count is unusable.
    PlanInvalid { n: usize },
    /// Codec-internal failure; `code` follows zlib conventions
    /// (-3 data error, -5 buffer error).
    Codec { code: i32 },
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpError::MissingBuffers => write!(f, "buffers missing"),
            OpError::BufferSizes {
                need_floats,
                have_floats,
            } => write!(
                f,
                "buffer sizes insufficient (need {} floats, have {})",
                need_floats, have_floats
            ),
            OpError::PlanInvalid { n } => write!(f, "plan invalid (n={})", n),
            OpError::Codec { code } => write!(f, "zlib error {}", code),
        }
    }
}

impl std::error::Error for OpError {}

/// Lock with poison recovery: an outcome struct is plain data and stays
/// usable after a writer panicked.
fn lock_recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ============================================================================
// ZIP context
// ============================================================================

/// Compress or decompress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZipMode {
    Compress,
    Decompress,
}

/// Knobs for the zip body. `level` is clamped to [0, 9] silently.
#[derive(Clone, Copy, Debug)]
pub struct ZipParams {
    pub level: i32,
    pub mode: ZipMode,
}

impl Default for ZipParams {
    fn default() -> Self {
        Self {
            level: 3,
            mode: ZipMode::Compress,
        }
    }
}

/// Outcome of a zip run; `out_actual` is the produced byte count.
#[derive(Clone, Debug, Default)]
pub struct ZipOutcome {
    pub ok: bool,
    pub message: String,
    pub output: Vec<u8>,
    pub out_actual: usize,
}

/// Request context for the zip operation.
#[derive(Debug)]
pub struct ZipContext {
    pub params: ZipParams,
    pub input: Box<[u8]>,
    pub out_capacity: usize,
    outcome: Mutex<ZipOutcome>,
}

impl ZipContext {
    pub fn new(params: ZipParams, input: &[u8], out_capacity: usize) -> Self {
        Self {
            params,
            input: input.into(),
            out_capacity,
            outcome: Mutex::new(ZipOutcome::default()),
        }
    }

    /// Snapshot of the outcome; meaningful after completion is observed.
    pub fn outcome(&self) -> ZipOutcome {
        lock_recover(&self.outcome).clone()
    }

    pub(crate) fn store(&self, outcome: ZipOutcome) {
        *lock_recover(&self.outcome) = outcome;
    }
}

// ============================================================================
// FFT context
// ============================================================================

/// Transform plan. `n == 0` derives the sample count from the smaller of the
/// two buffers.
#[derive(Clone, Copy, Debug, Default)]
pub struct FftPlan {
    /// Complex sample count; samples are interleaved (re, im) f32 pairs.
    pub n: usize,
    pub inverse: bool,
}

/// Outcome of an fft run; `output` holds `2 * n` interleaved floats.
#[derive(Clone, Debug, Default)]
pub struct FftOutcome {
    pub ok: bool,
    pub message: String,
    pub output: Vec<f32>,
}

/// Request context for the fft operation.
#[derive(Debug)]
pub struct FftContext {
    pub plan: FftPlan,
    /// Interleaved (re, im) input samples.
    pub input: Box<[f32]>,
    /// Caller's output capacity in floats.
    pub out_len: usize,
    outcome: Mutex<FftOutcome>,
}

impl FftContext {
    pub fn new(plan: FftPlan, input: &[f32], out_len: usize) -> Self {
        Self {
            plan,
            input: input.into(),
            out_len,
            outcome: Mutex::new(FftOutcome::default()),
        }
    }

    /// Snapshot of the outcome; meaningful after completion is observed.
    pub fn outcome(&self) -> FftOutcome {
        lock_recover(&self.outcome).clone()
    }

    pub(crate) fn store(&self, outcome: FftOutcome) {
        *lock_recover(&self.outcome) = outcome;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_params_default() {
        let p = ZipParams::default();
        assert_eq!(p.level, 3);
        assert_eq!(p.mode, ZipMode::Compress);
    }

    #[test]
    fn outcome_starts_empty() {
        let ctx = ZipContext::new(ZipParams::default(), b"abc", 64);
        let o = ctx.outcome();
        assert!(!o.ok);
        assert!(o.output.is_empty());
        assert_eq!(o.out_actual, 0);
    }

    #[test]
    fn op_error_display() {
        assert_eq!(OpError::Codec { code: -5 }.to_string(), "zlib error -5");
        assert_eq!(OpError::MissingBuffers.to_string(), "buffers missing");
    }
}
