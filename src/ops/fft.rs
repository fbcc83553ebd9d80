//! FFT Operation Body (reference DFT)
//!
//! Naive O(n²) discrete Fourier transform over interleaved complex f32
//! samples. Forward uses sign −1; inverse uses sign +1 and scales by 1/n.
//! Accumulation is in f64 to keep the reference numerically trustworthy for
//! the sizes the scheduler tests care about.
//!
//! A production engine may substitute a faster algorithm as long as results
//! agree within 1e-3 relative error for n up to 2^16.

use super::{FftContext, FftOutcome, OpError};

/// Run the fft body, storing the outcome in the context.
///
/// Returns the status message on success; on failure the error (stored with
/// the `"fft: "` prefix) is returned so the engine can report it.
pub fn execute(ctx: &FftContext) -> Result<String, OpError> {
    match run(ctx) {
        Ok(outcome) => {
            let message = outcome.message.clone();
            ctx.store(outcome);
            Ok(message)
        }
        Err(err) => {
            ctx.store(FftOutcome {
                ok: false,
                message: format!("fft: {}", err),
                output: Vec::new(),
            });
            Err(err)
        }
    }
}

fn run(ctx: &FftContext) -> Result<FftOutcome, OpError> {
    let in_floats = ctx.input.len();
    let out_floats = ctx.out_len;

    let n = if ctx.plan.n == 0 {
        in_floats.min(out_floats) / 2
    } else {
        ctx.plan.n
    };
    if n == 0 {
        return Err(OpError::PlanInvalid { n });
    }
    let need = 2 * n;
    if in_floats < need || out_floats < need {
        return Err(OpError::BufferSizes {
            need_floats: need,
            have_floats: in_floats.min(out_floats),
        });
    }

    let sign = if ctx.plan.inverse { 1.0f64 } else { -1.0f64 };
    let step = sign * std::f64::consts::TAU / n as f64;
    let scale = if ctx.plan.inverse { 1.0 / n as f64 } else { 1.0 };

    let mut output = vec![0.0f32; need];
    for k in 0..n {
        let mut re = 0.0f64;
        let mut im = 0.0f64;
        for j in 0..n {
            let angle = step * (k as f64) * (j as f64);
            let (sin, cos) = angle.sin_cos();
            let xr = ctx.input[2 * j] as f64;
            let xi = ctx.input[2 * j + 1] as f64;
            re += xr * cos - xi * sin;
            im += xr * sin + xi * cos;
        }
        output[2 * k] = (re * scale) as f32;
        output[2 * k + 1] = (im * scale) as f32;
    }

    Ok(FftOutcome {
        ok: true,
        message: format!("fft: computed n={}", n),
        output,
    })
}
