//! Zip Operation Body
//!
//! One-shot zlib compress/decompress over a caller-owned context. The whole
//! input is consumed in a single `Finish` call, so the output either fits the
//! declared capacity or the run fails with the codec's buffer error; there is
//! no streaming or partial output.
//!
//! Compression level is clamped to [0, 9] silently.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use super::{OpError, ZipContext, ZipMode, ZipOutcome};

/// zlib `Z_DATA_ERROR`: malformed or corrupted stream.
const Z_DATA_ERROR: i32 = -3;
/// zlib `Z_BUF_ERROR`: output did not fit the declared capacity.
const Z_BUF_ERROR: i32 = -5;

/// Run the zip body, storing the outcome in the context.
///
/// Returns the status message on success so the engine can reuse it in the
/// execution result; on failure the error (already stored with the `"zip: "`
/// prefix) is returned for the same purpose.
pub fn execute(ctx: &ZipContext) -> Result<String, OpError> {
    match run(ctx) {
        Ok(outcome) => {
            let message = outcome.message.clone();
            ctx.store(outcome);
            Ok(message)
        }
        Err(err) => {
            ctx.store(ZipOutcome {
                ok: false,
                message: format!("zip: {}", err),
                output: Vec::new(),
                out_actual: 0,
            });
            Err(err)
        }
    }
}

fn run(ctx: &ZipContext) -> Result<ZipOutcome, OpError> {
    if ctx.input.is_empty() || ctx.out_capacity == 0 {
        return Err(OpError::MissingBuffers);
    }

    // `*_vec` helpers write only into spare capacity, so reserving exactly
    // `out_capacity` enforces the caller's bound.
    let mut output = Vec::with_capacity(ctx.out_capacity);

    let (status, verb) = match ctx.params.mode {
        ZipMode::Compress => {
            let level = ctx.params.level.clamp(0, 9) as u32;
            let mut codec = Compress::new(Compression::new(level), true);
            let status = codec
                .compress_vec(&ctx.input, &mut output, FlushCompress::Finish)
                .map_err(|_| OpError::Codec { code: Z_DATA_ERROR })?;
            (status, "compressed")
        }
        ZipMode::Decompress => {
            let mut codec = Decompress::new(true);
            let status = codec
                .decompress_vec(&ctx.input, &mut output, FlushDecompress::Finish)
                .map_err(|_| OpError::Codec { code: Z_DATA_ERROR })?;
            (status, "decompressed")
        }
    };

    match status {
        Status::StreamEnd => {}
        // Ok/BufError after Finish means the output ran out of room.
        Status::Ok | Status::BufError => return Err(OpError::Codec { code: Z_BUF_ERROR }),
    }

    let out_actual = output.len();
    Ok(ZipOutcome {
        ok: true,
        message: format!(
            "zip: {} ({} -> {})",
            verb,
            ctx.input.len(),
            out_actual
        ),
        output,
        out_actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::ZipParams;

    fn params(mode: ZipMode, level: i32) -> ZipParams {
        ZipParams { level, mode }
    }

    #[test]
    fn compress_then_decompress_round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog, twice over";

        let c = ZipContext::new(params(ZipMode::Compress, 6), data, 256);
        let msg = execute(&c).unwrap();
        assert!(msg.starts_with("zip: compressed ("));
        let compressed = c.outcome();
        assert!(compressed.ok);
        assert_eq!(compressed.out_actual, compressed.output.len());

        let d = ZipContext::new(params(ZipMode::Decompress, 0), &compressed.output, 256);
        execute(&d).unwrap();
        let plain = d.outcome();
        assert!(plain.ok);
        assert_eq!(&plain.output[..], &data[..]);
    }

    #[test]
    fn level_out_of_range_is_clamped() {
        let data = vec![0u8; 512];
        let hi = ZipContext::new(params(ZipMode::Compress, 42), &data, 256);
        assert!(execute(&hi).is_ok());
        let lo = ZipContext::new(params(ZipMode::Compress, -7), &data, 1024);
        assert!(execute(&lo).is_ok());
    }

    #[test]
    fn output_capacity_overflow_is_buf_error() {
        // Incompressible random-ish input into a tiny output window.
        let data: Vec<u8> = (0..4096u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        let ctx = ZipContext::new(params(ZipMode::Compress, 9), &data, 8);
        match execute(&ctx) {
            Err(OpError::Codec { code }) => assert_eq!(code, Z_BUF_ERROR),
            other => panic!("expected buf error, got {:?}", other),
        }
        let o = ctx.outcome();
        assert!(!o.ok);
        assert!(o.message.contains("zlib error -5"), "message: {}", o.message);
    }

    #[test]
    fn garbage_decompress_is_data_error() {
        let ctx = ZipContext::new(params(ZipMode::Decompress, 0), b"not a zlib stream", 256);
        match execute(&ctx) {
            Err(OpError::Codec { code }) => assert_eq!(code, Z_DATA_ERROR),
            other => panic!("expected data error, got {:?}", other),
        }
    }

    #[test]
    fn empty_input_rejected() {
        let ctx = ZipContext::new(params(ZipMode::Compress, 3), b"", 64);
        assert!(matches!(execute(&ctx), Err(OpError::MissingBuffers)));
        let ctx = ZipContext::new(params(ZipMode::Compress, 3), b"x", 0);
        assert!(matches!(execute(&ctx), Err(OpError::MissingBuffers)));
    }
}
