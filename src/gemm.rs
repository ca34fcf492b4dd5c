//! Quantized GEMM
//!
//! `C = op(A) x op(B)` on `u8` operands:
//!
//! 1. Zero points of both operands become offsets subtracted on the fly
//! 2. The backend accumulates exact integer products into an `i32` matrix
//! 3. The accumulator range follows analytically from the operand ranges
//! 4. [`shrink_range`] scans the accumulator for its actual extent and
//!    requantizes it into the narrow `u8` output
//!
//! [`prod`] adds the operand-swap heuristic: when `B` is wider than `A` is
//! tall the product is computed as `(Bᵀ Aᵀ)ᵀ`, which yields the same levels.

use crate::backend::{ComputeBackend, GemmOperand, GemmProblem};
use crate::error::{NmtError, NmtResult};
use crate::matrix::{QMatrix, WideMatrix};
use crate::quant::{dequantize, quantize_unclamped, range_for_product, requantize_many, QuantRange};
use crate::simd;

/// Reusable accumulator for [`qgemm`]
#[derive(Debug, Default)]
pub struct GemmScratch {
    accumulator: WideMatrix,
}

impl GemmScratch {
    /// Empty scratch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator left by the most recent product
    #[must_use]
    pub fn accumulator(&self) -> &WideMatrix {
        &self.accumulator
    }
}

fn zero_offset(range: QuantRange) -> i64 {
    quantize_unclamped::<u8>(0.0, range).clamp(i64::from(i32::MIN), i64::from(i32::MAX))
}

fn operand(m: &QMatrix, transposed: bool) -> GemmOperand<'_> {
    GemmOperand {
        data: m.data(),
        rows: m.rows(),
        cols: m.cols(),
        transposed,
        offset: zero_offset(m.range()),
    }
}

/// Quantized `out = op(a) x op(b)`, stored transposed when `trans_c` is set
///
/// # Errors
///
/// Returns [`NmtError::ShapeMismatch`] if the inner dimensions differ and
/// [`NmtError::Allocation`] if a buffer cannot grow.
#[allow(clippy::too_many_arguments)]
pub fn qgemm(
    backend: &dyn ComputeBackend,
    scratch: &mut GemmScratch,
    a: &QMatrix,
    trans_a: bool,
    b: &QMatrix,
    trans_b: bool,
    trans_c: bool,
    out: &mut QMatrix,
) -> NmtResult<()> {
    let problem = GemmProblem {
        a: operand(a, trans_a),
        b: operand(b, trans_b),
        trans_c,
    };
    if problem.k() != problem.b.op_rows() {
        return Err(NmtError::ShapeMismatch(format!(
            "gemm {}x{} by {}x{}",
            problem.m(),
            problem.k(),
            problem.b.op_rows(),
            problem.n()
        )));
    }
    let _guard = crate::trace_enter!("qgemm", m = problem.m(), k = problem.k(), n = problem.n());

    let (rows, cols) = problem.output_shape();
    let acc = &mut scratch.accumulator;
    acc.resize(rows, cols)?;
    backend.multiply_accumulate(&problem, acc.data_mut());
    acc.set_range(range_for_product(a.range(), b.range()));
    shrink_range(acc, out)
}

/// Requantize a wide accumulator into `out` using its actual extent
///
/// The lower bound is clamped to at most zero so the result keeps a zero
/// point; the upper bound is the largest value present.
///
/// # Errors
///
/// Returns [`NmtError::Allocation`] if `out` cannot grow.
pub fn shrink_range(wide: &WideMatrix, out: &mut QMatrix) -> NmtResult<()> {
    let (lo, hi) = wide
        .data()
        .iter()
        .fold((i32::MAX, i32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    out.resize(wide.rows(), wide.cols())?;
    if wide.is_empty() {
        out.set_range(QuantRange::ZERO);
        return Ok(());
    }
    let min = dequantize(lo, wide.range()).min(0.0);
    let max = dequantize(hi, wide.range());
    let range = QuantRange::new(min, max);
    requantize_many(wide.data(), wide.range(), range, out.data_mut());
    out.set_range(range);
    Ok(())
}

/// Product with the operand-swap heuristic on stored shapes
///
/// When `b.cols() > a.rows()` this computes `qgemm(b, !trans_b, a, !trans_a)`
/// with a transposed output, which stores the same `op(a) x op(b)`.
///
/// # Errors
///
/// See [`qgemm`].
#[allow(clippy::too_many_arguments)]
pub fn prod(
    backend: &dyn ComputeBackend,
    scratch: &mut GemmScratch,
    a: &QMatrix,
    trans_a: bool,
    b: &QMatrix,
    trans_b: bool,
    out: &mut QMatrix,
) -> NmtResult<()> {
    if b.cols() > a.rows() {
        qgemm(backend, scratch, b, !trans_b, a, !trans_a, true, out)
    } else {
        qgemm(backend, scratch, a, trans_a, b, trans_b, false, out)
    }
}

/// Float product of the dequantized operands, `(rows, cols, values)`
///
/// Reference for accuracy checks and the benchmark driver.
///
/// # Errors
///
/// Returns [`NmtError::ShapeMismatch`] if the inner dimensions differ.
pub fn reference_prod(
    a: &QMatrix,
    trans_a: bool,
    b: &QMatrix,
    trans_b: bool,
) -> NmtResult<(usize, usize, Vec<f32>)> {
    let mut fa = a.to_f32();
    let (mut ar, mut ac) = a.shape();
    if trans_a {
        fa = simd::transpose(&fa, ar, ac);
        std::mem::swap(&mut ar, &mut ac);
    }
    let mut fb = b.to_f32();
    let (mut br, mut bc) = b.shape();
    if trans_b {
        fb = simd::transpose(&fb, br, bc);
        std::mem::swap(&mut br, &mut bc);
    }
    if ac != br {
        return Err(NmtError::ShapeMismatch(format!(
            "reference product {ar}x{ac} by {br}x{bc}"
        )));
    }
    Ok((ar, bc, simd::matmul(&fa, &fb, ar, ac, bc)))
}
