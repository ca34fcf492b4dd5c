//! Table-driven row softmax
//!
//! Exponentials come from an [`ExpTable`] built for the input range, so each
//! numerator is `exp(x - range.max)` and never overflows. Rows may be
//! restricted to a valid prefix; masked positions get probability zero.

use crate::backend::ComputeBackend;
use crate::error::{NmtError, NmtResult};
use crate::matrix::{FloatMatrix, QMatrix};
use crate::quant::{quantize, ExpTable, QuantRange};

/// Floor applied before taking the logarithm of a probability
pub const MIN_PROBABILITY: f64 = 1e-30;

/// Normalized probabilities of the first `valid` levels of `row`
///
/// Falls back to a uniform distribution when every numerator underflows.
fn row_probabilities<'a>(
    table: &'a ExpTable,
    row: &'a [u8],
    valid: usize,
) -> impl Iterator<Item = f64> + 'a {
    let valid = valid.min(row.len());
    let sum: f64 = row[..valid].iter().map(|&q| table.get(q)).sum();
    #[allow(clippy::cast_precision_loss)]
    let uniform = if valid == 0 { 0.0 } else { 1.0 / valid as f64 };
    row.iter().enumerate().map(move |(i, &q)| {
        if i >= valid {
            0.0
        } else if sum > 0.0 {
            table.get(q) / sum
        } else {
            uniform
        }
    })
}

/// Row softmax of `input` into `out`, quantized in `[0, 1]`
///
/// `valid[r]` is the number of leading positions of row `r` that take part.
///
/// # Errors
///
/// Returns [`NmtError::ShapeMismatch`] if `valid` does not have one entry
/// per row.
pub fn softmax_rows(
    backend: &dyn ComputeBackend,
    input: &QMatrix,
    valid: &[usize],
    out: &mut QMatrix,
) -> NmtResult<()> {
    if valid.len() != input.rows() {
        return Err(NmtError::ShapeMismatch(format!(
            "{} mask rows for {} softmax rows",
            valid.len(),
            input.rows()
        )));
    }
    let table = ExpTable::new(input.range());
    out.resize(input.rows(), input.cols())?;
    out.set_range(QuantRange::UNIT);
    backend.map_rows(out.data_mut(), input.cols(), &|r, dst: &mut [u8]| {
        for (q, p) in dst
            .iter_mut()
            .zip(row_probabilities(&table, input.row(r), valid[r]))
        {
            #[allow(clippy::cast_possible_truncation)]
            let p = p as f32;
            *q = quantize::<u8>(p, QuantRange::UNIT);
        }
    });
    Ok(())
}

/// Row log-softmax of `input` into `out`
///
/// Probabilities are floored at [`MIN_PROBABILITY`] before the logarithm.
///
/// # Errors
///
/// Returns [`NmtError::Allocation`] if `out` cannot grow.
pub fn log_softmax_rows(input: &QMatrix, out: &mut FloatMatrix) -> NmtResult<()> {
    let table = ExpTable::new(input.range());
    out.resize(input.rows(), input.cols())?;
    for r in 0..input.rows() {
        let row = input.row(r);
        for (dst, p) in out
            .row_mut(r)
            .iter_mut()
            .zip(row_probabilities(&table, row, row.len()))
        {
            #[allow(clippy::cast_possible_truncation)]
            let lp = p.max(MIN_PROBABILITY).ln() as f32;
            *dst = lp;
        }
    }
    Ok(())
}
