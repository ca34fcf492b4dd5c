//! Quantized GRU cell
//!
//! Input and recurrent weights are concatenated column-wise once at
//! construction, so one step is two GEMMs followed by a fused, table-driven
//! elementwise update.
//!
//! # Update
//!
//! With `RUH = x [W | Wx]` and `T = h [U | Ux]`, both `(rows, 3H)`, and every
//! operand harmonized into one total range, for hidden unit `i`:
//!
//! ```text
//! r    = sigmoid(RUH[i] + T[i] + b[i])                  (total range)
//! mul  = r * (T[2H+i] + bx2[i])
//! h~   = tanh(RUH[2H+i] + bx1[i] + mul)                 ([-1, 1])
//! u    = sigmoid(RUH[H+i] + T[H+i] + b[H+i])            ([-1, 1])
//! h'   = (1 - u) * h~ + u * h
//! ```

use crate::backend::ComputeBackend;
use crate::error::{NmtError, NmtResult};
use crate::gemm::{prod, GemmScratch};
use crate::harmonize::harmonize;
use crate::matrix::ops::concat_cols;
use crate::matrix::QMatrix;
use crate::quant::{qmul, qsub, qsum, qsum2, qsum3, quantize, LookupTable, QuantRange};

use super::weights::GruWeights;

/// Range every GRU state lives in
pub const STATE_RANGE: QuantRange = QuantRange::UNIT_SIGNED;

// ============================================================================
// Gate Tables
// ============================================================================

/// Lookup tables and fixed points for one harmonized total range
#[derive(Debug, Clone)]
pub struct GateTables {
    reset: LookupTable,
    update: LookupTable,
    candidate: LookupTable,
    zero_total: u8,
    one_total: u8,
    zero: u8,
    one: u8,
}

impl GateTables {
    /// Tables reading from `total`
    #[must_use]
    pub fn new(total: QuantRange) -> Self {
        Self {
            reset: LookupTable::sigmoid(total, total),
            update: LookupTable::sigmoid(total, STATE_RANGE),
            candidate: LookupTable::tanh(total, STATE_RANGE),
            zero_total: quantize(0.0, total),
            one_total: quantize(1.0, total),
            zero: quantize(0.0, STATE_RANGE),
            one: quantize(1.0, STATE_RANGE),
        }
    }
}

/// One row of harmonized GRU operands
#[derive(Debug, Clone, Copy)]
pub struct GateInputs<'a> {
    /// Input projection `3H`
    pub ruh: &'a [u8],
    /// State projection `3H`
    pub temp: &'a [u8],
    /// Reset/update bias `2H`
    pub b: &'a [u8],
    /// Candidate bias outside the reset gate `H`
    pub bx1: &'a [u8],
    /// Candidate bias inside the reset gate `H`
    pub bx2: &'a [u8],
    /// Previous state `H`, in [`STATE_RANGE`]
    pub state: &'a [u8],
}

/// Fused elementwise update of one row
pub fn update_row(tables: &GateTables, x: &GateInputs<'_>, out: &mut [u8]) {
    let hidden = out.len();
    let (zt, z, one) = (tables.zero_total, tables.zero, tables.one);
    for (i, dst) in out.iter_mut().enumerate() {
        let k = i + hidden;
        let reset = tables.reset.get(qsum3(zt, x.ruh[i], x.temp[i], x.b[i]));
        let mul = qmul(
            zt,
            tables.one_total,
            reset,
            qsum2(zt, x.temp[2 * hidden + i], x.bx2[i]),
        );
        let candidate = tables
            .candidate
            .get(qsum3(zt, x.ruh[2 * hidden + i], x.bx1[i], mul));
        let update = tables.update.get(qsum3(zt, x.ruh[k], x.temp[k], x.b[k]));
        *dst = qsum(
            z,
            &[
                qmul(z, one, qsub(z, one, update), candidate),
                qmul(z, one, update, x.state[i]),
            ],
        );
    }
}

// ============================================================================
// Cell
// ============================================================================

/// Reusable buffers for [`Gru::next_state`]
#[derive(Debug, Default)]
pub struct GruScratch {
    ruh: QMatrix,
    temp: QMatrix,
    b: QMatrix,
    bx1: QMatrix,
    bx2: QMatrix,
}

impl GruScratch {
    /// Empty scratch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// GRU cell with prepared weights
#[derive(Debug)]
pub struct Gru {
    wwx: QMatrix,
    uux: QMatrix,
    b: QMatrix,
    bx1: QMatrix,
    bx2: QMatrix,
    hidden: usize,
}

impl Gru {
    /// Concatenate `[W | Wx]` and `[U | Ux]` and keep the biases
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if the weight shapes disagree.
    pub fn new(weights: &GruWeights) -> NmtResult<Self> {
        let hidden = weights.hidden();
        let mut wwx = QMatrix::new();
        concat_cols(&weights.w, &weights.wx, &mut wwx)?;
        let mut uux = QMatrix::new();
        concat_cols(&weights.u, &weights.ux, &mut uux)?;
        if uux.shape() != (hidden, 3 * hidden) || wwx.cols() != 3 * hidden {
            return Err(NmtError::ShapeMismatch(format!(
                "gru weights {}x{} and {}x{} for hidden size {hidden}",
                wwx.rows(),
                wwx.cols(),
                uux.rows(),
                uux.cols()
            )));
        }
        let biases = [
            ("b", &weights.b, 2 * hidden),
            ("bx1", &weights.bx1, hidden),
            ("bx2", &weights.bx2, hidden),
        ];
        for (name, bias, cols) in biases {
            if bias.shape() != (1, cols) {
                return Err(NmtError::ShapeMismatch(format!(
                    "gru bias {name} is {}x{}, expected 1x{cols}",
                    bias.rows(),
                    bias.cols()
                )));
            }
        }
        let mut b = QMatrix::new();
        b.copy_from(&weights.b)?;
        let mut bx1 = QMatrix::new();
        bx1.copy_from(&weights.bx1)?;
        let mut bx2 = QMatrix::new();
        bx2.copy_from(&weights.bx2)?;
        Ok(Self {
            wwx,
            uux,
            b,
            bx1,
            bx2,
            hidden,
        })
    }

    /// Hidden size
    #[must_use]
    pub fn hidden(&self) -> usize {
        self.hidden
    }

    /// Width of the input context
    #[must_use]
    pub fn input(&self) -> usize {
        self.wwx.rows()
    }

    /// Advance `state` `(rows, H)` given `context` `(rows, in)` into `next`
    ///
    /// `state` must be in [`STATE_RANGE`]; `next` is left there too.
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] on inconsistent shapes.
    pub fn next_state(
        &self,
        backend: &dyn ComputeBackend,
        gemm: &mut GemmScratch,
        scratch: &mut GruScratch,
        state: &QMatrix,
        context: &QMatrix,
        next: &mut QMatrix,
    ) -> NmtResult<()> {
        if state.cols() != self.hidden || state.rows() != context.rows() {
            return Err(NmtError::ShapeMismatch(format!(
                "gru state {}x{} with context {}x{} for hidden size {}",
                state.rows(),
                state.cols(),
                context.rows(),
                context.cols(),
                self.hidden
            )));
        }
        let _guard = crate::trace_enter!("gru.next_state", rows = state.rows());

        let GruScratch {
            ruh,
            temp,
            b,
            bx1,
            bx2,
        } = scratch;
        prod(backend, gemm, context, false, &self.wwx, false, ruh)?;
        prod(backend, gemm, state, false, &self.uux, false, temp)?;
        b.copy_from(&self.b)?;
        bx1.copy_from(&self.bx1)?;
        bx2.copy_from(&self.bx2)?;
        let total = harmonize(&mut [&mut *ruh, &mut *temp, &mut *b, &mut *bx1, &mut *bx2]);
        let tables = GateTables::new(total);

        next.resize(state.rows(), self.hidden)?;
        next.set_range(STATE_RANGE);
        let (ruh, temp, b, bx1, bx2) = (&*ruh, &*temp, &*b, &*bx1, &*bx2);
        backend.map_rows(next.data_mut(), self.hidden, &|r, out: &mut [u8]| {
            let inputs = GateInputs {
                ruh: ruh.row(r),
                temp: temp.row(r),
                b: b.data(),
                bx1: bx1.data(),
                bx2: bx2.data(),
                state: state.row(r),
            };
            update_row(&tables, &inputs, out);
        });
        Ok(())
    }
}
