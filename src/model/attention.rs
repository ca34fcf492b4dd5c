//! Additive attention over the encoded source
//!
//! For decoder row `j` attending over sentence `s(j)`:
//!
//! ```text
//! e[j, t] = v · tanh(SC[s(j), t] Wc + h[j] W + b) + c
//! a[j]    = softmax(e[j, 0..len(s(j))])
//! ctx[j]  = sum_t a[j, t] SC[s(j), t]
//! ```
//!
//! The source projection `SC Wc` depends only on the source and is computed
//! once per batch by [`Attention::project_source`].

use super::encoder::SourceContext;
use super::weights::AttentionWeights;
use crate::backend::ComputeBackend;
use crate::error::{NmtError, NmtResult};
use crate::gemm::{prod, GemmScratch};
use crate::harmonize::harmonize;
use crate::matrix::QMatrix;
use crate::quant::{qsum2, qsum3, quantize, LookupTable, QuantRange};
use crate::softmax::softmax_rows;

/// Reusable buffers for [`Attention::align`]
#[derive(Debug, Default)]
pub struct AttentionScratch {
    source: QMatrix,
    state: QMatrix,
    bias: QMatrix,
    expanded: QMatrix,
    logits: QMatrix,
    scalar: QMatrix,
    block: QMatrix,
    valid: Vec<usize>,
}

impl AttentionScratch {
    /// Empty scratch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Attention parameters
#[derive(Debug)]
pub struct Attention {
    weights: AttentionWeights,
}

impl Attention {
    /// Wrap loaded weights
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if the weights disagree.
    pub fn new(weights: AttentionWeights) -> NmtResult<Self> {
        let ctx = weights.u.rows();
        if weights.u.cols() != ctx
            || weights.w.cols() != ctx
            || weights.b.shape() != (1, ctx)
            || weights.v.shape() != (ctx, 1)
            || weights.c.shape() != (1, 1)
        {
            return Err(NmtError::ShapeMismatch(format!(
                "attention weights for a {ctx}-wide context"
            )));
        }
        Ok(Self { weights })
    }

    /// `SC Wc` for every context row
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if the context width is wrong.
    pub fn project_source(
        &self,
        backend: &dyn ComputeBackend,
        gemm: &mut GemmScratch,
        source: &SourceContext,
        out: &mut QMatrix,
    ) -> NmtResult<()> {
        prod(backend, gemm, source.matrix(), false, &self.weights.u, false, out)
    }

    /// Alignment of every decoder row and the aligned context
    ///
    /// `sentence_of[j]` names the source sentence decoder row `j` belongs to.
    /// Writes `attention` `(rows, max_len)` in `[0, 1]` and `aligned`
    /// `(rows, 2H)`.
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] on inconsistent shapes or an
    /// unknown sentence index.
    #[allow(clippy::too_many_arguments)]
    pub fn align(
        &self,
        backend: &dyn ComputeBackend,
        gemm: &mut GemmScratch,
        scratch: &mut AttentionScratch,
        source: &SourceContext,
        projected: &QMatrix,
        state: &QMatrix,
        sentence_of: &[usize],
        attention: &mut QMatrix,
        aligned: &mut QMatrix,
    ) -> NmtResult<()> {
        let rows = state.rows();
        let max_len = source.max_len();
        let batch = source.batch_size();
        let ctx = self.weights.u.cols();
        if sentence_of.len() != rows || projected.shape() != (batch * max_len, ctx) {
            return Err(NmtError::ShapeMismatch(format!(
                "{} sentence indices and {}x{} projection for {rows} rows over {batch}x{max_len}",
                sentence_of.len(),
                projected.rows(),
                projected.cols()
            )));
        }
        if let Some(&bad) = sentence_of.iter().find(|&&s| s >= batch) {
            return Err(NmtError::ShapeMismatch(format!(
                "sentence {bad} out of {batch}"
            )));
        }

        let AttentionScratch {
            source: src,
            state: st,
            bias,
            expanded,
            logits,
            scalar,
            block,
            valid,
        } = scratch;

        // e = v . tanh(SC Wc + h W + b)
        prod(backend, gemm, state, false, &self.weights.w, false, st)?;
        src.copy_from(projected)?;
        bias.copy_from(&self.weights.b)?;
        let total = harmonize(&mut [&mut *src, &mut *st, &mut *bias]);
        let zero = quantize::<u8>(0.0, total);
        let tanh = LookupTable::tanh(total, QuantRange::UNIT_SIGNED);

        expanded.resize(rows * max_len, ctx)?;
        expanded.set_range(QuantRange::UNIT_SIGNED);
        {
            let (src, st, bias) = (&*src, &*st, bias.data());
            backend.map_rows(expanded.data_mut(), ctx, &|r, out: &mut [u8]| {
                let (j, t) = (r / max_len, r % max_len);
                let source_row = src.row(sentence_of[j] * max_len + t);
                let state_row = st.row(j);
                for (c, q) in out.iter_mut().enumerate() {
                    *q = tanh.get(qsum3(zero, source_row[c], state_row[c], bias[c]));
                }
            });
        }
        prod(backend, gemm, expanded, false, &self.weights.v, false, logits)?;
        logits.reshape(rows, max_len)?;

        // + c, then masked softmax
        scalar.copy_from(&self.weights.c)?;
        let total = harmonize(&mut [&mut *logits, &mut *scalar]);
        let zero = quantize::<u8>(0.0, total);
        let c = scalar.get(0, 0);
        for q in logits.data_mut() {
            *q = qsum2(zero, *q, c);
        }
        valid.clear();
        valid.extend(sentence_of.iter().map(|&s| source.lengths()[s]));
        softmax_rows(backend, logits, valid, attention)?;

        // aligned = A SC, with A spread over each row's own sentence block
        block.resize(rows, batch * max_len)?;
        block.data_mut().fill(quantize(0.0, attention.range()));
        block.set_range(attention.range());
        for (j, &s) in sentence_of.iter().enumerate() {
            block.row_mut(j)[s * max_len..(s + 1) * max_len].copy_from_slice(attention.row(j));
        }
        prod(backend, gemm, block, false, source.matrix(), false, aligned)
    }
}
