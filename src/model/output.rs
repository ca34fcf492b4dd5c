//! Output projection and shortlist filtering
//!
//! `log softmax(tanh(s W1 + b1 + y W2 + b2 + ctx W3 + b3) W4 + b4)`, where
//! `W4`/`b4` may be narrowed to a shortlist of vocabulary columns.

use super::weights::OutputWeights;
use crate::backend::ComputeBackend;
use crate::error::{NmtError, NmtResult};
use crate::gemm::{prod, GemmScratch};
use crate::harmonize::{sum_biased, Activation};
use crate::matrix::ops::select_cols;
use crate::matrix::{FloatMatrix, QMatrix};
use crate::softmax::log_softmax_rows;

/// Vocabulary projection restricted to a shortlist
#[derive(Debug)]
pub struct Shortlist {
    w4: QMatrix,
    b4: QMatrix,
    ids: Vec<usize>,
}

impl Shortlist {
    /// Vocabulary ids in output column order
    #[must_use]
    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    /// Number of retained entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the shortlist is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Reusable buffers for [`Output::log_probs`]
#[derive(Debug, Default)]
pub struct OutputScratch {
    t1: QMatrix,
    t2: QMatrix,
    t3: QMatrix,
    b1: QMatrix,
    b2: QMatrix,
    b3: QMatrix,
    b4: QMatrix,
    hidden: QMatrix,
    projected: QMatrix,
    logits: QMatrix,
}

impl OutputScratch {
    /// Empty scratch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Output layer
#[derive(Debug)]
pub struct Output {
    weights: OutputWeights,
}

impl Output {
    /// Wrap loaded weights
    #[must_use]
    pub fn new(weights: OutputWeights) -> Self {
        Self { weights }
    }

    /// Full vocabulary size
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.weights.w4.cols()
    }

    /// Gather the `W4`/`b4` columns of `ids`
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if an id has no column.
    pub fn shortlist(&self, ids: &[usize]) -> NmtResult<Shortlist> {
        let mut w4 = QMatrix::new();
        select_cols(&self.weights.w4, ids, &mut w4)?;
        let mut b4 = QMatrix::new();
        select_cols(&self.weights.b4, ids, &mut b4)?;
        Ok(Shortlist {
            w4,
            b4,
            ids: ids.to_vec(),
        })
    }

    /// Log-probabilities of the next word for every row
    ///
    /// Softmax is taken over the shortlist when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if the row counts disagree.
    #[allow(clippy::too_many_arguments)]
    pub fn log_probs(
        &self,
        backend: &dyn ComputeBackend,
        gemm: &mut GemmScratch,
        scratch: &mut OutputScratch,
        state: &QMatrix,
        embedding: &QMatrix,
        aligned: &QMatrix,
        shortlist: Option<&Shortlist>,
        probs: &mut FloatMatrix,
    ) -> NmtResult<()> {
        if embedding.rows() != state.rows() || aligned.rows() != state.rows() {
            return Err(NmtError::ShapeMismatch(format!(
                "output rows {} / {} / {}",
                state.rows(),
                embedding.rows(),
                aligned.rows()
            )));
        }
        let w = &self.weights;
        let OutputScratch {
            t1,
            t2,
            t3,
            b1,
            b2,
            b3,
            b4,
            hidden,
            projected,
            logits,
        } = scratch;

        prod(backend, gemm, state, false, &w.w1, false, t1)?;
        prod(backend, gemm, embedding, false, &w.w2, false, t2)?;
        prod(backend, gemm, aligned, false, &w.w3, false, t3)?;
        b1.copy_from(&w.b1)?;
        b2.copy_from(&w.b2)?;
        b3.copy_from(&w.b3)?;
        sum_biased(
            backend,
            &mut [&mut *t1, &mut *t2, &mut *t3],
            &mut [&mut *b1, &mut *b2, &mut *b3],
            Activation::Tanh,
            hidden,
        )?;

        let (w4, bias4) = match shortlist {
            Some(s) => (&s.w4, &s.b4),
            None => (&w.w4, &w.b4),
        };
        prod(backend, gemm, hidden, false, w4, false, projected)?;
        b4.copy_from(bias4)?;
        sum_biased(
            backend,
            &mut [&mut *projected],
            &mut [&mut *b4],
            Activation::Identity,
            logits,
        )?;
        log_softmax_rows(logits, probs)
    }
}
