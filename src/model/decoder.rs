//! Attention decoder
//!
//! # Architecture
//!
//! 1. Init: `tanh(mean(SC) Wi + bi)` per source sentence
//! 2. Step: GRU #1 on the previous embedding, attention over the source,
//!    GRU #2 on the aligned context, then the output projection
//!
//! The decoder keeps no state between calls; the caller threads the state
//! matrix through, which lets a beam search reorder rows between steps.

use super::attention::{Attention, AttentionScratch};
use super::embeddings::Embeddings;
use super::encoder::SourceContext;
use super::gru::Gru;
use super::output::{Output, OutputScratch, Shortlist};
use super::weights::{AttentionWeights, GruWeights, InitWeights, OutputWeights};
use crate::backend::ComputeBackend;
use crate::error::{NmtError, NmtResult};
use crate::gemm::prod;
use crate::harmonize::{sum_biased, Activation};
use crate::matrix::{FloatMatrix, QMatrix};
use crate::quant::dequantize_many;
use crate::simd;
use crate::workspace::Workspace;

/// Reusable buffers for the decoder
#[derive(Debug, Default)]
pub struct DecoderScratch {
    means: Vec<f32>,
    summary: QMatrix,
    projected: QMatrix,
    bias: QMatrix,
    hidden: QMatrix,
    aligned: QMatrix,
    attention: AttentionScratch,
    output: OutputScratch,
}

impl DecoderScratch {
    /// Empty scratch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Inputs of one decoding step
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    /// Previous state `(rows, H)`
    pub state: &'a QMatrix,
    /// Embedding of each row's previous word `(rows, E)`
    pub embedding: &'a QMatrix,
    /// Source sentence of each row
    pub sentence_of: &'a [usize],
    /// Optional vocabulary shortlist
    pub shortlist: Option<&'a Shortlist>,
}

/// Outputs of one decoding step
#[derive(Debug)]
pub struct StepOutput<'a> {
    /// Next state `(rows, H)`
    pub state: &'a mut QMatrix,
    /// Alignment `(rows, max_len)`
    pub attention: &'a mut QMatrix,
    /// Log-probabilities `(rows, V)`
    pub probs: &'a mut FloatMatrix,
}

/// Attention decoder with prepared weights
#[derive(Debug)]
pub struct Decoder {
    embeddings: Embeddings,
    init: InitWeights,
    gru1: Gru,
    gru2: Gru,
    attention: Attention,
    output: Output,
}

impl Decoder {
    /// Build from target embeddings and loaded weight groups
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if the groups disagree.
    pub fn new(
        embeddings: Embeddings,
        init: InitWeights,
        gru1: &GruWeights,
        gru2: &GruWeights,
        attention: AttentionWeights,
        output: OutputWeights,
    ) -> NmtResult<Self> {
        let gru1 = Gru::new(gru1)?;
        let gru2 = Gru::new(gru2)?;
        if gru1.input() != embeddings.dim()
            || gru2.hidden() != gru1.hidden()
            || init.w.cols() != gru1.hidden()
            || gru2.input() != init.w.rows()
        {
            return Err(NmtError::ShapeMismatch(format!(
                "decoder cells {}->{} and {}->{} with init {}x{}",
                gru1.input(),
                gru1.hidden(),
                gru2.input(),
                gru2.hidden(),
                init.w.rows(),
                init.w.cols()
            )));
        }
        Ok(Self {
            embeddings,
            init,
            gru1,
            gru2,
            attention: Attention::new(attention)?,
            output: Output::new(output),
        })
    }

    /// Target embeddings
    #[must_use]
    pub fn embeddings(&self) -> &Embeddings {
        &self.embeddings
    }

    /// Attention layer
    #[must_use]
    pub fn attention(&self) -> &Attention {
        &self.attention
    }

    /// Output layer
    #[must_use]
    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Target vocabulary size
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.embeddings.vocab_size()
    }

    /// State width
    #[must_use]
    pub fn hidden(&self) -> usize {
        self.gru1.hidden()
    }

    /// Start state of every source sentence, `(batch, H)`
    ///
    /// Padded rows are excluded from the mean; an empty sentence starts
    /// from `tanh(bi)`.
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if the context width is wrong.
    pub fn init_state(
        &self,
        backend: &dyn ComputeBackend,
        ws: &mut Workspace,
        source: &SourceContext,
        state: &mut QMatrix,
    ) -> NmtResult<()> {
        let context = source.matrix();
        let width = context.cols();
        let Workspace {
            gemm,
            decoder: scratch,
            ..
        } = ws;

        scratch.means.clear();
        for b in 0..source.batch_size() {
            let rows: Vec<Vec<f32>> = source
                .rows_of(b)
                .map(|r| dequantize_many(context.row(r), context.range()))
                .collect();
            scratch
                .means
                .extend(simd::mean_rows(rows.iter().map(Vec::as_slice), width));
        }
        scratch.summary = QMatrix::from_f32(source.batch_size(), width, &scratch.means)?;
        prod(
            backend,
            gemm,
            &scratch.summary,
            false,
            &self.init.w,
            false,
            &mut scratch.projected,
        )?;
        scratch.bias.copy_from(&self.init.b)?;
        sum_biased(
            backend,
            &mut [&mut scratch.projected],
            &mut [&mut scratch.bias],
            Activation::Tanh,
            state,
        )
    }

    /// One decoding step for every row of `input`
    ///
    /// `projected` is [`Attention::project_source`] of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] on inconsistent row counts.
    pub fn make_step(
        &self,
        backend: &dyn ComputeBackend,
        ws: &mut Workspace,
        source: &SourceContext,
        projected: &QMatrix,
        input: &StepInput<'_>,
        out: StepOutput<'_>,
    ) -> NmtResult<()> {
        let rows = input.state.rows();
        if input.embedding.rows() != rows || input.sentence_of.len() != rows {
            return Err(NmtError::ShapeMismatch(format!(
                "step with {rows} states, {} embeddings, {} sentence indices",
                input.embedding.rows(),
                input.sentence_of.len()
            )));
        }
        let _guard = crate::trace_enter!("decoder.make_step", rows);

        let Workspace {
            gemm,
            gru,
            decoder: scratch,
            ..
        } = ws;
        self.gru1.next_state(
            backend,
            gemm,
            gru,
            input.state,
            input.embedding,
            &mut scratch.hidden,
        )?;
        self.attention.align(
            backend,
            gemm,
            &mut scratch.attention,
            source,
            projected,
            &scratch.hidden,
            input.sentence_of,
            &mut *out.attention,
            &mut scratch.aligned,
        )?;
        self.gru2.next_state(
            backend,
            gemm,
            gru,
            &scratch.hidden,
            &scratch.aligned,
            &mut *out.state,
        )?;
        self.output.log_probs(
            backend,
            gemm,
            &mut scratch.output,
            &*out.state,
            input.embedding,
            &scratch.aligned,
            input.shortlist,
            out.probs,
        )
    }
}
