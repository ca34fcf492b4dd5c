//! Bidirectional GRU encoder
//!
//! Runs a forward GRU left-to-right and a backward GRU right-to-left over
//! the embedded source and writes both states of position `t` side by side,
//! so row `t` of the context is `[fwd_t | bwd_t]`.
//!
//! Sentences of one batch are padded to the longest; padded positions feed
//! the padding embedding but never advance a sentence's state, and their
//! context rows stay at zero.

use std::ops::Range;

use super::embeddings::Embeddings;
use super::gru::{Gru, STATE_RANGE};
use super::weights::GruWeights;
use crate::backend::ComputeBackend;
use crate::error::{NmtError, NmtResult};
use crate::matrix::ops::paste_row;
use crate::matrix::QMatrix;
use crate::quant::quantize;
use crate::workspace::Workspace;

/// Encoded source batch
///
/// Sentence `b` occupies rows `b * max_len .. b * max_len + lengths[b]` of
/// [`SourceContext::matrix`].
#[derive(Debug, Default)]
pub struct SourceContext {
    matrix: QMatrix,
    lengths: Vec<usize>,
    max_len: usize,
}

impl SourceContext {
    /// Empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `(batch * max_len, 2H)` context rows
    #[must_use]
    pub fn matrix(&self) -> &QMatrix {
        &self.matrix
    }

    /// Real token count of each sentence
    #[must_use]
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Padded length
    #[must_use]
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Number of encoded sentences
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    /// Whether nothing has been encoded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Context rows holding the real tokens of `sentence`
    #[must_use]
    pub fn rows_of(&self, sentence: usize) -> Range<usize> {
        let start = sentence * self.max_len;
        start..start + self.lengths[sentence]
    }
}

/// Reusable buffers for [`Encoder::encode`]
#[derive(Debug, Default)]
pub struct EncoderScratch {
    ids: Vec<u32>,
    rows: Vec<usize>,
    embedded: QMatrix,
    state: QMatrix,
    next: QMatrix,
}

impl EncoderScratch {
    /// Empty scratch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

fn fill_zero_state(m: &mut QMatrix, rows: usize, cols: usize) -> NmtResult<()> {
    m.resize(rows, cols)?;
    m.data_mut().fill(quantize(0.0, STATE_RANGE));
    m.set_range(STATE_RANGE);
    Ok(())
}

/// Bidirectional GRU encoder
#[derive(Debug)]
pub struct Encoder {
    embeddings: Embeddings,
    forward: Gru,
    backward: Gru,
    pad_id: u32,
}

impl Encoder {
    /// Build from source embeddings and both directions' weights
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if the cells disagree.
    pub fn new(
        embeddings: Embeddings,
        forward: &GruWeights,
        backward: &GruWeights,
        pad_id: u32,
    ) -> NmtResult<Self> {
        let forward = Gru::new(forward)?;
        let backward = Gru::new(backward)?;
        if forward.hidden() != backward.hidden()
            || forward.input() != embeddings.dim()
            || backward.input() != embeddings.dim()
        {
            return Err(NmtError::ShapeMismatch(format!(
                "encoder cells {}->{} and {}->{} over {}-wide embeddings",
                forward.input(),
                forward.hidden(),
                backward.input(),
                backward.hidden(),
                embeddings.dim()
            )));
        }
        Ok(Self {
            embeddings,
            forward,
            backward,
            pad_id,
        })
    }

    /// State width of one direction
    #[must_use]
    pub fn hidden(&self) -> usize {
        self.forward.hidden()
    }

    /// Source vocabulary size
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.embeddings.vocab_size()
    }

    /// Encode a padded batch of sentences into `out`
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::VocabularyIndexOutOfRange`] if neither a token nor
    /// the unknown id has an embedding row, or any GEMM error.
    pub fn encode(
        &self,
        backend: &dyn ComputeBackend,
        ws: &mut Workspace,
        sentences: &[&[u32]],
        out: &mut SourceContext,
    ) -> NmtResult<()> {
        let batch = sentences.len();
        let max_len = sentences.iter().map(|s| s.len()).max().unwrap_or(0);
        let hidden = self.hidden();
        let _guard = crate::trace_enter!("encoder.get_context", batch, max_len);

        out.lengths.clear();
        out.lengths.extend(sentences.iter().map(|s| s.len()));
        out.max_len = max_len;
        fill_zero_state(&mut out.matrix, batch * max_len, 2 * hidden)?;

        let Workspace {
            gemm,
            gru: gru_scratch,
            encoder: scratch,
            ..
        } = ws;
        for direction in [Direction::Forward, Direction::Backward] {
            let (gru, col) = match direction {
                Direction::Forward => (&self.forward, 0),
                Direction::Backward => (&self.backward, hidden),
            };
            fill_zero_state(&mut scratch.state, batch, hidden)?;
            for step in 0..max_len {
                let t = match direction {
                    Direction::Forward => step,
                    Direction::Backward => max_len - 1 - step,
                };
                scratch.ids.clear();
                scratch
                    .ids
                    .extend(sentences.iter().map(|s| s.get(t).copied().unwrap_or(self.pad_id)));
                self.embeddings
                    .lookup(&scratch.ids, &mut scratch.rows, &mut scratch.embedded)?;
                gru.next_state(
                    backend,
                    gemm,
                    gru_scratch,
                    &scratch.state,
                    &scratch.embedded,
                    &mut scratch.next,
                )?;
                for (b, sentence) in sentences.iter().enumerate() {
                    if t < sentence.len() {
                        paste_row(&mut out.matrix, b * max_len + t, col, &scratch.next, b)?;
                    } else {
                        scratch
                            .next
                            .row_mut(b)
                            .copy_from_slice(scratch.state.row(b));
                    }
                }
                scratch.state.swap(&mut scratch.next);
            }
        }
        Ok(())
    }

    /// Context of a single sentence, `(tokens.len(), 2H)`
    ///
    /// # Errors
    ///
    /// See [`Encoder::encode`].
    pub fn get_context(
        &self,
        backend: &dyn ComputeBackend,
        ws: &mut Workspace,
        tokens: &[u32],
    ) -> NmtResult<QMatrix> {
        let mut context = SourceContext::new();
        self.encode(backend, ws, &[tokens], &mut context)?;
        Ok(context.matrix)
    }
}
