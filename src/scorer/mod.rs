//! Scorer interface consumed by a beam search
//!
//! A scorer encodes a batch of source sentences once, then advances a
//! caller-owned state one target word at a time. Between steps the search
//! keeps its surviving hypotheses with [`Scorer::assemble_beam_state`].
//!
//! # Call order
//!
//! ```text
//! set_source -> begin_sentence_state -> decode -> assemble_beam_state -> decode -> ...
//! ```

mod encoder_decoder;

pub use encoder_decoder::{DecoderState, EncoderDecoder};

use crate::error::NmtResult;
use crate::matrix::{FloatMatrix, QMatrix};

/// One source sentence, already mapped to vocabulary ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize, serde::Deserialize))]
pub struct Sentence {
    /// Input line number
    pub line: usize,
    /// Source word ids
    pub words: Vec<u32>,
}

impl Sentence {
    /// Create a sentence
    #[must_use]
    pub fn new(line: usize, words: Vec<u32>) -> Self {
        Self { line, words }
    }

    /// Words, cut to `max_length` unless it is 0
    #[must_use]
    pub fn truncated(&self, max_length: usize) -> &[u32] {
        if max_length == 0 || self.words.len() <= max_length {
            &self.words
        } else {
            &self.words[..max_length]
        }
    }

    /// Number of words
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the sentence has no words
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Surviving hypothesis chosen by the search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeamEntry {
    /// Row of the previous state this hypothesis extends
    pub prev_index: usize,
    /// Word it appended (full-vocabulary id)
    pub word: u32,
}

impl BeamEntry {
    /// Create an entry
    #[must_use]
    pub const fn new(prev_index: usize, word: u32) -> Self {
        Self { prev_index, word }
    }
}

/// Polymorphic scoring backend
pub trait Scorer {
    /// Per-hypothesis state threaded through the search
    type State;

    /// Empty state
    fn new_state(&self) -> Self::State;

    /// Start state with one hypothesis per sentence
    ///
    /// # Errors
    ///
    /// Fails if no source is set or `batch_size` differs from it.
    fn begin_sentence_state(&mut self, state: &mut Self::State, batch_size: usize)
        -> NmtResult<()>;

    /// Encode the source batch
    ///
    /// # Errors
    ///
    /// Fails if the batch or any sentence in it is empty, or encoding fails.
    fn set_source(&mut self, sentences: &[Sentence]) -> NmtResult<()>;

    /// Advance every hypothesis by one word
    ///
    /// `beam_sizes[s]` is the number of consecutive rows of `input` that
    /// belong to sentence `s`.
    ///
    /// # Errors
    ///
    /// Fails if `beam_sizes` does not describe `input`'s rows.
    fn decode(
        &mut self,
        input: &Self::State,
        output: &mut Self::State,
        beam_sizes: &[usize],
    ) -> NmtResult<()>;

    /// Keep the rows named by `beam`, in that order, with their new words
    ///
    /// # Errors
    ///
    /// Fails if an entry refers to a missing row.
    fn assemble_beam_state(
        &mut self,
        input: &Self::State,
        beam: &[BeamEntry],
        output: &mut Self::State,
    ) -> NmtResult<()>;

    /// Log-probabilities of the most recent [`Scorer::decode`]
    fn probs(&self) -> &FloatMatrix;

    /// Alignment of the most recent [`Scorer::decode`]
    fn attention(&self) -> &QMatrix;

    /// Full target vocabulary size
    fn vocab_size(&self) -> usize;

    /// Restrict output columns to `ids`; an empty list restores the full
    /// vocabulary
    ///
    /// # Errors
    ///
    /// Fails if the projection cannot be built.
    fn filter(&mut self, ids: &[u32]) -> NmtResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_truncation() {
        let sentence = Sentence::new(3, vec![4, 5, 6, 7]);
        assert_eq!(sentence.truncated(0), &[4, 5, 6, 7]);
        assert_eq!(sentence.truncated(2), &[4, 5]);
        assert_eq!(sentence.truncated(10), &[4, 5, 6, 7]);
        assert_eq!(sentence.len(), 4);
        assert_eq!(sentence.line, 3);
        assert!(!sentence.is_empty());
    }

    #[test]
    fn test_beam_entry() {
        let entry = BeamEntry::new(2, 9);
        assert_eq!(entry.prev_index, 2);
        assert_eq!(entry.word, 9);
    }
}
