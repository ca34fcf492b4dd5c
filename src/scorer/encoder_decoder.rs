//! [`Scorer`] over the quantized encoder-decoder

use std::sync::Arc;

use super::{BeamEntry, Scorer, Sentence};
use crate::backend::{BackendSelector, ComputeBackend};
use crate::error::{NmtError, NmtResult};
use crate::matrix::ops::assemble;
use crate::matrix::{FloatMatrix, QMatrix};
use crate::model::{Model, Shortlist, SourceContext, StepInput, StepOutput};
use crate::workspace::Workspace;
use crate::EngineConfig;

/// Decoder states and previous-word embeddings, one row per hypothesis
#[derive(Debug, Default)]
pub struct DecoderState {
    states: QMatrix,
    embeddings: QMatrix,
}

impl DecoderState {
    /// Hidden states `(rows, H)`
    #[must_use]
    pub fn states(&self) -> &QMatrix {
        &self.states
    }

    /// Previous-word embeddings `(rows, E)`
    #[must_use]
    pub fn embeddings(&self) -> &QMatrix {
        &self.embeddings
    }

    /// Number of hypotheses
    #[must_use]
    pub fn rows(&self) -> usize {
        self.states.rows()
    }
}

/// Encoder-decoder scorer
///
/// Owns its workspace and per-batch buffers; the model is shared.
#[derive(Debug)]
pub struct EncoderDecoder {
    model: Arc<Model>,
    backend: Arc<dyn ComputeBackend>,
    config: EngineConfig,
    workspace: Workspace,
    source: SourceContext,
    projected: QMatrix,
    shortlist: Option<Shortlist>,
    attention: QMatrix,
    probs: FloatMatrix,
    sentence_of: Vec<usize>,
    rows: Vec<usize>,
    words: Vec<u32>,
}

impl EncoderDecoder {
    /// Scorer on the backend `config` selects
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Backend`] if the backend cannot be built.
    pub fn new(model: Arc<Model>, config: EngineConfig) -> NmtResult<Self> {
        let backend = BackendSelector::create(&config)?;
        Ok(Self::with_backend(model, backend, config))
    }

    /// Scorer on an existing backend
    #[must_use]
    pub fn with_backend(
        model: Arc<Model>,
        backend: Arc<dyn ComputeBackend>,
        config: EngineConfig,
    ) -> Self {
        Self {
            model,
            backend,
            config,
            workspace: Workspace::new(),
            source: SourceContext::new(),
            projected: QMatrix::new(),
            shortlist: None,
            attention: QMatrix::new(),
            probs: FloatMatrix::new(),
            sentence_of: Vec::new(),
            rows: Vec::new(),
            words: Vec::new(),
        }
    }

    /// Shared model
    #[must_use]
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Compute backend
    #[must_use]
    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Encoded source of the current batch
    #[must_use]
    pub fn source(&self) -> &SourceContext {
        &self.source
    }

    /// Vocabulary id of each output column while a filter is installed
    #[must_use]
    pub fn filtered_ids(&self) -> Option<&[usize]> {
        self.shortlist.as_ref().map(Shortlist::ids)
    }

    fn require_source(&self) -> NmtResult<()> {
        if self.source.is_empty() {
            return Err(NmtError::Inference("no source sentences set".into()));
        }
        Ok(())
    }
}

impl Scorer for EncoderDecoder {
    type State = DecoderState;

    fn new_state(&self) -> DecoderState {
        DecoderState::default()
    }

    fn begin_sentence_state(&mut self, state: &mut DecoderState, batch_size: usize) -> NmtResult<()> {
        self.require_source()?;
        if batch_size != self.source.batch_size() {
            return Err(NmtError::Inference(format!(
                "batch of {batch_size} for {} source sentences",
                self.source.batch_size()
            )));
        }
        let decoder = self.model.decoder();
        decoder.init_state(
            self.backend.as_ref(),
            &mut self.workspace,
            &self.source,
            &mut state.states,
        )?;
        decoder.embeddings().empty(batch_size, &mut state.embeddings)
    }

    fn set_source(&mut self, sentences: &[Sentence]) -> NmtResult<()> {
        if sentences.is_empty() {
            return Err(NmtError::Inference("empty source batch".into()));
        }
        let words: Vec<&[u32]> = sentences
            .iter()
            .map(|s| s.truncated(self.config.max_length))
            .collect();
        if let Some(empty) = sentences.iter().find(|s| s.words.is_empty()) {
            return Err(NmtError::Inference(format!(
                "sentence on line {} has no words",
                empty.line
            )));
        }
        crate::trace_event!(
            batch = sentences.len(),
            first_line = sentences[0].line,
            "source set"
        );
        self.model
            .encoder()
            .encode(self.backend.as_ref(), &mut self.workspace, &words, &mut self.source)?;
        self.model.decoder().attention().project_source(
            self.backend.as_ref(),
            &mut self.workspace.gemm,
            &self.source,
            &mut self.projected,
        )
    }

    fn decode(
        &mut self,
        input: &DecoderState,
        output: &mut DecoderState,
        beam_sizes: &[usize],
    ) -> NmtResult<()> {
        self.require_source()?;
        if beam_sizes.len() != self.source.batch_size() {
            return Err(NmtError::ShapeMismatch(format!(
                "{} beam sizes for {} sentences",
                beam_sizes.len(),
                self.source.batch_size()
            )));
        }
        let total: usize = beam_sizes.iter().sum();
        if total != input.rows() {
            return Err(NmtError::ShapeMismatch(format!(
                "beam sizes sum to {total} for {} state rows",
                input.rows()
            )));
        }
        self.sentence_of.clear();
        for (s, &n) in beam_sizes.iter().enumerate() {
            self.sentence_of.extend(std::iter::repeat(s).take(n));
        }

        self.model.decoder().make_step(
            self.backend.as_ref(),
            &mut self.workspace,
            &self.source,
            &self.projected,
            &StepInput {
                state: &input.states,
                embedding: &input.embeddings,
                sentence_of: &self.sentence_of,
                shortlist: self.shortlist.as_ref(),
            },
            StepOutput {
                state: &mut output.states,
                attention: &mut self.attention,
                probs: &mut self.probs,
            },
        )
    }

    fn assemble_beam_state(
        &mut self,
        input: &DecoderState,
        beam: &[BeamEntry],
        output: &mut DecoderState,
    ) -> NmtResult<()> {
        self.rows.clear();
        self.rows.extend(beam.iter().map(|e| e.prev_index));
        assemble(&input.states, &self.rows, &mut output.states)?;
        self.words.clear();
        self.words.extend(beam.iter().map(|e| e.word));
        self.model
            .decoder()
            .embeddings()
            .lookup(&self.words, &mut self.rows, &mut output.embeddings)
    }

    fn probs(&self) -> &FloatMatrix {
        &self.probs
    }

    fn attention(&self) -> &QMatrix {
        &self.attention
    }

    fn vocab_size(&self) -> usize {
        self.model.decoder().vocab_size()
    }

    fn filter(&mut self, ids: &[u32]) -> NmtResult<()> {
        if ids.is_empty() {
            self.shortlist = None;
            crate::trace_event!("filter cleared");
            return Ok(());
        }
        let decoder = self.model.decoder();
        let columns = ids
            .iter()
            .map(|&id| decoder.embeddings().resolve(id))
            .collect::<NmtResult<Vec<usize>>>()?;
        self.shortlist = Some(decoder.output().shortlist(&columns)?);
        crate::trace_event!(size = columns.len(), "filter installed");
        Ok(())
    }
}
