//! Encoder-decoder model
//!
//! [`Weights`] quantizes named float tensors once; [`Model`] prepares the
//! cells from them and is shared read-only by every scorer of the process.

mod attention;
mod decoder;
mod embeddings;
mod encoder;
mod gru;
mod output;
pub mod weights;

pub use attention::{Attention, AttentionScratch};
pub use decoder::{Decoder, DecoderScratch, StepInput, StepOutput};
pub use embeddings::Embeddings;
pub use encoder::{Encoder, EncoderScratch, SourceContext};
pub use gru::{update_row, GateInputs, GateTables, Gru, GruScratch, STATE_RANGE};
pub use output::{Output, OutputScratch, Shortlist};
pub use weights::{
    AttentionWeights, GruWeights, InitWeights, NamedTensors, OutputWeights, TensorView,
    WeightSource, Weights,
};

use crate::error::{NmtError, NmtResult};
use crate::EngineConfig;

/// Model dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelConfig {
    /// Source vocabulary size
    pub src_vocab: usize,
    /// Target vocabulary size
    pub trg_vocab: usize,
    /// Embedding width `E`
    pub embedding_dim: usize,
    /// GRU state width `H`
    pub hidden_dim: usize,
}

impl ModelConfig {
    /// Create a configuration
    #[must_use]
    pub const fn new(
        src_vocab: usize,
        trg_vocab: usize,
        embedding_dim: usize,
        hidden_dim: usize,
    ) -> Self {
        Self {
            src_vocab,
            trg_vocab,
            embedding_dim,
            hidden_dim,
        }
    }

    /// Toy model: vocabularies of 6, embeddings and states of 4
    #[must_use]
    pub const fn toy() -> Self {
        Self::new(6, 6, 4, 4)
    }

    /// Infer dimensions from the embeddings and the encoder's recurrent weight
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Model`] if one of those tensors is missing.
    pub fn from_weights(source: &dyn WeightSource) -> NmtResult<Self> {
        let get = |name: &str| {
            source
                .tensor(name)
                .ok_or_else(|| NmtError::Model(format!("missing weight {name}")))
        };
        let src = get(weights::names::SRC_EMBEDDINGS)?;
        let trg = get(weights::names::TRG_EMBEDDINGS)?;
        let ux = get("encoder_Ux")?;
        Ok(Self::new(src.rows, trg.rows, src.cols, ux.rows))
    }

    /// Context width `2H`
    #[must_use]
    pub const fn context_dim(&self) -> usize {
        2 * self.hidden_dim
    }

    /// Name and shape of every weight the model reads
    #[must_use]
    pub fn expected_shapes(&self) -> Vec<(String, usize, usize)> {
        let (e, h, c) = (self.embedding_dim, self.hidden_dim, self.context_dim());
        let gru = |prefix: &str, input: usize, suffix: &str| {
            [
                ("W", input, 2 * h),
                ("b", 1, 2 * h),
                ("U", h, 2 * h),
                ("Wx", input, h),
                ("bx", 1, h),
                ("Ux", h, h),
            ]
            .into_iter()
            .map(move |(n, r, k)| (format!("{prefix}{n}{suffix}"), r, k))
            .collect::<Vec<_>>()
        };
        let mut shapes = vec![
            (weights::names::SRC_EMBEDDINGS.to_string(), self.src_vocab, e),
            (weights::names::TRG_EMBEDDINGS.to_string(), self.trg_vocab, e),
            (weights::names::INIT_W.to_string(), c, h),
            (weights::names::INIT_B.to_string(), 1, h),
            (weights::names::ATT_V.to_string(), c, 1),
            (weights::names::ATT_W.to_string(), h, c),
            (weights::names::ATT_B.to_string(), 1, c),
            (weights::names::ATT_U.to_string(), c, c),
            (weights::names::ATT_C.to_string(), 1, 1),
            (weights::names::OUT_W1.to_string(), h, e),
            (weights::names::OUT_B1.to_string(), 1, e),
            (weights::names::OUT_W2.to_string(), e, e),
            (weights::names::OUT_B2.to_string(), 1, e),
            (weights::names::OUT_W3.to_string(), c, e),
            (weights::names::OUT_B3.to_string(), 1, e),
            (weights::names::OUT_W4.to_string(), e, self.trg_vocab),
            (weights::names::OUT_B4.to_string(), 1, self.trg_vocab),
        ];
        shapes.extend(gru(weights::names::ENCODER_FORWARD, e, ""));
        shapes.extend(gru(weights::names::ENCODER_BACKWARD, e, ""));
        shapes.extend(gru(weights::names::DECODER_GRU1, e, ""));
        // the second decoder cell reads the context through Wc/Wcx
        shapes.extend(
            gru("decoder_", c, "_nl")
                .into_iter()
                .map(|(name, r, k)| match name.as_str() {
                    "decoder_W_nl" => ("decoder_Wc".to_string(), r, k),
                    "decoder_Wx_nl" => ("decoder_Wcx".to_string(), r, k),
                    _ => (name, r, k),
                }),
        );
        shapes
    }

    /// Total number of weight values
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.expected_shapes().iter().map(|(_, r, c)| r * c).sum()
    }

    /// Bytes held by the quantized weights (one byte per value)
    #[must_use]
    pub fn weights_memory_bytes(&self) -> usize {
        self.parameter_count()
    }
}

/// Prepared encoder and decoder
#[derive(Debug)]
pub struct Model {
    config: ModelConfig,
    encoder: Encoder,
    decoder: Decoder,
}

impl Model {
    /// Prepare every cell from `weights`
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if the weight groups disagree.
    pub fn new(weights: Weights, config: &EngineConfig) -> NmtResult<Self> {
        let Weights {
            config: model_config,
            src_embeddings,
            encoder_forward,
            encoder_backward,
            trg_embeddings,
            init,
            decoder_gru1,
            decoder_gru2,
            attention,
            output,
        } = weights;
        let encoder = Encoder::new(
            Embeddings::new(src_embeddings, config.unk_id),
            &encoder_forward,
            &encoder_backward,
            config.pad_id,
        )?;
        let decoder = Decoder::new(
            Embeddings::new(trg_embeddings, config.unk_id),
            init,
            &decoder_gru1,
            &decoder_gru2,
            attention,
            output,
        )?;
        crate::trace_event!(
            src_vocab = model_config.src_vocab,
            trg_vocab = model_config.trg_vocab,
            hidden = model_config.hidden_dim,
            "model prepared"
        );
        Ok(Self {
            config: model_config,
            encoder,
            decoder,
        })
    }

    /// Model dimensions
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Bidirectional encoder
    #[must_use]
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// Attention decoder
    #[must_use]
    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }
}
