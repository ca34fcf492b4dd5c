//! Named model weights
//!
//! Weights arrive as float tensors keyed by logical name through a
//! [`WeightSource`]. [`Weights::from_source`] checks every shape against the
//! dimensions inferred from the embeddings and quantizes each tensor once,
//! in its own covering range.

use std::collections::HashMap;

use super::ModelConfig;
use crate::error::{NmtError, NmtResult};
use crate::matrix::QMatrix;
use crate::quant::QuantRange;

/// Logical weight names
pub mod names {
    /// Source embeddings `(src_vocab, E)`
    pub const SRC_EMBEDDINGS: &str = "Wemb";
    /// Target embeddings `(trg_vocab, E)`
    pub const TRG_EMBEDDINGS: &str = "Wemb_dec";
    /// Forward encoder GRU prefix
    pub const ENCODER_FORWARD: &str = "encoder_";
    /// Backward encoder GRU prefix
    pub const ENCODER_BACKWARD: &str = "encoder_r_";
    /// Decoder init projection `(2H, H)`
    pub const INIT_W: &str = "ff_state_W";
    /// Decoder init bias `(1, H)`
    pub const INIT_B: &str = "ff_state_b";
    /// First decoder GRU prefix
    pub const DECODER_GRU1: &str = "decoder_";
    /// Attention vector `(2H, 1)`
    pub const ATT_V: &str = "decoder_U_att";
    /// Attention state projection `(H, 2H)`
    pub const ATT_W: &str = "decoder_W_comb_att";
    /// Attention bias `(1, 2H)`
    pub const ATT_B: &str = "decoder_b_att";
    /// Attention source projection `(2H, 2H)`
    pub const ATT_U: &str = "decoder_Wc_att";
    /// Attention scalar bias `(1, 1)`
    pub const ATT_C: &str = "decoder_c_tt";
    /// Output projection of the state `(H, E)`
    pub const OUT_W1: &str = "ff_logit_lstm_W";
    /// Bias for [`OUT_W1`] `(1, E)`
    pub const OUT_B1: &str = "ff_logit_lstm_b";
    /// Output projection of the previous embedding `(E, E)`
    pub const OUT_W2: &str = "ff_logit_prev_W";
    /// Bias for [`OUT_W2`] `(1, E)`
    pub const OUT_B2: &str = "ff_logit_prev_b";
    /// Output projection of the aligned context `(2H, E)`
    pub const OUT_W3: &str = "ff_logit_ctx_W";
    /// Bias for [`OUT_W3`] `(1, E)`
    pub const OUT_B3: &str = "ff_logit_ctx_b";
    /// Vocabulary projection `(E, trg_vocab)`
    pub const OUT_W4: &str = "ff_logit_W";
    /// Vocabulary bias `(1, trg_vocab)`
    pub const OUT_B4: &str = "ff_logit_b";
}

// ============================================================================
// Weight Sources
// ============================================================================

/// Borrowed row-major float tensor
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    /// Row count
    pub rows: usize,
    /// Column count
    pub cols: usize,
    /// `rows * cols` values
    pub data: &'a [f32],
}

/// Anything that can hand out float tensors by logical name
pub trait WeightSource {
    /// Tensor stored under `name`, if any
    fn tensor(&self, name: &str) -> Option<TensorView<'_>>;
}

#[derive(Debug, Clone)]
struct Tensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

/// In-memory [`WeightSource`]
#[derive(Debug, Clone, Default)]
pub struct NamedTensors {
    tensors: HashMap<String, Tensor>,
}

impl NamedTensors {
    /// Empty collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a tensor, replacing any previous one with the same name
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] if `data.len() != rows * cols`.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        rows: usize,
        cols: usize,
        data: Vec<f32>,
    ) -> NmtResult<()> {
        let name = name.into();
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(NmtError::ShapeMismatch(format!(
                "{name}: {} values for {rows}x{cols}",
                data.len()
            )));
        }
        self.tensors.insert(name, Tensor { rows, cols, data });
        Ok(())
    }

    /// Number of stored tensors
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Deterministic small-valued weights for every name `config` needs
    ///
    /// Values follow a sine pattern seeded by the tensor name, so two calls
    /// with the same configuration produce identical weights.
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::ShapeMismatch`] only if a shape overflows.
    pub fn synthetic(config: &ModelConfig) -> NmtResult<Self> {
        let mut tensors = Self::new();
        for (name, rows, cols) in config.expected_shapes() {
            let seed = name.bytes().fold(0_u32, |acc, b| {
                acc.wrapping_mul(31).wrapping_add(u32::from(b))
            });
            #[allow(clippy::cast_precision_loss)]
            let phase = (seed % 1000) as f32 * 0.013;
            #[allow(clippy::cast_precision_loss)]
            let data = (0..rows * cols)
                .map(|i| 0.5 * (phase + i as f32 * 0.731).sin())
                .collect();
            tensors.insert(name, rows, cols, data)?;
        }
        Ok(tensors)
    }
}

impl WeightSource for NamedTensors {
    fn tensor(&self, name: &str) -> Option<TensorView<'_>> {
        self.tensors.get(name).map(|t| TensorView {
            rows: t.rows,
            cols: t.cols,
            data: &t.data,
        })
    }
}

// ============================================================================
// Quantized Weight Groups
// ============================================================================

fn load(source: &dyn WeightSource, name: &str, rows: usize, cols: usize) -> NmtResult<QMatrix> {
    let view = source
        .tensor(name)
        .ok_or_else(|| NmtError::Model(format!("missing weight {name}")))?;
    if (view.rows, view.cols) != (rows, cols) {
        return Err(NmtError::Model(format!(
            "{name} is {}x{}, expected {rows}x{cols}",
            view.rows, view.cols
        )));
    }
    QMatrix::from_f32(rows, cols, view.data)
}

fn zero_bias(cols: usize) -> NmtResult<QMatrix> {
    QMatrix::filled(1, cols, 0.0, QuantRange::ZERO)
}

/// Which candidate bias slot a GRU's `bx` tensor fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateBias {
    /// Added to the input-side candidate projection
    Input,
    /// Added to the state-side candidate projection, inside the reset gate
    State,
}

/// Weights of one GRU cell
#[derive(Debug)]
pub struct GruWeights {
    /// Input to reset/update `(in, 2H)`
    pub w: QMatrix,
    /// Reset/update bias `(1, 2H)`
    pub b: QMatrix,
    /// State to reset/update `(H, 2H)`
    pub u: QMatrix,
    /// Input to candidate `(in, H)`
    pub wx: QMatrix,
    /// Candidate bias added outside the reset gate `(1, H)`
    pub bx1: QMatrix,
    /// Candidate bias added inside the reset gate `(1, H)`
    pub bx2: QMatrix,
    /// State to candidate `(H, H)`
    pub ux: QMatrix,
}

impl GruWeights {
    fn load(
        source: &dyn WeightSource,
        names: [&str; 6],
        input: usize,
        hidden: usize,
        slot: CandidateBias,
    ) -> NmtResult<Self> {
        let [w, b, u, wx, bx, ux] = names;
        let bx = load(source, bx, 1, hidden)?;
        let (bx1, bx2) = match slot {
            CandidateBias::Input => (bx, zero_bias(hidden)?),
            CandidateBias::State => (zero_bias(hidden)?, bx),
        };
        Ok(Self {
            w: load(source, w, input, 2 * hidden)?,
            b: load(source, b, 1, 2 * hidden)?,
            u: load(source, u, hidden, 2 * hidden)?,
            wx: load(source, wx, input, hidden)?,
            bx1,
            bx2,
            ux: load(source, ux, hidden, hidden)?,
        })
    }

    fn prefixed(
        source: &dyn WeightSource,
        prefix: &str,
        input: usize,
        hidden: usize,
    ) -> NmtResult<Self> {
        let names = ["W", "b", "U", "Wx", "bx", "Ux"].map(|n| format!("{prefix}{n}"));
        let [w, b, u, wx, bx, ux] = &names;
        Self::load(
            source,
            [w.as_str(), b.as_str(), u.as_str(), wx.as_str(), bx.as_str(), ux.as_str()],
            input,
            hidden,
            CandidateBias::Input,
        )
    }

    /// Hidden size
    #[must_use]
    pub fn hidden(&self) -> usize {
        self.ux.rows()
    }

    /// Input width
    #[must_use]
    pub fn input(&self) -> usize {
        self.w.rows()
    }
}

/// Decoder init projection
#[derive(Debug)]
pub struct InitWeights {
    /// `(2H, H)`
    pub w: QMatrix,
    /// `(1, H)`
    pub b: QMatrix,
}

/// Attention parameters
#[derive(Debug)]
pub struct AttentionWeights {
    /// Projection vector `(2H, 1)`
    pub v: QMatrix,
    /// State projection `(H, 2H)`
    pub w: QMatrix,
    /// Bias `(1, 2H)`
    pub b: QMatrix,
    /// Source projection `(2H, 2H)`
    pub u: QMatrix,
    /// Scalar bias `(1, 1)`
    pub c: QMatrix,
}

/// Output projection parameters
#[derive(Debug)]
pub struct OutputWeights {
    /// State projection `(H, E)`
    pub w1: QMatrix,
    /// `(1, E)`
    pub b1: QMatrix,
    /// Previous embedding projection `(E, E)`
    pub w2: QMatrix,
    /// `(1, E)`
    pub b2: QMatrix,
    /// Aligned context projection `(2H, E)`
    pub w3: QMatrix,
    /// `(1, E)`
    pub b3: QMatrix,
    /// Vocabulary projection `(E, V)`
    pub w4: QMatrix,
    /// `(1, V)`
    pub b4: QMatrix,
}

/// Every quantized weight of an encoder-decoder model
#[derive(Debug)]
pub struct Weights {
    /// Dimensions inferred from the source
    pub config: ModelConfig,
    /// Source embeddings
    pub src_embeddings: QMatrix,
    /// Left-to-right encoder GRU
    pub encoder_forward: GruWeights,
    /// Right-to-left encoder GRU
    pub encoder_backward: GruWeights,
    /// Target embeddings
    pub trg_embeddings: QMatrix,
    /// Decoder init projection
    pub init: InitWeights,
    /// Decoder GRU fed the previous embedding
    pub decoder_gru1: GruWeights,
    /// Decoder GRU fed the aligned context
    pub decoder_gru2: GruWeights,
    /// Attention
    pub attention: AttentionWeights,
    /// Output projection
    pub output: OutputWeights,
}

impl Weights {
    /// Quantize every weight the model needs from `source`
    ///
    /// # Errors
    ///
    /// Returns [`NmtError::Model`] if a weight is missing or has the wrong
    /// shape for the inferred dimensions.
    pub fn from_source(source: &dyn WeightSource) -> NmtResult<Self> {
        let config = ModelConfig::from_weights(source)?;
        let ModelConfig {
            src_vocab,
            trg_vocab,
            embedding_dim: e,
            hidden_dim: h,
        } = config;
        let ctx = 2 * h;

        let decoder_gru2 = GruWeights::load(
            source,
            [
                "decoder_Wc",
                "decoder_b_nl",
                "decoder_U_nl",
                "decoder_Wcx",
                "decoder_bx_nl",
                "decoder_Ux_nl",
            ],
            ctx,
            h,
            CandidateBias::State,
        )?;

        Ok(Self {
            config,
            src_embeddings: load(source, names::SRC_EMBEDDINGS, src_vocab, e)?,
            encoder_forward: GruWeights::prefixed(source, names::ENCODER_FORWARD, e, h)?,
            encoder_backward: GruWeights::prefixed(source, names::ENCODER_BACKWARD, e, h)?,
            trg_embeddings: load(source, names::TRG_EMBEDDINGS, trg_vocab, e)?,
            init: InitWeights {
                w: load(source, names::INIT_W, ctx, h)?,
                b: load(source, names::INIT_B, 1, h)?,
            },
            decoder_gru1: GruWeights::prefixed(source, names::DECODER_GRU1, e, h)?,
            decoder_gru2,
            attention: AttentionWeights {
                v: load(source, names::ATT_V, ctx, 1)?,
                w: load(source, names::ATT_W, h, ctx)?,
                b: load(source, names::ATT_B, 1, ctx)?,
                u: load(source, names::ATT_U, ctx, ctx)?,
                c: load(source, names::ATT_C, 1, 1)?,
            },
            output: OutputWeights {
                w1: load(source, names::OUT_W1, h, e)?,
                b1: load(source, names::OUT_B1, 1, e)?,
                w2: load(source, names::OUT_W2, e, e)?,
                b2: load(source, names::OUT_B2, 1, e)?,
                w3: load(source, names::OUT_W3, ctx, e)?,
                b3: load(source, names::OUT_B3, 1, e)?,
                w4: load(source, names::OUT_W4, e, trg_vocab)?,
                b4: load(source, names::OUT_B4, 1, trg_vocab)?,
            },
        })
    }

    /// Deterministic weights for `config`, see [`NamedTensors::synthetic`]
    ///
    /// # Errors
    ///
    /// See [`Weights::from_source`].
    pub fn synthetic(config: &ModelConfig) -> NmtResult<Self> {
        Self::from_source(&NamedTensors::synthetic(config)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_checks_shape() {
        let mut tensors = NamedTensors::new();
        assert!(tensors.insert("a", 2, 2, vec![0.0; 4]).is_ok());
        assert!(tensors.insert("b", 2, 3, vec![0.0; 4]).is_err());
        assert_eq!(tensors.len(), 1);
        let view = tensors.tensor("a").expect("a");
        assert_eq!((view.rows, view.cols), (2, 2));
        assert!(tensors.tensor("b").is_none());
    }

    #[test]
    fn test_synthetic_is_deterministic() {
        let config = ModelConfig::toy();
        let a = NamedTensors::synthetic(&config).expect("a");
        let b = NamedTensors::synthetic(&config).expect("b");
        let ta = a.tensor(names::ATT_U).expect("att");
        let tb = b.tensor(names::ATT_U).expect("att");
        assert_eq!(ta.data, tb.data);
        assert!(ta.data.iter().all(|v| v.abs() <= 0.5));
    }

    #[test]
    fn test_weights_from_synthetic() {
        let config = ModelConfig::toy();
        let weights = Weights::synthetic(&config).expect("weights");
        assert_eq!(weights.config, config);
        assert_eq!(weights.encoder_forward.hidden(), 4);
        assert_eq!(weights.encoder_forward.input(), 4);
        assert_eq!(weights.decoder_gru2.input(), 8);
        assert_eq!(weights.output.w4.shape(), (4, 6));
        assert_eq!(weights.attention.v.shape(), (8, 1));
    }

    #[test]
    fn test_candidate_bias_slots() {
        let weights = Weights::synthetic(&ModelConfig::toy()).expect("weights");
        // the encoder and first decoder GRU add bx outside the reset gate
        assert!(weights.encoder_forward.bx2.range().is_degenerate());
        assert!(!weights.encoder_forward.bx1.range().is_degenerate());
        // the second decoder GRU adds it inside
        assert!(weights.decoder_gru2.bx1.range().is_degenerate());
        assert!(!weights.decoder_gru2.bx2.range().is_degenerate());
    }

    #[test]
    fn test_missing_weight() {
        let mut tensors = NamedTensors::synthetic(&ModelConfig::toy()).expect("tensors");
        tensors.tensors.remove(names::ATT_C);
        let err = Weights::from_source(&tensors).unwrap_err();
        assert!(matches!(err, NmtError::Model(ref m) if m.contains(names::ATT_C)));
    }

    #[test]
    fn test_misshaped_weight() {
        let mut tensors = NamedTensors::synthetic(&ModelConfig::toy()).expect("tensors");
        tensors
            .insert(names::OUT_B4, 1, 5, vec![0.0; 5])
            .expect("insert");
        let err = Weights::from_source(&tensors).unwrap_err();
        assert!(matches!(err, NmtError::Model(_)));
    }
}
