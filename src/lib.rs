//! # nmt-q8
//!
//! 8-bit quantized inference core for attentional encoder-decoder neural
//! machine translation.
//!
//! ## Overview
//!
//! Every dense matrix carries its integer levels together with the `[min, max]`
//! float range they represent. Products run as integer GEMMs whose output
//! range is derived analytically and then tightened by a scan; elementwise
//! combinations first harmonize their operands into one range; nonlinearities
//! are 256-entry lookup tables.
//!
//! On top of those primitives sit a GRU cell, a bidirectional encoder, an
//! attention decoder and the [`Scorer`](scorer::Scorer) façade consumed by an
//! external beam search.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nmt_q8::model::{Model, ModelConfig, Weights};
//! use nmt_q8::scorer::{EncoderDecoder, Scorer, Sentence};
//! use nmt_q8::EngineConfig;
//!
//! let config = EngineConfig::default();
//! let weights = Weights::synthetic(&ModelConfig::toy())?;
//! let model = std::sync::Arc::new(Model::new(weights, &config)?);
//! let mut scorer = EncoderDecoder::new(model, config)?;
//!
//! scorer.set_source(&[Sentence::new(0, vec![2, 5, 1])])?;
//! let mut state = scorer.new_state();
//! let mut next = scorer.new_state();
//! scorer.begin_sentence_state(&mut state, 1)?;
//! scorer.decode(&state, &mut next, &[1])?;
//! println!("{:?}", scorer.probs().row(0));
//! ```
//!
//! ## Features
//!
//! - `parallel` (default): bounded rayon worker-pool backend
//! - `tracing`: debug spans and events via `tracing`
//! - `cli`: `nmt-q8` benchmark and demo binary

#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod error;
pub mod gemm;
pub mod harmonize;
pub mod matrix;
pub mod model;
/// Bounded worker pools for the parallel backend
pub mod parallel;
pub mod quant;
pub mod scorer;
pub mod simd;
pub mod softmax;
#[macro_use]
pub mod trace;
pub mod workspace;

/// CLI module for the benchmark and demo driver
#[cfg(feature = "cli")]
pub mod cli;

pub use backend::{BackendSelector, BackendType, ComputeBackend};
pub use error::{NmtError, NmtResult};
pub use matrix::{FloatMatrix, QMatrix};
pub use quant::QuantRange;
pub use workspace::Workspace;

/// Default reserved row for out-of-vocabulary ids
pub const DEFAULT_UNK_ID: u32 = 1;

/// Default row fed at padded source positions
pub const DEFAULT_PAD_ID: u32 = 0;

/// Engine configuration, built once and passed by reference
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Requested compute backend
    pub backend: BackendType,
    /// Worker-pool bound (`None` = all logical CPUs)
    pub threads: Option<usize>,
    /// Source sentences are truncated to this many tokens (0 = unlimited)
    pub max_length: usize,
    /// Reserved embedding row substituted for out-of-vocabulary ids
    pub unk_id: u32,
    /// Embedding row fed at padded positions of a batch
    pub pad_id: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Auto,
            threads: None,
            max_length: 0,
            unk_id: DEFAULT_UNK_ID,
            pad_id: DEFAULT_PAD_ID,
        }
    }
}

impl EngineConfig {
    /// Sequential CPU configuration
    #[must_use]
    pub fn single_threaded() -> Self {
        Self::default()
            .with_backend(BackendType::Cpu)
            .with_threads(1)
    }

    /// Set the requested backend
    #[must_use]
    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    /// Bound the worker pool
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Truncate source sentences (0 = unlimited)
    #[must_use]
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the out-of-vocabulary row
    #[must_use]
    pub fn with_unk_id(mut self, unk_id: u32) -> Self {
        self.unk_id = unk_id;
        self
    }

    /// Set the padding row
    #[must_use]
    pub fn with_pad_id(mut self, pad_id: u32) -> Self {
        self.pad_id = pad_id;
        self
    }
}
